use hive_core::{Access, HKey, ValueType};
use hive_key::{KeyIterator, RegKey, ValueIterator};
use hive_store_memory::MemoryHive;
use hive_store_redb::RedbHive;

const PATH: &str = "Software\\Enumerated";

fn populated(hive: std::sync::Arc<dyn hive_core::Hive>) -> RegKey {
    let mut key = RegKey::new(hive);
    key.create(HKey::LOCAL_MACHINE, PATH, Access::ALL_ACCESS)
        .unwrap();
    key.write_value("a", "first").unwrap();
    key.write_value_dw("b", 2).unwrap();
    key.write_value("c", "third").unwrap();
    for name in ["x", "y", "z"] {
        let mut child = RegKey::new(key.hive().clone());
        child
            .create(
                HKey::LOCAL_MACHINE,
                &format!("{PATH}\\{name}"),
                Access::ALL_ACCESS,
            )
            .unwrap();
    }
    key
}

#[test]
fn values_walk_from_the_top_index() {
    let hive = MemoryHive::shared();
    let _key = populated(hive.clone());

    let mut iter = ValueIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH);
    assert!(iter.valid());
    assert_eq!(iter.value_count(), 3);
    assert_eq!(iter.name(), "c");
    assert_eq!(iter.value_type(), Some(ValueType::String));

    iter.advance();
    assert_eq!(iter.name(), "b");
    assert_eq!(iter.value(), [2, 0, 0, 0]);
    assert_eq!(iter.value_size(), 4);

    iter.advance();
    assert_eq!(iter.name(), "a");
    iter.advance();
    assert!(!iter.valid());
    iter.advance();
    assert!(!iter.valid());
}

#[test]
fn keys_walk_from_the_top_index() {
    let hive = MemoryHive::shared();
    let _key = populated(hive.clone());

    let iter = KeyIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH);
    assert_eq!(iter.subkey_count(), 3);
    let names: Vec<String> = iter.collect();
    assert_eq!(names, ["z", "y", "x"]);
}

#[test]
fn deleting_the_current_value_visits_every_value_once() {
    let hive = MemoryHive::shared();
    let key = populated(hive.clone());

    let mut seen = Vec::new();
    let mut iter = ValueIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH);
    while iter.valid() {
        seen.push(iter.name().to_string());
        key.delete_value(iter.name()).unwrap();
        iter.advance();
    }

    assert_eq!(seen, ["c", "b", "a"]);
    assert_eq!(key.value_count(), 0);
    assert_eq!(iter.value_count(), 0);
}

#[test]
fn deleting_the_current_subkey_visits_every_subkey_once() {
    let hive = MemoryHive::shared();
    let key = populated(hive.clone());

    let mut seen = Vec::new();
    let mut iter = KeyIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH);
    while iter.valid() {
        seen.push(iter.name().to_string());
        key.delete_key(iter.name()).unwrap();
        iter.advance();
    }

    assert_eq!(seen, ["z", "y", "x"]);
    assert_eq!(iter.subkey_count(), 0);
}

#[test]
fn failed_reads_do_not_end_traversal() {
    let hive = MemoryHive::shared();
    let key = populated(hive.clone());

    let mut iter = ValueIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH);
    assert_eq!(iter.name(), "c");
    key.delete_value("a").unwrap();
    key.delete_value("b").unwrap();

    // Index 1 no longer exists.
    iter.advance();
    assert!(iter.valid());
    assert_eq!(iter.name(), "");
    assert!(iter.value().is_empty());
    assert_eq!(iter.value_type(), None);

    iter.advance();
    assert!(iter.valid());
    assert_eq!(iter.name(), "c");

    iter.advance();
    assert!(!iter.valid());
}

#[test]
fn counts_are_requeried() {
    let hive = MemoryHive::shared();
    let key = populated(hive.clone());

    let values = ValueIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH);
    key.write_value("d", "fourth").unwrap();
    assert_eq!(values.value_count(), 4);
    assert_eq!(values.name(), "c");
}

#[test]
fn missing_key_is_invalid_from_the_start() {
    let hive = MemoryHive::shared();

    let mut values = ValueIterator::new(hive.clone(), HKey::LOCAL_MACHINE, "Software\\None");
    assert!(!values.valid());
    assert_eq!(values.value_count(), 0);
    assert_eq!(values.name(), "");
    assert!(values.next().is_none());

    let mut keys = KeyIterator::new(hive.clone(), HKey::LOCAL_MACHINE, "Software\\None");
    assert!(!keys.valid());
    assert_eq!(keys.subkey_count(), 0);
    assert!(keys.next().is_none());
}

#[test]
fn node_without_entries_is_invalid_from_the_start() {
    let hive = MemoryHive::shared();
    let mut key = RegKey::new(hive.clone());
    key.create(HKey::LOCAL_MACHINE, PATH, Access::ALL_ACCESS)
        .unwrap();

    assert!(!ValueIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH).valid());
    assert!(!KeyIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH).valid());
}

#[test]
fn iterators_release_their_handles() {
    let hive = MemoryHive::shared();
    let key = populated(hive.clone());
    assert_eq!(hive.open_handles(), 1);

    let entries: Vec<_> = ValueIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH).collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].0, "c");
    assert_eq!(entries[0].1.to_text().unwrap(), "third");
    assert_eq!(hive.open_handles(), 1);

    drop(key);
    assert_eq!(hive.open_handles(), 0);
}

#[test]
fn redb_traversal_with_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let hive = std::sync::Arc::new(RedbHive::open(dir.path()).unwrap());
    let key = populated(hive.clone());

    let mut seen = Vec::new();
    let mut iter = ValueIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH);
    while iter.valid() {
        seen.push(iter.name().to_string());
        key.delete_value(iter.name()).unwrap();
        iter.advance();
    }
    seen.sort();
    assert_eq!(seen, ["a", "b", "c"]);
    assert_eq!(key.value_count(), 0);

    let names: Vec<String> = KeyIterator::new(hive.clone(), HKey::LOCAL_MACHINE, PATH).collect();
    assert_eq!(names, ["z", "y", "x"]);
}
