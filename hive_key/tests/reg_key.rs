use std::sync::Arc;

use hive_core::{Access, Disposition, HKey, HiveError, MapEnvironment, ValueType};
use hive_key::{KeyError, RegKey};
use hive_store_memory::MemoryHive;

const PATH: &str = "Software\\HiveKeyTests";

fn open(hive: &Arc<MemoryHive>) -> RegKey {
    let mut key = RegKey::new(hive.clone());
    key.create(HKey::CURRENT_USER, PATH, Access::ALL_ACCESS)
        .unwrap();
    key
}

#[test]
fn create_reports_disposition() {
    let hive = MemoryHive::shared();
    let mut key = RegKey::new(hive.clone());

    let first = key
        .create_with_disposition(HKey::CURRENT_USER, PATH, Access::ALL_ACCESS)
        .unwrap();
    let second = key
        .create_with_disposition(HKey::CURRENT_USER, PATH, Access::ALL_ACCESS)
        .unwrap();

    assert_eq!(first, Disposition::CreatedNewKey);
    assert_eq!(second, Disposition::OpenedExistingKey);
    assert_eq!(hive.open_handles(), 1);
}

#[test]
fn open_missing_leaves_key_empty() {
    let hive = MemoryHive::shared();
    let mut key = open(&hive);

    let err = key
        .open(HKey::CURRENT_USER, "Software\\Missing", Access::READ)
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(!key.is_valid());
    assert_eq!(hive.open_handles(), 0);
}

#[test]
fn with_access_creates_or_opens() {
    let hive = MemoryHive::shared();

    let missing = RegKey::with_access(hive.clone(), HKey::CURRENT_USER, PATH, Access::READ);
    assert!(!missing.is_valid());

    let created = RegKey::with_access(hive.clone(), HKey::CURRENT_USER, PATH, Access::WRITE);
    assert!(created.is_valid());

    let opened = RegKey::with_access(hive.clone(), HKey::CURRENT_USER, PATH, Access::READ);
    assert!(opened.is_valid());
}

#[test]
fn descending_replaces_the_handle() {
    let hive = MemoryHive::shared();
    let mut key = open(&hive);
    let parent = key.handle();

    key.create_key("Child", Access::ALL_ACCESS).unwrap();
    assert!(key.is_valid());
    assert_ne!(key.handle(), parent);
    assert_eq!(hive.open_handles(), 1);

    key.write_value("marker", "child").unwrap();
    let mut check = RegKey::new(hive.clone());
    check
        .open(HKey::CURRENT_USER, &format!("{PATH}\\Child"), Access::READ)
        .unwrap();
    assert_eq!(check.read_value("marker").unwrap(), "child");
}

#[test]
fn failed_descend_closes_the_parent() {
    let hive = MemoryHive::shared();
    let mut key = open(&hive);

    assert!(key.open_key("Nope", Access::READ).unwrap_err().is_not_found());
    assert!(!key.is_valid());
    assert_eq!(hive.open_handles(), 0);

    assert!(matches!(
        key.open_key("Nope", Access::READ),
        Err(KeyError::NotOpen)
    ));
}

#[test]
fn zero_access_descend_still_closes() {
    let hive = MemoryHive::shared();
    let mut key = open(&hive);

    assert!(matches!(
        key.create_key("Child", Access::empty()),
        Err(KeyError::InvalidAccess)
    ));
    assert!(!key.is_valid());
    assert_eq!(hive.open_handles(), 0);
}

#[test]
fn string_values() {
    let hive = MemoryHive::shared();
    let key = open(&hive);

    key.write_value("greeting", "hello").unwrap();
    assert_eq!(key.read_value("greeting").unwrap(), "hello");
    assert_eq!(key.read_value("GREETING").unwrap(), "hello");

    let raw = key.read_raw_value("greeting").unwrap();
    assert_eq!(raw.value_type, ValueType::String);
    // Five units plus the terminator.
    assert_eq!(raw.len(), 12);

    key.write_value("empty", "").unwrap();
    assert_eq!(key.read_value("empty").unwrap(), "");
}

#[test]
fn string_length_cap() {
    let hive = MemoryHive::shared();
    let key = open(&hive);

    let fits = "x".repeat(1023);
    key.write_value("fits", &fits).unwrap();
    assert_eq!(key.read_value("fits").unwrap(), fits);

    key.write_value("long", &"x".repeat(1024)).unwrap();
    assert!(matches!(
        key.read_value("long"),
        Err(KeyError::TooLong { len: 1025, max: 1024 })
    ));
}

#[test]
fn expandable_strings_resolve_placeholders() {
    let hive = MemoryHive::shared();
    let env = MapEnvironment::new()
        .with("HOME", "/home/hive")
        .with("BIG", "y".repeat(2000));
    let key = open(&hive).with_environment(Arc::new(env));

    key.write_expand_value("home", "%HOME%\\data").unwrap();
    assert_eq!(key.read_value("home").unwrap(), "/home/hive\\data");
    assert_eq!(
        key.read_raw_value("home").unwrap().value_type,
        ValueType::ExpandString
    );

    key.write_expand_value("undefined", "%NOPE%\\x").unwrap();
    assert_eq!(key.read_value("undefined").unwrap(), "%NOPE%\\x");

    key.write_expand_value("big", "%BIG%").unwrap();
    assert!(matches!(
        key.read_value("big"),
        Err(KeyError::Expansion(_))
    ));

    key.write_value("plain", "%HOME%").unwrap();
    assert_eq!(key.read_value("plain").unwrap(), "%HOME%");
}

#[test]
fn dword_values() {
    let hive = MemoryHive::shared();
    let key = open(&hive);

    key.write_value_dw("count", 42).unwrap();
    assert_eq!(key.read_value_dw("count").unwrap(), 42);
    assert_eq!(key.read_raw_value("count").unwrap().data.as_ref(), [42, 0, 0, 0]);

    key.write_raw_value("bin4", vec![1u8, 2, 0, 0], ValueType::Binary)
        .unwrap();
    assert_eq!(key.read_value_dw("bin4").unwrap(), 0x0201);

    key.write_raw_value("bin3", vec![1u8, 2, 3], ValueType::Binary)
        .unwrap();
    assert!(matches!(
        key.read_value_dw("bin3"),
        Err(KeyError::SizeMismatch { expected: 4, actual: 3 })
    ));

    key.write_value("text", "42").unwrap();
    assert!(matches!(
        key.read_value_dw("text"),
        Err(KeyError::TypeMismatch {
            actual: ValueType::String,
            ..
        })
    ));
    assert!(matches!(
        key.read_value("count"),
        Err(KeyError::TypeMismatch {
            actual: ValueType::Dword,
            ..
        })
    ));
}

#[test]
fn value_enumeration_and_deletion() {
    let hive = MemoryHive::shared();
    let key = open(&hive);

    assert_eq!(key.value_count(), 0);
    key.write_value("a", "1").unwrap();
    key.write_value_dw("b", 2).unwrap();
    assert_eq!(key.value_count(), 2);
    assert_eq!(key.read_name(0).unwrap(), "a");
    assert_eq!(key.read_name(1).unwrap(), "b");
    assert!(key.read_name(2).unwrap_err().is_not_found());

    assert!(key.value_exists("a"));
    key.delete_value("a").unwrap();
    assert!(!key.value_exists("a"));
    assert!(key.delete_value("a").unwrap_err().is_not_found());
    assert_eq!(key.value_count(), 1);
}

#[test]
fn delete_key_is_recursive() {
    let hive = MemoryHive::shared();
    let key = open(&hive);

    let mut deep = RegKey::new(hive.clone());
    deep.create(
        HKey::CURRENT_USER,
        &format!("{PATH}\\Tree\\Inner\\Leaf"),
        Access::ALL_ACCESS,
    )
    .unwrap();
    deep.write_value("v", "x").unwrap();

    key.delete_key("Tree").unwrap();

    assert!(matches!(
        deep.read_value("v"),
        Err(KeyError::Store(HiveError::KeyDeleted))
    ));
    let mut check = RegKey::new(hive.clone());
    assert!(
        check
            .open(HKey::CURRENT_USER, &format!("{PATH}\\Tree"), Access::READ)
            .unwrap_err()
            .is_not_found()
    );
    assert!(key.delete_key("Tree").unwrap_err().is_not_found());
}

#[test]
fn read_only_key_rejects_writes() {
    let hive = MemoryHive::shared();
    drop(open(&hive));

    let mut key = RegKey::new(hive.clone());
    key.open(HKey::CURRENT_USER, PATH, Access::READ).unwrap();
    assert!(matches!(
        key.write_value("v", "x"),
        Err(KeyError::Store(HiveError::AccessDenied { .. }))
    ));
}

#[test]
fn close_and_drop_release_handles() {
    let hive = MemoryHive::shared();
    let mut key = open(&hive);
    assert_eq!(hive.open_handles(), 1);

    key.close();
    key.close();
    assert!(!key.is_valid());
    assert_eq!(hive.open_handles(), 0);
    assert!(matches!(key.read_value("v"), Err(KeyError::NotOpen)));

    let other = open(&hive);
    assert_eq!(hive.open_handles(), 1);
    drop(other);
    assert_eq!(hive.open_handles(), 0);
}

#[test]
fn pass_transfers_ownership() {
    let hive = MemoryHive::shared();
    let mut key = open(&hive);
    key.write_value("v", "passed").unwrap();

    let pass = key.pass();
    assert!(pass.handle().is_some());
    drop(pass);
    assert!(key.is_valid());

    key.start_watching().unwrap();
    let owned = key.pass().release().unwrap();
    assert!(!key.is_valid());
    assert!(!key.is_watching());
    assert_eq!(hive.open_handles(), 1);

    let adopted = RegKey::from_owned(owned);
    assert_eq!(adopted.read_value("v").unwrap(), "passed");
    drop(adopted);
    assert_eq!(hive.open_handles(), 0);

    assert!(key.pass().release().is_none());
}
