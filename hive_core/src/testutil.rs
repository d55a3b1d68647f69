//! Conformance suite for `Hive` implementations.
//!
//! Runs the same checks against any backend so that every implementation
//! reports the same results for the same calls.
//!
//! # Usage
//!
//! In your backend crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! hive_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! In your test file:
//!
//! ```ignore
//! use hive_core::testutil::HiveTests;
//!
//! #[test]
//! fn test_my_hive() {
//!     let hive = MyHive::new(...);
//!     HiveTests::new(&hive).run_all().unwrap();
//! }
//! ```

use crate::{
    Access, Disposition, HKey, Hive, HiveError, HiveResult, NotifyFilter, RawValue, ValueType,
    WaitEvent,
};
use rand::Rng;
use std::{collections::HashSet, sync::Arc};

const ROOT: HKey = HKey::CURRENT_USER;

/// Test suite for `Hive` implementations.
pub struct HiveTests<'a, H> {
    hive: &'a H,
    /// Subtree under HKEY_CURRENT_USER that the tests own
    prefix: String,
}

impl<'a, H: Hive> HiveTests<'a, H> {
    /// Create a new test suite for the given hive.
    pub fn new(hive: &'a H) -> Self {
        let prefix = format!("Software\\_test_{}", rand::rng().random::<u32>());
        Self { hive, prefix }
    }

    /// Create a new test suite with a custom prefix.
    pub fn with_prefix(hive: &'a H, prefix: impl Into<String>) -> Self {
        Self {
            hive,
            prefix: prefix.into(),
        }
    }

    fn path(&self, name: &str) -> String {
        format!("{}\\{}", self.prefix, name)
    }

    fn create(&self, name: &str) -> HiveResult<HKey> {
        let (key, _) = self
            .hive
            .create_key(ROOT, &self.path(name), Access::ALL_ACCESS)?;
        Ok(key)
    }

    /// Run all tests.
    pub fn run_all(&self) -> HiveResult<()> {
        self.test_create_then_open()?;
        self.test_disposition()?;
        self.test_open_missing()?;
        self.test_set_query_value()?;
        self.test_query_value_type()?;
        self.test_overwrite_value()?;
        self.test_case_insensitive_names()?;
        self.test_enum_values()?;
        self.test_enum_keys()?;
        self.test_delete_value()?;
        self.test_delete_tree()?;
        self.test_deleted_handle()?;
        self.test_access_checks()?;
        self.test_invalid_paths()?;
        self.test_notify_value_change()?;
        self.test_notify_subtree()?;
        self.test_close_discards_registration()?;
        self.test_cancel_registration()?;

        // Cleanup
        self.cleanup()?;

        Ok(())
    }

    /// A created path can be opened again, intermediate nodes included.
    pub fn test_create_then_open(&self) -> HiveResult<()> {
        let key = self.create("open\\deep\\leaf")?;
        self.hive.close_key(key)?;

        let leaf = self
            .hive
            .open_key(ROOT, &self.path("open\\deep\\leaf"), Access::READ)?;
        let middle = self
            .hive
            .open_key(ROOT, &self.path("open\\deep"), Access::READ)?;
        let again = self.hive.open_key(middle, "leaf", Access::READ)?;
        let same = self.hive.open_key(leaf, "", Access::READ)?;
        for key in [leaf, middle, again, same] {
            self.hive.close_key(key)?;
        }
        Ok(())
    }

    /// The first create reports a new key, later ones an existing key.
    pub fn test_disposition(&self) -> HiveResult<()> {
        let path = self.path("disposition");
        let (first, created) = self.hive.create_key(ROOT, &path, Access::ALL_ACCESS)?;
        let (second, opened) = self.hive.create_key(ROOT, &path, Access::ALL_ACCESS)?;
        assert_eq!(created, Disposition::CreatedNewKey);
        assert_eq!(opened, Disposition::OpenedExistingKey);
        self.hive.close_key(first)?;
        self.hive.close_key(second)?;
        Ok(())
    }

    /// Opening a path that was never created fails with `NotFound`.
    pub fn test_open_missing(&self) -> HiveResult<()> {
        let result = self
            .hive
            .open_key(ROOT, &self.path("never\\created"), Access::READ);
        assert!(
            matches!(result, Err(HiveError::NotFound)),
            "opening a missing key should fail with NotFound"
        );
        Ok(())
    }

    /// Values of every type read back with type tag and payload intact.
    pub fn test_set_query_value(&self) -> HiveResult<()> {
        let key = self.create("values")?;
        let values = [
            ("text", RawValue::string("hello")),
            ("expand", RawValue::expand_string("%TEMP%\\x")),
            ("number", RawValue::dword(42)),
            ("blob", RawValue::binary(vec![1u8, 2, 3, 4, 5])),
            ("", RawValue::string("default value")),
        ];
        for (name, value) in &values {
            self.hive.set_value(key, name, value.clone())?;
        }
        for (name, value) in &values {
            assert_eq!(&self.hive.query_value(key, name)?, value, "value {name:?}");
        }
        assert!(matches!(
            self.hive.query_value(key, "missing"),
            Err(HiveError::NotFound)
        ));
        self.hive.close_key(key)
    }

    /// The type of a value can be queried on its own.
    pub fn test_query_value_type(&self) -> HiveResult<()> {
        let key = self.create("value_types")?;
        self.hive.set_value(key, "Text", RawValue::string("x"))?;
        self.hive.set_value(key, "Blob", random_value(4096))?;

        assert_eq!(self.hive.query_value_type(key, "text")?, ValueType::String);
        assert_eq!(self.hive.query_value_type(key, "BLOB")?, ValueType::Binary);
        assert!(matches!(
            self.hive.query_value_type(key, "missing"),
            Err(HiveError::NotFound)
        ));
        self.hive.close_key(key)
    }

    /// Setting an existing value replaces type and payload in place.
    pub fn test_overwrite_value(&self) -> HiveResult<()> {
        let key = self.create("overwrite")?;
        self.hive.set_value(key, "v", RawValue::string("before"))?;
        self.hive.set_value(key, "v", RawValue::dword(7))?;
        let value = self.hive.query_value(key, "v")?;
        assert_eq!(value.value_type, ValueType::Dword);
        assert_eq!(value.to_u32(), Some(7));
        assert_eq!(self.hive.query_info(key)?.values, 1);
        self.hive.close_key(key)
    }

    /// Key and value names compare case-insensitively.
    pub fn test_case_insensitive_names(&self) -> HiveResult<()> {
        let key = self.create("Case\\Mixed")?;
        self.hive.set_value(key, "Name", RawValue::dword(1))?;
        assert_eq!(self.hive.query_value(key, "NAME")?.to_u32(), Some(1));
        self.hive.close_key(key)?;

        let upper = self
            .hive
            .open_key(ROOT, &self.path("CASE\\MIXED"), Access::READ)?;
        self.hive.close_key(upper)?;

        let parent = self
            .hive
            .open_key(ROOT, &self.path("case"), Access::READ)?;
        assert_eq!(self.hive.enum_key(parent, 0)?, "Mixed");
        self.hive.close_key(parent)
    }

    /// Enumeration visits every value exactly once and fails past the end.
    pub fn test_enum_values(&self) -> HiveResult<()> {
        let key = self.create("enum_values")?;
        for name in ["a", "b", "c"] {
            self.hive.set_value(key, name, RawValue::string(name))?;
        }
        let info = self.hive.query_info(key)?;
        assert_eq!(info.values, 3);

        let mut seen = HashSet::new();
        for index in 0..info.values {
            let (name, value) = self.hive.enum_value(key, index)?;
            assert_eq!(value.to_text().ok().as_deref(), Some(name.as_str()));
            seen.insert(name);
        }
        assert_eq!(seen.len(), 3);
        assert!(matches!(
            self.hive.enum_value(key, info.values),
            Err(HiveError::NotFound)
        ));
        self.hive.close_key(key)
    }

    /// Enumeration visits every direct child exactly once.
    pub fn test_enum_keys(&self) -> HiveResult<()> {
        for child in ["x", "y", "z\\grandchild"] {
            let key = self.create(&format!("enum_keys\\{child}"))?;
            self.hive.close_key(key)?;
        }
        let key = self
            .hive
            .open_key(ROOT, &self.path("enum_keys"), Access::READ)?;
        let info = self.hive.query_info(key)?;
        assert_eq!(info.subkeys, 3);

        let mut seen = HashSet::new();
        for index in 0..info.subkeys {
            seen.insert(self.hive.enum_key(key, index)?);
        }
        let expected: HashSet<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
        assert_eq!(seen, expected);
        assert!(matches!(
            self.hive.enum_key(key, info.subkeys),
            Err(HiveError::NotFound)
        ));
        self.hive.close_key(key)
    }

    /// Deleting a value removes only that value.
    pub fn test_delete_value(&self) -> HiveResult<()> {
        let key = self.create("delete_value")?;
        self.hive.set_value(key, "keep", RawValue::dword(1))?;
        self.hive.set_value(key, "drop", RawValue::dword(2))?;
        self.hive.delete_value(key, "DROP")?;
        assert!(matches!(
            self.hive.query_value(key, "drop"),
            Err(HiveError::NotFound)
        ));
        assert!(self.hive.query_value(key, "keep").is_ok());
        assert!(matches!(
            self.hive.delete_value(key, "drop"),
            Err(HiveError::NotFound)
        ));
        self.hive.close_key(key)
    }

    /// Deleting a key removes the whole subtree.
    pub fn test_delete_tree(&self) -> HiveResult<()> {
        let leaf = self.create("delete_tree\\child\\grandchild")?;
        self.hive.set_value(leaf, "v", RawValue::dword(1))?;
        self.hive.close_key(leaf)?;

        let parent = self.create("delete_tree")?;
        self.hive.delete_tree(parent, "CHILD")?;
        assert_eq!(self.hive.query_info(parent)?.subkeys, 0);
        self.hive.close_key(parent)?;

        let result = self.hive.open_key(
            ROOT,
            &self.path("delete_tree\\child\\grandchild"),
            Access::READ,
        );
        assert!(matches!(result, Err(HiveError::NotFound)));
        Ok(())
    }

    /// A handle to a deleted key fails every operation but close, even
    /// after a new key is created at the same path.
    pub fn test_deleted_handle(&self) -> HiveResult<()> {
        let doomed = self.create("deleted_handle\\doomed")?;
        let parent = self.create("deleted_handle")?;
        self.hive.delete_tree(parent, "doomed")?;

        assert!(matches!(
            self.hive.set_value(doomed, "v", RawValue::dword(1)),
            Err(HiveError::KeyDeleted)
        ));
        assert!(matches!(
            self.hive.query_info(doomed),
            Err(HiveError::KeyDeleted)
        ));

        let (reborn, disposition) = self
            .hive
            .create_key(parent, "doomed", Access::ALL_ACCESS)?;
        assert_eq!(disposition, Disposition::CreatedNewKey);
        assert!(matches!(
            self.hive.set_value(doomed, "v", RawValue::dword(1)),
            Err(HiveError::KeyDeleted)
        ));
        assert!(matches!(
            self.hive.query_info(doomed),
            Err(HiveError::KeyDeleted)
        ));
        let event = Arc::new(WaitEvent::new());
        assert!(matches!(
            self.hive.notify_change(doomed, true, NotifyFilter::ALL, &event),
            Err(HiveError::KeyDeleted)
        ));
        assert_eq!(self.hive.query_info(reborn)?.values, 0);

        self.hive.close_key(doomed)?;
        self.hive.close_key(reborn)?;
        self.hive.close_key(parent)
    }

    /// Operations need the matching access right; zero access is rejected.
    pub fn test_access_checks(&self) -> HiveResult<()> {
        let key = self.create("access")?;
        self.hive.close_key(key)?;

        let read_only = self
            .hive
            .open_key(ROOT, &self.path("access"), Access::READ)?;
        assert!(matches!(
            self.hive.set_value(read_only, "v", RawValue::dword(1)),
            Err(HiveError::AccessDenied { .. })
        ));
        assert!(matches!(
            self.hive.create_key(read_only, "child", Access::ALL_ACCESS),
            Err(HiveError::AccessDenied { .. })
        ));
        self.hive.close_key(read_only)?;

        let write_only = self
            .hive
            .open_key(ROOT, &self.path("access"), Access::SET_VALUE)?;
        assert!(matches!(
            self.hive.query_info(write_only),
            Err(HiveError::AccessDenied { .. })
        ));
        self.hive.close_key(write_only)?;

        assert!(matches!(
            self.hive
                .open_key(ROOT, &self.path("access"), Access::empty()),
            Err(HiveError::InvalidParameter(_))
        ));
        Ok(())
    }

    /// Malformed paths and handles are rejected.
    pub fn test_invalid_paths(&self) -> HiveResult<()> {
        assert!(matches!(
            self.hive
                .create_key(ROOT, &format!("{}\\\\bad", self.prefix), Access::ALL_ACCESS),
            Err(HiveError::InvalidPath(_))
        ));
        assert!(matches!(
            self.hive.query_info(HKey::from_raw(u64::MAX >> 2)),
            Err(HiveError::InvalidHandle(_))
        ));
        Ok(())
    }

    /// A registration fires once on a value change and then disarms.
    pub fn test_notify_value_change(&self) -> HiveResult<()> {
        let key = self.create("notify")?;
        let event = Arc::new(WaitEvent::new());
        self.hive
            .notify_change(key, true, NotifyFilter::ALL, &event)?;
        assert!(!event.is_signaled());

        self.hive.set_value(key, "v", RawValue::dword(1))?;
        assert!(event.is_signaled(), "value change should signal the event");

        event.reset();
        self.hive.set_value(key, "v", RawValue::dword(2))?;
        assert!(!event.is_signaled(), "registration should be one-shot");
        self.hive.close_key(key)
    }

    /// Subtree registrations see changes in descendants.
    pub fn test_notify_subtree(&self) -> HiveResult<()> {
        let watched = self.create("notify_tree")?;
        let child = self.create("notify_tree\\a\\b")?;

        let shallow = Arc::new(WaitEvent::new());
        let deep = Arc::new(WaitEvent::new());
        self.hive
            .notify_change(watched, false, NotifyFilter::LAST_SET, &shallow)?;
        self.hive
            .notify_change(watched, true, NotifyFilter::LAST_SET, &deep)?;

        self.hive.set_value(child, "v", RawValue::dword(1))?;
        assert!(deep.is_signaled());
        assert!(!shallow.is_signaled());

        let added = Arc::new(WaitEvent::new());
        self.hive
            .notify_change(watched, false, NotifyFilter::NAME, &added)?;
        let sibling = self.create("notify_tree\\c")?;
        assert!(added.is_signaled(), "new subkey should signal NAME");

        for key in [watched, child, sibling] {
            self.hive.close_key(key)?;
        }
        Ok(())
    }

    /// Closing the handle discards its pending registration.
    pub fn test_close_discards_registration(&self) -> HiveResult<()> {
        let watched = self.create("notify_close")?;
        let writer = self.create("notify_close")?;
        let event = Arc::new(WaitEvent::new());
        self.hive
            .notify_change(watched, true, NotifyFilter::ALL, &event)?;
        self.hive.close_key(watched)?;

        self.hive.set_value(writer, "v", RawValue::dword(1))?;
        assert!(!event.is_signaled());
        self.hive.close_key(writer)
    }

    /// Canceling drops the registration while the caller still holds the
    /// event.
    pub fn test_cancel_registration(&self) -> HiveResult<()> {
        let watched = self.create("notify_cancel")?;
        let event = Arc::new(WaitEvent::new());
        self.hive
            .notify_change(watched, true, NotifyFilter::ALL, &event)?;
        self.hive.cancel_notify(watched, &event)?;

        self.hive.set_value(watched, "v", RawValue::dword(1))?;
        assert!(!event.is_signaled());
        // Canceling again is harmless.
        self.hive.cancel_notify(watched, &event)?;
        self.hive.close_key(watched)
    }

    /// Remove everything below the prefix.
    pub fn cleanup(&self) -> HiveResult<()> {
        let Some((parent, leaf)) = self.prefix.rsplit_once('\\') else {
            return Ok(());
        };
        let (key, _) = self.hive.create_key(ROOT, parent, Access::ALL_ACCESS)?;
        let result = self.hive.delete_tree(key, leaf);
        self.hive.close_key(key)?;
        match result {
            Err(HiveError::NotFound) => Ok(()),
            other => other,
        }
    }
}

/// Generate a random binary value for testing.
pub fn random_value(len: usize) -> RawValue {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    RawValue::binary(data)
}
