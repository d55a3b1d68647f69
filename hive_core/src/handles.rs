//! Allocation and lookup of backend handle values.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::{Access, HKey, HiveError, HiveResult};

/// An entry in a [`HandleTable`]: the backend's node reference plus the
/// rights the handle was opened with.
#[derive(Debug, Clone)]
pub struct OpenHandle<T> {
    pub node: T,
    pub access: Access,
}

impl<T> OpenHandle<T> {
    /// Fails with `AccessDenied` unless the handle holds every right in
    /// `required`.
    pub fn require(&self, required: Access) -> HiveResult<()> {
        if self.access.contains(required) {
            Ok(())
        } else {
            Err(HiveError::AccessDenied { required })
        }
    }
}

/// Concurrent table of open handles.
///
/// Issued handle values start at 1 and never collide with the predefined
/// roots.
#[derive(Debug)]
pub struct HandleTable<T> {
    next: AtomicU64,
    open: DashMap<u64, OpenHandle<T>>,
}

impl<T: Clone> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            open: DashMap::new(),
        }
    }

    pub fn insert(&self, node: T, access: Access) -> HKey {
        let raw = self.next.fetch_add(1, Ordering::Relaxed);
        self.open.insert(raw, OpenHandle { node, access });
        HKey::from_raw(raw)
    }

    pub fn get(&self, key: HKey) -> HiveResult<OpenHandle<T>> {
        self.open
            .get(&key.as_raw())
            .map(|entry| entry.value().clone())
            .ok_or(HiveError::InvalidHandle(key))
    }

    pub fn remove(&self, key: HKey) -> HiveResult<OpenHandle<T>> {
        self.open
            .remove(&key.as_raw())
            .map(|(_, entry)| entry)
            .ok_or(HiveError::InvalidHandle(key))
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

impl<T: Clone> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_handles_are_unique_and_removable() {
        let table = HandleTable::new();
        let a = table.insert("a", Access::READ);
        let b = table.insert("b", Access::ALL_ACCESS);
        assert_ne!(a, b);
        assert!(!a.is_predefined());

        assert_eq!(table.get(a).unwrap().node, "a");
        table.remove(a).unwrap();
        assert!(matches!(table.get(a), Err(HiveError::InvalidHandle(_))));
        assert!(matches!(table.remove(a), Err(HiveError::InvalidHandle(_))));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn rights_are_checked() {
        let table = HandleTable::new();
        let key = table.insert((), Access::READ);
        let handle = table.get(key).unwrap();
        assert!(handle.require(Access::QUERY_VALUE).is_ok());
        assert!(matches!(
            handle.require(Access::SET_VALUE),
            Err(HiveError::AccessDenied { .. })
        ));
    }
}
