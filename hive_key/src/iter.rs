//! Descending enumerators over a node's values and subkeys.
//!
//! Both enumerators snapshot the entry count when they are built and walk
//! indices from `count - 1` down to 0. Deleting the entry under the cursor
//! only shifts entries at higher indices, which have already been visited,
//! so a caller can delete as it goes without skipping or repeating entries.
//! An entry that cannot be read leaves the cursor's output empty for that
//! step; traversal continues.

use std::sync::Arc;

use hive_core::{Access, HKey, Hive, OwnedKey, RawValue, ValueType};
use tracing::debug;

fn open_for_enumeration(
    hive: Arc<dyn Hive>,
    root: HKey,
    path: &str,
    count: impl FnOnce(hive_core::KeyInfo) -> u32,
) -> (Option<OwnedKey>, i64) {
    let raw = match hive.open_key(root, path, Access::READ) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(?root, path, "failed to open key for enumeration: {err}");
            return (None, -1);
        }
    };
    let key = OwnedKey::new(hive, raw);
    match key.hive().query_info(raw) {
        Ok(info) => (Some(key), i64::from(count(info)) - 1),
        Err(err) => {
            debug!(?root, path, "failed to query key for enumeration: {err}");
            (None, -1)
        }
    }
}

fn current_index(key: &Option<OwnedKey>, index: i64) -> Option<(&OwnedKey, u32)> {
    let key = key.as_ref()?;
    let index = u32::try_from(index).ok()?;
    Some((key, index))
}

/// Walks the values directly under a node, highest index first.
#[derive(Debug)]
pub struct ValueIterator {
    key: Option<OwnedKey>,
    index: i64,
    name: String,
    value: Option<RawValue>,
}

impl ValueIterator {
    /// Opens `path` under `root` for reading and positions the cursor on
    /// the last value. If the key cannot be opened the iterator starts out
    /// invalid.
    pub fn new(hive: Arc<dyn Hive>, root: HKey, path: &str) -> Self {
        let (key, index) = open_for_enumeration(hive, root, path, |info| info.values);
        let mut iter = Self {
            key,
            index,
            name: String::new(),
            value: None,
        };
        iter.read();
        iter
    }

    /// Current number of values under the node, re-queried on every call.
    pub fn value_count(&self) -> u32 {
        let Some(key) = &self.key else {
            return 0;
        };
        key.hive()
            .query_info(key.hkey())
            .map(|info| info.values)
            .unwrap_or(0)
    }

    pub fn valid(&self) -> bool {
        self.key.is_some() && self.index >= 0
    }

    /// Moves to the next lower index and reads the entry there.
    pub fn advance(&mut self) {
        if self.index >= 0 {
            self.index -= 1;
        }
        self.read();
    }

    fn read(&mut self) -> bool {
        if let Some((key, index)) = current_index(&self.key, self.index) {
            match key.hive().enum_value(key.hkey(), index) {
                Ok((name, value)) => {
                    self.name = name;
                    self.value = Some(value);
                    return true;
                }
                Err(err) => debug!(index, "failed to read value: {err}"),
            }
        }
        self.name.clear();
        self.value = None;
        false
    }

    /// Name of the entry under the cursor; empty when it could not be read.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload of the entry under the cursor; empty when it could not be read.
    pub fn value(&self) -> &[u8] {
        self.value
            .as_ref()
            .map(|value| value.data.as_ref())
            .unwrap_or_default()
    }

    pub fn value_size(&self) -> usize {
        self.value().len()
    }

    pub fn value_type(&self) -> Option<ValueType> {
        self.value.as_ref().map(|value| value.value_type)
    }

    /// The entry under the cursor as a typed value, if it could be read.
    pub fn raw_value(&self) -> Option<&RawValue> {
        self.value.as_ref()
    }
}

/// Yields each readable `(name, value)` pair in cursor order; steps whose
/// read failed are skipped.
impl Iterator for ValueIterator {
    type Item = (String, RawValue);

    fn next(&mut self) -> Option<Self::Item> {
        while self.valid() {
            let name = std::mem::take(&mut self.name);
            let value = self.value.take();
            self.advance();
            if let Some(value) = value {
                return Some((name, value));
            }
        }
        None
    }
}

/// Walks the subkeys directly under a node, highest index first.
#[derive(Debug)]
pub struct KeyIterator {
    key: Option<OwnedKey>,
    index: i64,
    name: String,
    read: bool,
}

impl KeyIterator {
    /// Opens `path` under `root` for reading and positions the cursor on
    /// the last subkey. If the key cannot be opened the iterator starts out
    /// invalid.
    pub fn new(hive: Arc<dyn Hive>, root: HKey, path: &str) -> Self {
        let (key, index) = open_for_enumeration(hive, root, path, |info| info.subkeys);
        let mut iter = Self {
            key,
            index,
            name: String::new(),
            read: false,
        };
        iter.read();
        iter
    }

    /// Current number of subkeys under the node, re-queried on every call.
    pub fn subkey_count(&self) -> u32 {
        let Some(key) = &self.key else {
            return 0;
        };
        key.hive()
            .query_info(key.hkey())
            .map(|info| info.subkeys)
            .unwrap_or(0)
    }

    pub fn valid(&self) -> bool {
        self.key.is_some() && self.index >= 0
    }

    /// Moves to the next lower index and reads the entry there.
    pub fn advance(&mut self) {
        if self.index >= 0 {
            self.index -= 1;
        }
        self.read();
    }

    fn read(&mut self) -> bool {
        self.read = false;
        self.name.clear();
        if let Some((key, index)) = current_index(&self.key, self.index) {
            match key.hive().enum_key(key.hkey(), index) {
                Ok(name) => {
                    self.name = name;
                    self.read = true;
                }
                Err(err) => debug!(index, "failed to read subkey: {err}"),
            }
        }
        self.read
    }

    /// Name of the subkey under the cursor; empty when it could not be read.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Yields each readable subkey name in cursor order; steps whose read
/// failed are skipped.
impl Iterator for KeyIterator {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        while self.valid() {
            let read = self.read;
            let name = std::mem::take(&mut self.name);
            self.advance();
            if read {
                return Some(name);
            }
        }
        None
    }
}
