use hive_core::{HKey, OwnedKey};

use crate::RegKey;

/// Hands a [`RegKey`]'s handle to a new owner.
///
/// Dropping a `PassKey` without calling [`PassKey::release`] leaves the key
/// untouched.
#[derive(Debug)]
#[must_use = "call `release` to take the handle"]
pub struct PassKey<'a> {
    key: &'a mut RegKey,
}

impl<'a> PassKey<'a> {
    pub(crate) fn new(key: &'a mut RegKey) -> Self {
        Self { key }
    }

    pub fn handle(&self) -> Option<HKey> {
        self.key.handle()
    }

    /// Stops any watch and detaches the handle. The key is left empty.
    pub fn release(self) -> Option<OwnedKey> {
        self.key.take_owned()
    }
}
