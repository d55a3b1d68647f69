use std::sync::Arc;

use bytes::Bytes;
use hive_core::{
    Access, Disposition, Environment, HKey, Hive, MAX_STRING_LENGTH, NotifyFilter, OwnedKey,
    ProcessEnvironment, RawValue, ValueType, WaitEvent, env::expand_environment_strings,
};
use tracing::{debug, warn};

use crate::{KeyError, KeyResult, pass::PassKey};

/// Exclusive owner of zero or one open key handle.
///
/// Every operation on an empty key fails without touching the store. The
/// handle is closed when the key is closed, reopened, or dropped, and any
/// change watch is cancelled before the handle goes away.
pub struct RegKey {
    hive: Arc<dyn Hive>,
    key: Option<OwnedKey>,
    watch_event: Option<Arc<WaitEvent>>,
    env: Arc<dyn Environment>,
}

impl RegKey {
    /// An empty key bound to `hive`.
    pub fn new(hive: Arc<dyn Hive>) -> Self {
        Self {
            hive,
            key: None,
            watch_event: None,
            env: Arc::new(ProcessEnvironment),
        }
    }

    /// Creates `path` under `root` when `access` asks for any write right,
    /// otherwise opens it. Failure leaves the key empty.
    pub fn with_access(hive: Arc<dyn Hive>, root: HKey, path: &str, access: Access) -> Self {
        let mut key = Self::new(hive);
        let result = if access.wants_write() {
            key.create(root, path, access)
        } else {
            key.open(root, path, access)
        };
        if let Err(err) = result {
            debug!(?root, path, "failed to open key: {err}");
        }
        key
    }

    /// Adopts an already open handle.
    pub fn from_owned(key: OwnedKey) -> Self {
        let mut this = Self::new(key.hive().clone());
        this.key = Some(key);
        this
    }

    /// Resolves `%NAME%` placeholders against `env` instead of the process
    /// environment.
    pub fn with_environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = env;
        self
    }

    pub fn hive(&self) -> &Arc<dyn Hive> {
        &self.hive
    }

    pub fn handle(&self) -> Option<HKey> {
        self.key.as_ref().map(OwnedKey::hkey)
    }

    pub fn is_valid(&self) -> bool {
        self.key.is_some()
    }

    fn raw(&self) -> KeyResult<HKey> {
        self.handle().ok_or(KeyError::NotOpen)
    }

    fn adopt(&mut self, raw: HKey) {
        self.key = Some(OwnedKey::new(self.hive.clone(), raw));
    }

    pub fn create(&mut self, root: HKey, path: &str, access: Access) -> KeyResult<()> {
        self.create_with_disposition(root, path, access).map(|_| ())
    }

    /// Opens `path` under `root`, creating every missing component, and
    /// reports whether the final node was new.
    pub fn create_with_disposition(
        &mut self,
        root: HKey,
        path: &str,
        access: Access,
    ) -> KeyResult<Disposition> {
        self.close();
        if access.is_empty() {
            return Err(KeyError::InvalidAccess);
        }
        let (raw, disposition) = self.hive.create_key(root, path, access)?;
        self.adopt(raw);
        Ok(disposition)
    }

    /// Opens an existing `path` under `root`.
    pub fn open(&mut self, root: HKey, path: &str, access: Access) -> KeyResult<()> {
        self.close();
        if access.is_empty() {
            return Err(KeyError::InvalidAccess);
        }
        let raw = self.hive.open_key(root, path, access)?;
        self.adopt(raw);
        Ok(())
    }

    /// Creates or opens the child `name` and moves this key onto it.
    ///
    /// The current handle is closed whether or not the child could be
    /// reached, so a failure leaves the key empty.
    pub fn create_key(&mut self, name: &str, access: Access) -> KeyResult<()> {
        let child = self.descend(access, |hive, parent| {
            hive.create_key(parent, name, access).map(|(raw, _)| raw)
        });
        self.replace(child)
    }

    /// Opens the existing child `name` and moves this key onto it.
    ///
    /// Like [`RegKey::create_key`], the current handle is closed even when
    /// the child does not exist.
    pub fn open_key(&mut self, name: &str, access: Access) -> KeyResult<()> {
        let child = self.descend(access, |hive, parent| hive.open_key(parent, name, access));
        self.replace(child)
    }

    fn descend(
        &self,
        access: Access,
        step: impl FnOnce(&dyn Hive, HKey) -> hive_core::HiveResult<HKey>,
    ) -> KeyResult<HKey> {
        let parent = self.raw()?;
        if access.is_empty() {
            return Err(KeyError::InvalidAccess);
        }
        Ok(step(self.hive.as_ref(), parent)?)
    }

    fn replace(&mut self, child: KeyResult<HKey>) -> KeyResult<()> {
        self.close();
        let raw = child?;
        self.adopt(raw);
        Ok(())
    }

    /// Number of values directly under this key, or 0 when it cannot be
    /// queried.
    pub fn value_count(&self) -> u32 {
        let Some(raw) = self.handle() else {
            return 0;
        };
        match self.hive.query_info(raw) {
            Ok(info) => info.values,
            Err(err) => {
                debug!(key = ?raw, "failed to query key: {err}");
                0
            }
        }
    }

    /// Name of the value at `index` in the backend's enumeration order.
    pub fn read_name(&self, index: u32) -> KeyResult<String> {
        let (name, _) = self.hive.enum_value(self.raw()?, index)?;
        Ok(name)
    }

    /// Whether `name` exists, without fetching its payload.
    pub fn value_exists(&self, name: &str) -> bool {
        self.raw()
            .is_ok_and(|raw| self.hive.query_value_type(raw, name).is_ok())
    }

    /// Payload and type of `name`, unconverted.
    pub fn read_raw_value(&self, name: &str) -> KeyResult<RawValue> {
        Ok(self.hive.query_value(self.raw()?, name)?)
    }

    /// Reads a string value.
    ///
    /// Expandable strings come back with `%NAME%` placeholders resolved.
    /// Payloads and expansions longer than [`MAX_STRING_LENGTH`] units fail
    /// instead of being truncated.
    pub fn read_value(&self, name: &str) -> KeyResult<String> {
        let raw = self.read_raw_value(name)?;
        if !raw.value_type.is_string() {
            return Err(KeyError::TypeMismatch {
                expected: "string",
                actual: raw.value_type,
            });
        }
        let units = raw.len() / 2;
        if units > MAX_STRING_LENGTH {
            return Err(KeyError::TooLong {
                len: units,
                max: MAX_STRING_LENGTH,
            });
        }

        let text = raw.to_text()?;
        match raw.value_type {
            ValueType::ExpandString => Ok(expand_environment_strings(
                &text,
                self.env.as_ref(),
                MAX_STRING_LENGTH,
            )?),
            _ => Ok(text),
        }
    }

    /// Reads a 32-bit value stored as a dword or as exactly four bytes of
    /// binary data.
    pub fn read_value_dw(&self, name: &str) -> KeyResult<u32> {
        let raw = self.read_raw_value(name)?;
        if !matches!(raw.value_type, ValueType::Dword | ValueType::Binary) {
            return Err(KeyError::TypeMismatch {
                expected: "dword",
                actual: raw.value_type,
            });
        }
        raw.to_u32().ok_or(KeyError::SizeMismatch {
            expected: 4,
            actual: raw.len(),
        })
    }

    /// Stores `data` under `name` with an explicit type tag.
    pub fn write_raw_value(
        &self,
        name: &str,
        data: impl Into<Bytes>,
        value_type: ValueType,
    ) -> KeyResult<()> {
        let raw = self.raw()?;
        Ok(self.hive.set_value(raw, name, RawValue::new(value_type, data))?)
    }

    /// Stores a string, terminator included.
    pub fn write_value(&self, name: &str, value: &str) -> KeyResult<()> {
        let raw = self.raw()?;
        Ok(self.hive.set_value(raw, name, RawValue::string(value))?)
    }

    /// Stores a string whose `%NAME%` placeholders are resolved on read.
    pub fn write_expand_value(&self, name: &str, value: &str) -> KeyResult<()> {
        let raw = self.raw()?;
        Ok(self.hive.set_value(raw, name, RawValue::expand_string(value))?)
    }

    pub fn write_value_dw(&self, name: &str, value: u32) -> KeyResult<()> {
        let raw = self.raw()?;
        Ok(self.hive.set_value(raw, name, RawValue::dword(value))?)
    }

    /// Deletes the child `name` and everything below it.
    pub fn delete_key(&self, name: &str) -> KeyResult<()> {
        Ok(self.hive.delete_tree(self.raw()?, name)?)
    }

    pub fn delete_value(&self, name: &str) -> KeyResult<()> {
        Ok(self.hive.delete_value(self.raw()?, name)?)
    }

    /// Arms a one-shot watch on this key and its whole subtree.
    ///
    /// The wait object is created on first use and reset on every arm.
    /// Arming failures discard it, leaving the key unwatched.
    pub fn start_watching(&mut self) -> KeyResult<()> {
        let event = self
            .watch_event
            .get_or_insert_with(|| Arc::new(WaitEvent::new()))
            .clone();
        event.reset();

        let armed = self.raw().and_then(|raw| {
            self.hive
                .notify_change(raw, true, NotifyFilter::ALL, &event)
                .map_err(KeyError::from)
        });
        if let Err(err) = armed {
            debug!(key = ?self.handle(), "failed to arm watch: {err}");
            self.watch_event = None;
            return Err(err);
        }
        Ok(())
    }

    /// Polls the watch without blocking.
    ///
    /// Returns true once per observed change and re-arms the watch, so
    /// later changes are reported by later calls.
    pub fn has_changed(&mut self) -> bool {
        let signaled = self
            .watch_event
            .as_ref()
            .is_some_and(|event| event.is_signaled());
        if !signaled {
            return false;
        }
        if let Err(err) = self.start_watching() {
            debug!(key = ?self.handle(), "failed to re-arm watch: {err}");
        }
        true
    }

    /// Cancels the watch. Returns false when there was none.
    ///
    /// The registration is withdrawn from the store, so clones handed out by
    /// [`RegKey::watch_event`] are not signaled by later changes.
    pub fn stop_watching(&mut self) -> bool {
        let Some(event) = self.watch_event.take() else {
            return false;
        };
        if let Some(raw) = self.handle()
            && let Err(err) = self.hive.cancel_notify(raw, &event)
        {
            debug!(key = ?raw, "failed to cancel watch: {err}");
        }
        true
    }

    pub fn is_watching(&self) -> bool {
        self.watch_event.is_some()
    }

    /// The current wait object, for callers that block on changes instead
    /// of polling [`RegKey::has_changed`].
    pub fn watch_event(&self) -> Option<Arc<WaitEvent>> {
        self.watch_event.clone()
    }

    /// Stops any watch and closes the handle. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.stop_watching();
        if let Some(key) = self.key.take() {
            let raw = key.hkey();
            if let Err(err) = key.close() {
                warn!(key = ?raw, "failed to close key: {err}");
            }
        }
    }

    /// Starts handing the open handle to a new owner.
    pub fn pass(&mut self) -> PassKey<'_> {
        PassKey::new(self)
    }

    pub(crate) fn take_owned(&mut self) -> Option<OwnedKey> {
        self.stop_watching();
        self.key.take()
    }
}

impl Drop for RegKey {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RegKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegKey")
            .field("key", &self.handle())
            .field("watching", &self.is_watching())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoHive;

    impl Hive for NoHive {
        fn open_key(&self, _: HKey, _: &str, _: Access) -> hive_core::HiveResult<HKey> {
            Err(hive_core::HiveError::NotFound)
        }
        fn create_key(
            &self,
            _: HKey,
            _: &str,
            _: Access,
        ) -> hive_core::HiveResult<(HKey, Disposition)> {
            Err(hive_core::HiveError::NotFound)
        }
        fn close_key(&self, _: HKey) -> hive_core::HiveResult<()> {
            Ok(())
        }
        fn query_info(&self, _: HKey) -> hive_core::HiveResult<hive_core::KeyInfo> {
            Err(hive_core::HiveError::NotFound)
        }
        fn enum_value(&self, _: HKey, _: u32) -> hive_core::HiveResult<(String, RawValue)> {
            Err(hive_core::HiveError::NotFound)
        }
        fn enum_key(&self, _: HKey, _: u32) -> hive_core::HiveResult<String> {
            Err(hive_core::HiveError::NotFound)
        }
        fn query_value(&self, _: HKey, _: &str) -> hive_core::HiveResult<RawValue> {
            Err(hive_core::HiveError::NotFound)
        }
        // Reports a type for "typed" while refusing every payload read.
        fn query_value_type(&self, _: HKey, name: &str) -> hive_core::HiveResult<ValueType> {
            match name {
                "typed" => Ok(ValueType::Binary),
                _ => Err(hive_core::HiveError::NotFound),
            }
        }
        fn set_value(&self, _: HKey, _: &str, _: RawValue) -> hive_core::HiveResult<()> {
            Err(hive_core::HiveError::NotFound)
        }
        fn delete_value(&self, _: HKey, _: &str) -> hive_core::HiveResult<()> {
            Err(hive_core::HiveError::NotFound)
        }
        fn delete_tree(&self, _: HKey, _: &str) -> hive_core::HiveResult<()> {
            Err(hive_core::HiveError::NotFound)
        }
        fn notify_change(
            &self,
            _: HKey,
            _: bool,
            _: NotifyFilter,
            _: &Arc<WaitEvent>,
        ) -> hive_core::HiveResult<()> {
            Err(hive_core::HiveError::NotFound)
        }
        fn cancel_notify(&self, _: HKey, _: &Arc<WaitEvent>) -> hive_core::HiveResult<()> {
            Ok(())
        }
        fn features(&self) -> hive_core::HiveFeatures {
            hive_core::HiveFeatures {
                persistent: false,
                case_sensitive: false,
            }
        }
    }

    fn empty() -> RegKey {
        RegKey::new(Arc::new(NoHive))
    }

    #[test]
    fn empty_key_rejects_everything() {
        let mut key = empty();
        assert!(!key.is_valid());
        assert_eq!(key.value_count(), 0);
        assert!(!key.value_exists("v"));
        assert!(matches!(key.read_value("v"), Err(KeyError::NotOpen)));
        assert!(matches!(key.write_value_dw("v", 1), Err(KeyError::NotOpen)));
        assert!(matches!(key.delete_key("k"), Err(KeyError::NotOpen)));
        assert!(matches!(key.open_key("k", Access::READ), Err(KeyError::NotOpen)));
    }

    #[test]
    fn failed_watch_leaves_key_unwatched() {
        let mut key = empty();
        assert!(key.start_watching().is_err());
        assert!(!key.is_watching());
        assert!(!key.has_changed());
        assert!(!key.stop_watching());
    }

    #[test]
    fn zero_access_is_rejected_before_the_store() {
        let mut key = empty();
        assert!(matches!(
            key.open(HKey::CURRENT_USER, "a", Access::empty()),
            Err(KeyError::InvalidAccess)
        ));
        assert!(matches!(
            key.create(HKey::CURRENT_USER, "a", Access::empty()),
            Err(KeyError::InvalidAccess)
        ));
    }

    #[test]
    fn value_exists_does_not_read_the_payload() {
        let key = RegKey::from_owned(OwnedKey::new(Arc::new(NoHive), HKey::CURRENT_USER));
        assert!(key.read_raw_value("typed").is_err());
        assert!(key.value_exists("typed"));
        assert!(!key.value_exists("untyped"));
    }

    #[test]
    fn close_is_idempotent() {
        let mut key = RegKey::from_owned(OwnedKey::new(Arc::new(NoHive), HKey::CURRENT_USER));
        assert_eq!(key.handle(), Some(HKey::CURRENT_USER));
        key.close();
        key.close();
        assert!(!key.is_valid());
    }
}
