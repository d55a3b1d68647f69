use std::sync::Arc;

use tracing::warn;

use crate::{
    Access, Disposition, HKey, KeyInfo, RawValue, ValueType, event::WaitEvent,
    watch::NotifyFilter,
};

pub type HiveResult<T, E = HiveError> = std::result::Result<T, E>;

/// Failures reported by a [`Hive`] backend.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum HiveError {
    #[error("key or value not found")]
    NotFound,

    #[error("key has been deleted")]
    KeyDeleted,

    #[error("access denied: handle lacks {required:?}")]
    AccessDenied { required: Access },

    #[error("invalid handle {0:?}")]
    InvalidHandle(HKey),

    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl HiveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, HiveError::NotFound)
    }
}

/// What a backend offers beyond the common contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HiveFeatures {
    /// Contents survive the process.
    pub persistent: bool,
    pub case_sensitive: bool,
}

/// The native hierarchical store: nodes addressed by `\`-separated paths
/// under predefined roots, each holding typed values and child nodes.
///
/// Every call is synchronous and self-contained; implementations provide
/// their own internal locking so a hive can be shared behind an `Arc`.
/// Callers are expected to pair every handle returned by
/// [`open_key`](Hive::open_key) or [`create_key`](Hive::create_key) with
/// exactly one [`close_key`](Hive::close_key); [`OwnedKey`] does that.
///
/// # Example
///
/// ```
/// use hive_core::{Access, HKey, Hive, HiveResult, RawValue, ValueType};
///
/// fn greet(hive: &dyn Hive) -> HiveResult<()> {
///     let (key, _disposition) =
///         hive.create_key(HKey::CURRENT_USER, "Software\\Demo", Access::ALL_ACCESS)?;
///     hive.set_value(key, "Greeting", RawValue::string("hello"))?;
///     assert_eq!(hive.query_value_type(key, "greeting")?, ValueType::String);
///     hive.close_key(key)
/// }
/// # let _: fn(&dyn Hive) -> HiveResult<()> = greet;
/// ```
pub trait Hive: std::fmt::Debug + Send + Sync + 'static {
    /// Opens the existing node at `path` below `parent`.
    fn open_key(&self, parent: HKey, path: &str, access: Access) -> HiveResult<HKey>;

    /// Opens the node at `path` below `parent`, creating it and every missing
    /// intermediate node.
    fn create_key(
        &self,
        parent: HKey,
        path: &str,
        access: Access,
    ) -> HiveResult<(HKey, Disposition)>;

    /// Releases a handle and any change registrations made through it.
    /// Closing a predefined root is a no-op.
    fn close_key(&self, key: HKey) -> HiveResult<()>;

    fn query_info(&self, key: HKey) -> HiveResult<KeyInfo>;

    /// Name and payload of the value at enumeration position `index`.
    fn enum_value(&self, key: HKey, index: u32) -> HiveResult<(String, RawValue)>;

    /// Name of the subkey at enumeration position `index`.
    fn enum_key(&self, key: HKey, index: u32) -> HiveResult<String>;

    fn query_value(&self, key: HKey, name: &str) -> HiveResult<RawValue>;

    /// Type of the value `name`, without reading its payload.
    fn query_value_type(&self, key: HKey, name: &str) -> HiveResult<ValueType>;

    fn set_value(&self, key: HKey, name: &str, value: RawValue) -> HiveResult<()>;

    fn delete_value(&self, key: HKey, name: &str) -> HiveResult<()>;

    /// Deletes the child `subkey` and its whole subtree.
    fn delete_tree(&self, key: HKey, subkey: &str) -> HiveResult<()>;

    /// Arms a one-shot registration that signals `event` on the next change
    /// matching `filter` at the node (or anywhere below it when
    /// `watch_subtree` is set). The registration holds `event` weakly.
    fn notify_change(
        &self,
        key: HKey,
        watch_subtree: bool,
        filter: NotifyFilter,
        event: &Arc<WaitEvent>,
    ) -> HiveResult<()>;

    /// Discards the pending registration made through `key` that signals
    /// `event`. Nothing happens if it already fired.
    fn cancel_notify(&self, key: HKey, event: &Arc<WaitEvent>) -> HiveResult<()>;

    fn features(&self) -> HiveFeatures;
}

macro_rules! forward_hive {
    ($($ty:ty),*) => {$(
        impl<T: Hive + ?Sized> Hive for $ty {
            fn open_key(&self, parent: HKey, path: &str, access: Access) -> HiveResult<HKey> {
                (**self).open_key(parent, path, access)
            }

            fn create_key(
                &self,
                parent: HKey,
                path: &str,
                access: Access,
            ) -> HiveResult<(HKey, Disposition)> {
                (**self).create_key(parent, path, access)
            }

            fn close_key(&self, key: HKey) -> HiveResult<()> {
                (**self).close_key(key)
            }

            fn query_info(&self, key: HKey) -> HiveResult<KeyInfo> {
                (**self).query_info(key)
            }

            fn enum_value(&self, key: HKey, index: u32) -> HiveResult<(String, RawValue)> {
                (**self).enum_value(key, index)
            }

            fn enum_key(&self, key: HKey, index: u32) -> HiveResult<String> {
                (**self).enum_key(key, index)
            }

            fn query_value(&self, key: HKey, name: &str) -> HiveResult<RawValue> {
                (**self).query_value(key, name)
            }

            fn query_value_type(&self, key: HKey, name: &str) -> HiveResult<ValueType> {
                (**self).query_value_type(key, name)
            }

            fn set_value(&self, key: HKey, name: &str, value: RawValue) -> HiveResult<()> {
                (**self).set_value(key, name, value)
            }

            fn delete_value(&self, key: HKey, name: &str) -> HiveResult<()> {
                (**self).delete_value(key, name)
            }

            fn delete_tree(&self, key: HKey, subkey: &str) -> HiveResult<()> {
                (**self).delete_tree(key, subkey)
            }

            fn notify_change(
                &self,
                key: HKey,
                watch_subtree: bool,
                filter: NotifyFilter,
                event: &Arc<WaitEvent>,
            ) -> HiveResult<()> {
                (**self).notify_change(key, watch_subtree, filter, event)
            }

            fn cancel_notify(&self, key: HKey, event: &Arc<WaitEvent>) -> HiveResult<()> {
                (**self).cancel_notify(key, event)
            }

            fn features(&self) -> HiveFeatures {
                (**self).features()
            }
        }
    )*};
}

forward_hive!(Arc<T>, Box<T>);

/// An exclusively owned handle that is closed when dropped.
///
/// Predefined roots can be wrapped too; they are never closed.
pub struct OwnedKey {
    hive: Arc<dyn Hive>,
    key: HKey,
    released: bool,
}

impl OwnedKey {
    pub fn new(hive: Arc<dyn Hive>, key: HKey) -> Self {
        Self {
            hive,
            key,
            released: false,
        }
    }

    pub fn hkey(&self) -> HKey {
        self.key
    }

    pub fn hive(&self) -> &Arc<dyn Hive> {
        &self.hive
    }

    /// Gives up ownership; the caller becomes responsible for closing the
    /// returned handle.
    pub fn into_raw(mut self) -> HKey {
        self.released = true;
        self.key
    }

    /// Closes the handle now, reporting any failure.
    pub fn close(mut self) -> HiveResult<()> {
        self.released = true;
        if self.key.is_predefined() {
            return Ok(());
        }
        self.hive.close_key(self.key)
    }
}

impl std::fmt::Debug for OwnedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedKey").field("key", &self.key).finish()
    }
}

impl Drop for OwnedKey {
    fn drop(&mut self) {
        if self.released || self.key.is_predefined() {
            return;
        }
        if let Err(err) = self.hive.close_key(self.key) {
            warn!(key = ?self.key, "failed to close key: {err}");
        }
    }
}
