//! Core hive types and traits.
//!
//! This crate defines the shared vocabulary of every hive crate: the
//! [`Hive`] trait that backends implement, handle and access-mask types,
//! typed value payloads, the manual-reset [`WaitEvent`] used for change
//! notification, and the environment lookup behind expandable strings.
//!
//! ## Backend building blocks
//!
//! Backends share the same path rules ([`path`]), handle bookkeeping
//! ([`handles::HandleTable`]) and change registrations
//! ([`watch::WatchList`]), so every implementation reports the same
//! errors and fires the same notifications for the same operations.
//!
//! Implementations live in `hive_store_memory` (`MemoryHive`) and
//! `hive_store_redb` (`RedbHive`). The key wrapper and enumerators built on
//! top of this trait live in `hive_key`.

pub mod env;
pub mod event;
pub mod handles;
mod hive;
pub mod key;
pub mod path;
pub mod value;
pub mod watch;

// Conformance suite for Hive implementations (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use env::{Environment, ExpandError, MapEnvironment, ProcessEnvironment};
pub use event::WaitEvent;
pub use hive::{Hive, HiveError, HiveFeatures, HiveResult, OwnedKey};
pub use key::{Access, Disposition, HKey, KeyInfo, RootKey};
pub use value::{MAX_STRING_LENGTH, RawValue, ValueType};
pub use watch::NotifyFilter;
