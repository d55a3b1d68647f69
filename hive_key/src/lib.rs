//! Owned key handles and enumerators over a [`Hive`](hive_core::Hive).
//!
//! [`RegKey`] wraps at most one open handle and closes it on every exit
//! path. It adds typed value access, recursive key deletion and a polled
//! change watch on top of the raw backend calls.
//!
//! [`ValueIterator`] and [`KeyIterator`] walk a node's values and subkeys
//! from the highest index down to zero, so the entry under the cursor can be
//! deleted without skipping or repeating its siblings.
//!
//! ```
//! use hive_core::{Access, HKey};
//! use hive_key::{KeyIterator, RegKey};
//! use hive_store_memory::MemoryHive;
//!
//! let hive = MemoryHive::shared();
//! let mut key = RegKey::new(hive.clone());
//! key.create(HKey::CURRENT_USER, "Software\\Demo\\One", Access::ALL_ACCESS)?;
//! key.write_value("greeting", "hello")?;
//! assert_eq!(key.read_value("greeting")?, "hello");
//!
//! let names: Vec<String> = KeyIterator::new(hive, HKey::CURRENT_USER, "Software\\Demo").collect();
//! assert_eq!(names, ["One"]);
//! # Ok::<(), hive_key::KeyError>(())
//! ```

mod error;
mod iter;
mod pass;
mod reg_key;

pub use error::{KeyError, KeyResult};
pub use iter::{KeyIterator, ValueIterator};
pub use pass::PassKey;
pub use reg_key::RegKey;
