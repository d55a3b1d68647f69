//! Handle, root and access-mask types shared by every hive backend.

use std::{fmt, ops, str::FromStr};

/// Opaque handle to an open node in a hive.
///
/// Predefined roots are reserved constants that are always open. Every other
/// value is issued by [`crate::Hive::open_key`] or [`crate::Hive::create_key`]
/// and stays valid until passed to [`crate::Hive::close_key`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HKey(u64);

impl HKey {
    pub const CLASSES_ROOT: HKey = HKey(RootKey::BASE);
    pub const CURRENT_USER: HKey = HKey(RootKey::BASE + 1);
    pub const LOCAL_MACHINE: HKey = HKey(RootKey::BASE + 2);
    pub const USERS: HKey = HKey(RootKey::BASE + 3);
    pub const CURRENT_CONFIG: HKey = HKey(RootKey::BASE + 5);

    /// Wraps a raw handle value issued by a backend.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns the predefined root this handle stands for, if any.
    pub fn root(self) -> Option<RootKey> {
        RootKey::ALL.into_iter().find(|root| root.hkey() == self)
    }

    pub fn is_predefined(self) -> bool {
        self.root().is_some()
    }
}

impl fmt::Debug for HKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root() {
            Some(root) => write!(f, "HKey({})", root.name()),
            None => write!(f, "HKey({:#x})", self.0),
        }
    }
}

impl From<RootKey> for HKey {
    fn from(root: RootKey) -> Self {
        root.hkey()
    }
}

/// The predefined top-level anchors of a hive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RootKey {
    ClassesRoot,
    CurrentUser,
    LocalMachine,
    Users,
    CurrentConfig,
}

impl RootKey {
    const BASE: u64 = 0x8000_0000;

    pub const ALL: [RootKey; 5] = [
        RootKey::ClassesRoot,
        RootKey::CurrentUser,
        RootKey::LocalMachine,
        RootKey::Users,
        RootKey::CurrentConfig,
    ];

    pub fn hkey(self) -> HKey {
        match self {
            RootKey::ClassesRoot => HKey::CLASSES_ROOT,
            RootKey::CurrentUser => HKey::CURRENT_USER,
            RootKey::LocalMachine => HKey::LOCAL_MACHINE,
            RootKey::Users => HKey::USERS,
            RootKey::CurrentConfig => HKey::CURRENT_CONFIG,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RootKey::ClassesRoot => "HKEY_CLASSES_ROOT",
            RootKey::CurrentUser => "HKEY_CURRENT_USER",
            RootKey::LocalMachine => "HKEY_LOCAL_MACHINE",
            RootKey::Users => "HKEY_USERS",
            RootKey::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            RootKey::ClassesRoot => "HKCR",
            RootKey::CurrentUser => "HKCU",
            RootKey::LocalMachine => "HKLM",
            RootKey::Users => "HKU",
            RootKey::CurrentConfig => "HKCC",
        }
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown root key: {0}")]
pub struct UnknownRootKey(pub String);

impl FromStr for RootKey {
    type Err = UnknownRootKey;

    /// Accepts both the long (`HKEY_CURRENT_USER`) and the short (`HKCU`)
    /// spelling, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RootKey::ALL
            .into_iter()
            .find(|root| {
                root.name().eq_ignore_ascii_case(s) || root.short_name().eq_ignore_ascii_case(s)
            })
            .ok_or_else(|| UnknownRootKey(s.to_string()))
    }
}

/// Set of rights requested when opening a node.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Access(u32);

impl Access {
    pub const QUERY_VALUE: Access = Access(0x0001);
    pub const SET_VALUE: Access = Access(0x0002);
    pub const CREATE_SUB_KEY: Access = Access(0x0004);
    pub const ENUMERATE_SUB_KEYS: Access = Access(0x0008);
    pub const NOTIFY: Access = Access(0x0010);
    pub const CREATE_LINK: Access = Access(0x0020);

    pub const READ: Access =
        Access(Self::QUERY_VALUE.0 | Self::ENUMERATE_SUB_KEYS.0 | Self::NOTIFY.0);
    pub const WRITE: Access = Access(Self::SET_VALUE.0 | Self::CREATE_SUB_KEY.0);
    pub const ALL_ACCESS: Access = Access(Self::READ.0 | Self::WRITE.0 | Self::CREATE_LINK.0);

    pub const fn empty() -> Self {
        Access(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Access(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every right in `other` is also in `self`.
    pub const fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if `self` shares at least one right with `other`.
    pub const fn intersects(self, other: Access) -> bool {
        self.0 & other.0 != 0
    }

    /// True if this mask asks for any right that can modify the hive, which
    /// selects create-style rather than open-style semantics.
    pub const fn wants_write(self) -> bool {
        self.intersects(Access(
            Self::SET_VALUE.0 | Self::CREATE_SUB_KEY.0 | Self::CREATE_LINK.0,
        ))
    }
}

impl ops::BitOr for Access {
    type Output = Access;

    fn bitor(self, rhs: Access) -> Access {
        Access(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Access {
    fn bitor_assign(&mut self, rhs: Access) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Access({:#06x})", self.0)
    }
}

/// Outcome of a create-style open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    CreatedNewKey,
    OpenedExistingKey,
}

/// Counts reported by [`crate::Hive::query_info`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyInfo {
    pub subkeys: u32,
    pub values: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_names_parse_both_spellings() {
        assert_eq!("HKCU".parse::<RootKey>(), Ok(RootKey::CurrentUser));
        assert_eq!(
            "hkey_local_machine".parse::<RootKey>(),
            Ok(RootKey::LocalMachine)
        );
        assert!("HKXX".parse::<RootKey>().is_err());
    }

    #[test]
    fn predefined_handles_map_back_to_roots() {
        for root in RootKey::ALL {
            assert_eq!(root.hkey().root(), Some(root));
        }
        assert!(!HKey::from_raw(7).is_predefined());
    }

    #[test]
    fn access_composites() {
        assert!(Access::ALL_ACCESS.contains(Access::READ | Access::WRITE));
        assert!(!Access::READ.wants_write());
        assert!(Access::CREATE_LINK.wants_write());
        assert!(Access::empty().is_empty());
    }
}
