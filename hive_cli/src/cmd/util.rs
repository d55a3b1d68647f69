use anyhow::{Context, Result, bail};
use hive_core::{HKey, RawValue, RootKey, ValueType};

/// A key path as typed on the command line: `ROOT\sub\path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPath {
    pub root: RootKey,
    pub path: String,
}

impl KeyPath {
    pub fn parse(s: &str) -> Result<Self> {
        let (root, path) = s.split_once('\\').unwrap_or((s, ""));
        let root = root
            .parse::<RootKey>()
            .with_context(|| format!("invalid key path '{s}'"))?;
        Ok(Self {
            root,
            path: path.trim_end_matches('\\').to_string(),
        })
    }

    pub fn hkey(&self) -> HKey {
        self.root.hkey()
    }

    /// Splits off the last component, for operations addressed through the
    /// parent key.
    pub fn split_leaf(&self) -> Result<(KeyPath, &str)> {
        let Some((parent, leaf)) = self.path.rsplit_once('\\').or_else(|| {
            (!self.path.is_empty()).then_some(("", self.path.as_str()))
        }) else {
            bail!("refusing to operate on the root key {}", self.root);
        };
        Ok((
            KeyPath {
                root: self.root,
                path: parent.to_string(),
            },
            leaf,
        ))
    }
}

impl std::fmt::Display for KeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.root.short_name())
        } else {
            write!(f, "{}\\{}", self.root.short_name(), self.path)
        }
    }
}

/// Renders a stored value without environment expansion.
pub fn display_value(value: &RawValue) -> String {
    match value.value_type {
        ValueType::String | ValueType::ExpandString => value
            .to_text()
            .unwrap_or_else(|_| format!("<undecodable: {}>", hex::encode(&value.data))),
        ValueType::Dword => match value.to_u32() {
            Some(n) => format!("{n} ({n:#x})"),
            None => format!("<malformed: {}>", hex::encode(&value.data)),
        },
        ValueType::Binary => hex::encode(&value.data),
    }
}

pub fn parse_dword(s: &str) -> Result<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    }
    .with_context(|| format!("'{s}' is not a 32-bit unsigned integer"))
}
