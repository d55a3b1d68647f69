//! Key path rules shared by backends.
//!
//! Paths are `\`-separated. Backends address nodes by their *folded* full
//! path: the root's long name followed by every component, all lowercased.

use crate::{HiveError, HiveResult, RootKey};

pub const SEPARATOR: char = '\\';

/// Longest allowed single key name, in characters.
pub const MAX_KEY_NAME_LENGTH: usize = 255;

/// Splits `path` into its components.
///
/// An empty path yields no components (the parent itself). One trailing
/// separator is tolerated.
pub fn split_path(path: &str) -> HiveResult<Vec<&str>> {
    let trimmed = path.strip_suffix(SEPARATOR).unwrap_or(path);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    trimmed
        .split(SEPARATOR)
        .map(|component| validate_name(component).map(|()| component))
        .collect()
}

/// Checks a single key name.
pub fn validate_name(name: &str) -> HiveResult<()> {
    if name.is_empty() {
        return Err(HiveError::InvalidPath("empty path component".into()));
    }
    if name.contains(SEPARATOR) {
        return Err(HiveError::InvalidPath(format!(
            "key name '{name}' contains a separator"
        )));
    }
    if name.chars().count() > MAX_KEY_NAME_LENGTH {
        return Err(HiveError::InvalidPath(format!(
            "key name longer than {MAX_KEY_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Case-folds a key or value name for comparison.
pub fn fold(name: &str) -> String {
    name.to_lowercase()
}

/// Folded path of a predefined root.
pub fn root_path(root: RootKey) -> String {
    fold(root.name())
}

/// Appends an already-folded component to a folded path.
pub fn join(base: &str, folded_name: &str) -> String {
    let mut out = String::with_capacity(base.len() + 1 + folded_name.len());
    out.push_str(base);
    out.push(SEPARATOR);
    out.push_str(folded_name);
    out
}

/// Folded path of the parent, or `None` for a root.
pub fn parent(path: &str) -> Option<&str> {
    path.rsplit_once(SEPARATOR).map(|(parent, _)| parent)
}

/// Last component of a path.
pub fn leaf(path: &str) -> &str {
    path.rsplit_once(SEPARATOR).map_or(path, |(_, leaf)| leaf)
}

/// True if `path` is `ancestor` or lies below it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    match path.strip_prefix(ancestor) {
        Some("") => true,
        Some(rest) => rest.starts_with(SEPARATOR),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_components() {
        assert_eq!(split_path("a\\b\\c").unwrap(), vec!["a", "b", "c"]);
        assert_eq!(split_path("a\\").unwrap(), vec!["a"]);
        assert!(split_path("").unwrap().is_empty());
    }

    #[test]
    fn rejects_empty_components() {
        assert!(matches!(
            split_path("\\a"),
            Err(HiveError::InvalidPath(_))
        ));
        assert!(matches!(
            split_path("a\\\\b"),
            Err(HiveError::InvalidPath(_))
        ));
    }

    #[test]
    fn rejects_overlong_names() {
        let long = "x".repeat(MAX_KEY_NAME_LENGTH + 1);
        assert!(split_path(&long).is_err());
        assert!(split_path(&long[1..]).is_ok());
    }

    #[test]
    fn ancestry() {
        assert!(is_within("r\\a\\b", "r\\a"));
        assert!(is_within("r\\a", "r\\a"));
        assert!(!is_within("r\\ab", "r\\a"));
        assert_eq!(parent("r\\a\\b"), Some("r\\a"));
        assert_eq!(parent("r"), None);
        assert_eq!(leaf("r\\a\\b"), "b");
    }
}
