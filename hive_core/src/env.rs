//! Environment lookup and `%NAME%` placeholder expansion.

use std::collections::HashMap;

use crate::value::utf16_len;

/// Name→value lookup used to resolve expandable strings.
pub trait Environment: std::fmt::Debug + Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads variables from the current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Fixed, case-insensitive set of variables.
#[derive(Debug, Clone, Default)]
pub struct MapEnvironment {
    vars: HashMap<String, String>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.vars.insert(name.to_uppercase(), value.into());
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for MapEnvironment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = MapEnvironment::new();
        for (name, value) in iter {
            env.insert(name.as_ref(), value);
        }
        env
    }
}

impl Environment for MapEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        self.vars.get(&name.to_uppercase()).cloned()
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExpandError {
    #[error("expanded string needs {required} units (max: {max})")]
    TooLong { required: usize, max: usize },
}

/// Replaces every `%NAME%` whose NAME is defined in `env`.
///
/// Undefined and empty names are copied through unchanged, percent signs
/// included, and a `%` without a closing partner is literal. The expanded
/// text plus its terminator must fit in `max_units` UTF-16 units.
pub fn expand_environment_strings(
    input: &str,
    env: &dyn Environment,
    max_units: usize,
) -> Result<String, ExpandError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('%') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('%') else {
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };

        let name = &after[..close];
        match (!name.is_empty()).then(|| env.var(name)).flatten() {
            Some(value) => out.push_str(&value),
            None => {
                out.push('%');
                out.push_str(name);
                out.push('%');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);

    let required = utf16_len(&out) + 1;
    if required > max_units {
        return Err(ExpandError::TooLong {
            required,
            max: max_units,
        });
    }
    Ok(out)
}
