use hive_core::{ExpandError, HiveError, ValueType, value::DecodeError};

pub type KeyResult<T> = std::result::Result<T, KeyError>;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum KeyError {
    #[error("key is not open")]
    NotOpen,

    #[error("access mask must not be empty")]
    InvalidAccess,

    #[error("value has type {actual}, expected {expected}")]
    TypeMismatch {
        expected: &'static str,
        actual: ValueType,
    },

    #[error("value is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("string is {len} units long (max: {max})")]
    TooLong { len: usize, max: usize },

    #[error(transparent)]
    Expansion(#[from] ExpandError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] HiveError),
}

impl KeyError {
    /// True when the underlying store reported a missing key or value.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KeyError::Store(err) if err.is_not_found())
    }
}
