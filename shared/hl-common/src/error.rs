//! Shared Error Types

use thiserror::Error;

/// Errors produced by the shared types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A string form did not match any variant of a shared enum.
    #[error("unknown {enum_name} value: {value}")]
    UnknownVariant {
        enum_name: &'static str,
        value: String,
    },
}

impl Error {
    pub(crate) fn unknown_variant(enum_name: &'static str, value: &str) -> Self {
        Self::UnknownVariant {
            enum_name,
            value: value.to_string(),
        }
    }
}

/// Result alias for shared-type operations.
pub type Result<T> = std::result::Result<T, Error>;
