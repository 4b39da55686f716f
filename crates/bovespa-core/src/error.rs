use thiserror::Error;

/// Validation and contract errors exposed by `bovespa-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker code cannot be empty")]
    EmptyCode,
    #[error("share class cannot be empty for '{code}'")]
    EmptyClass { code: String },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("'{value}' is not a locale-formatted number")]
    InvalidNumber { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },

    #[error("storage key must not be empty")]
    EmptyKey,
    #[error("storage key '{key}' is not allowed: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("identifier '{value}' must match [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier { value: String },
}
