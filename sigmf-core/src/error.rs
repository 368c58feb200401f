//! Error types for metadata parsing and validation

use thiserror::Error;

/// Broad error classes shared by every layer of the engine.
///
/// Callers that only care about "what went wrong" rather than the exact
/// variant can branch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad construction parameters (format string, endianness, conversion)
    Configuration,
    /// Filesystem failure
    Io,
    /// Sidecar document is not valid JSON or lacks required structure
    MalformedSidecar,
    /// Metadata key or value of a disallowed shape
    Type,
}

/// Errors that can occur when building or reading SigMF metadata
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetaError {
    /// Format string does not follow `[r|c][f|i|u]<width>[_le|_be]`
    #[error("Invalid format string: {0}")]
    InvalidFormat(String),

    /// Endianness suffix not allowed for this format or host
    #[error("Unsupported endianness: {0}")]
    UnsupportedEndianness(String),

    /// Metadata key is not of the form `namespace:name`
    #[error("Invalid metadata key: {0}")]
    InvalidKey(String),

    /// Value shape cannot be stored as a scalar metadata field
    #[error("Unsupported value for {key}: {kind} is not a scalar")]
    UnsupportedValue { key: String, kind: String },

    /// Sidecar document structure is invalid
    #[error("Malformed sidecar: {0}")]
    MalformedSidecar(String),

    /// Timestamp could not be parsed or represented
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// No sample conversion exists between two formats
    #[error("Unsupported conversion from {from} to {to}")]
    UnsupportedConversion { from: String, to: String },
}

impl MetaError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MetaError::InvalidFormat(_)
            | MetaError::UnsupportedEndianness(_)
            | MetaError::UnsupportedConversion { .. } => ErrorCategory::Configuration,
            MetaError::InvalidKey(_)
            | MetaError::UnsupportedValue { .. }
            | MetaError::InvalidTime(_) => ErrorCategory::Type,
            MetaError::MalformedSidecar(_) => ErrorCategory::MalformedSidecar,
        }
    }
}

impl From<serde_json::Error> for MetaError {
    fn from(e: serde_json::Error) -> Self {
        MetaError::MalformedSidecar(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            MetaError::InvalidFormat("x".into()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            MetaError::UnsupportedValue {
                key: "core:hw".into(),
                kind: "array".into()
            }
            .category(),
            ErrorCategory::Type
        );
        assert_eq!(
            MetaError::MalformedSidecar("eof".into()).category(),
            ErrorCategory::MalformedSidecar
        );
    }

    #[test]
    fn test_json_error_is_malformed_sidecar() {
        let err: MetaError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, MetaError::MalformedSidecar(_)));
    }
}
