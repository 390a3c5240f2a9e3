//! Errors for configuration and for the storage collaborator.
//!
//! Refresh outcomes use [`RefreshError`](crate::RefreshError) instead; those
//! are values carried inside a result, never propagated with `?` to callers.

use thiserror::Error;

/// A configuration value was missing, malformed, or out of range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A numeric or structural setting is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Name of the offending setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The provider selector is not one of the known networks or `none`.
    #[error("unknown ad provider `{0}` (expected ezoic, adsense, monetag, adsterra or none)")]
    UnknownProvider(String),

    /// The profile selector is not `development` or `production`.
    #[error("unknown profile `{0}` (expected development or production)")]
    UnknownProfile(String),

    /// An environment variable could not be parsed.
    #[error("environment variable {var} has an invalid value `{value}`")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Raw value that failed to parse.
        value: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure of a [`KeyValueStore`](crate::KeyValueStore) operation.
///
/// Limiter persistence swallows these; they only show up in debug logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The backing store cannot be reached at all.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the write (quota, permissions).
    #[error("storage write rejected for `{key}`: {reason}")]
    WriteRejected {
        /// Key being written.
        key: String,
        /// Store-provided reason.
        reason: String,
    },

    /// Stored data could not be encoded or decoded.
    #[error("storage serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("window_ms", "must be greater than 0");
        assert_eq!(err.to_string(), "invalid window_ms: must be greater than 0");

        let err = ConfigError::UnknownProvider("propellerads".into());
        assert!(err.to_string().contains("propellerads"));
    }

    #[test]
    fn test_store_error_from_serde() {
        let parse = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: StoreError = parse.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
