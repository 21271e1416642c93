//! Error types for volcano-registry

use thiserror::Error;

/// Registry error type
///
/// Every variant except [`Error::Source`] describes why a single changed
/// definition was rejected; those are reported per path and never abort a
/// reload batch.
#[derive(Debug, Error)]
pub enum Error {
    /// File extension is not json/toml/yaml/yml
    #[error("unsupported definition format: {0}")]
    UnsupportedFormat(String),

    /// Content could not be parsed
    #[error("failed to parse {format}: {message}")]
    Parse {
        /// Format that was attempted
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// Schema validation failed
    #[error("invalid definition: {0}")]
    Invalid(String),

    /// Name already owned by another path on the same branch
    #[error("'{name}' is already defined by {owner}")]
    DuplicateName {
        /// Conflicting definition name
        name: String,
        /// Path that owns the name
        owner: String,
    },

    /// Tool implementation could not be built from the definition
    #[error(transparent)]
    Tool(#[from] volcano_tools::Error),

    /// Configuration source failure (fatal for the reload attempt)
    #[error("configuration source error: {0}")]
    Source(String),
}

impl Error {
    /// Whether this error rejects a single change rather than the whole reload
    #[must_use]
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Source(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_validation() {
        assert!(Error::Invalid("x".into()).is_validation());
        assert!(Error::DuplicateName {
            name: "add".into(),
            owner: "tools/add.json".into()
        }
        .is_validation());
        assert!(!Error::Source("git failed".into()).is_validation());
    }
}
