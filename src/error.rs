//! Error types for casesync.

use thiserror::Error;

/// Errors raised by the local store, the action queue and the CLI.
#[derive(Debug, Error)]
pub enum SyncError {
    /// SQLite failure, with context.
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON or YAML that could not be parsed or produced.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A key or collection that does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network dispatch failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A queue item or stored document with an unusable shape.
    #[error("Invalid item: {0}")]
    InvalidItem(String),

    /// The store or queue has been closed.
    #[error("Store is closed")]
    Closed,
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<serde_yaml::Error> for SyncError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl SyncError {
    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Parse(_) | Self::InvalidItem(_) => 2,
            Self::NotFound(_) => 3,
            Self::Http(_) => 4,
            Self::Database(_) | Self::Io(_) | Self::Closed => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = SyncError::NotFound("records/42".to_string());
        assert_eq!(err.to_string(), "Not found: records/42");
        assert_eq!(SyncError::Closed.to_string(), "Store is closed");
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: SyncError = json_err.into();
        assert!(matches!(err, SyncError::Parse(_)));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SyncError::Http("503".to_string()).exit_code(), 4);
        assert_eq!(SyncError::Database("locked".to_string()).exit_code(), 1);
    }
}
