//! Soft delete error types.

use std::time::Duration;
use thiserror::Error;

/// Soft delete operation errors.
///
/// Every variant is returned to the caller of the delete, restore or bulk
/// restore operation after the enclosing store transaction was rolled back.
#[derive(Debug, Error)]
pub enum SoftDeleteError {
    #[error("failed to open store transaction: {0}")]
    TransactionOpen(#[source] sqlx::Error),

    #[error("log write failed: {0}")]
    LogWrite(String),

    #[error("marker write failed: {0}")]
    MarkerWrite(String),

    #[error("integrity fault: {0}")]
    Integrity(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already deleted: {0}")]
    AlreadyDeleted(String),

    #[error("restore of {entity_type} {entity_id} was vetoed")]
    Vetoed {
        entity_type: String,
        entity_id: String,
    },

    #[error("bulk restore exceeded {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SoftDeleteError {
    /// Short classification used in structured logs and observer notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TransactionOpen(_) => "transaction_open",
            Self::LogWrite(_) => "log_write",
            Self::MarkerWrite(_) => "marker_write",
            Self::Integrity(_) => "integrity",
            Self::NotFound(_) => "not_found",
            Self::AlreadyDeleted(_) => "already_deleted",
            Self::Vetoed { .. } => "vetoed",
            Self::Timeout(_) => "timeout",
            Self::Database(_) => "database",
            Self::Serialization(_) => "serialization",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

impl From<reclaim_core::Error> for SoftDeleteError {
    fn from(err: reclaim_core::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for soft delete operations.
pub type SoftDeleteResult<T> = std::result::Result<T, SoftDeleteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vetoed_display() {
        let err = SoftDeleteError::Vetoed {
            entity_type: "Widget".to_string(),
            entity_id: "7".to_string(),
        };
        assert_eq!(err.to_string(), "restore of Widget 7 was vetoed");
        assert_eq!(err.kind(), "vetoed");
    }

    #[test]
    fn test_timeout_display() {
        let err = SoftDeleteError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "bulk restore exceeded 30s");
    }

    #[test]
    fn test_core_error_maps_to_config() {
        let err: SoftDeleteError =
            reclaim_core::Error::InvalidIdentifier("bad".to_string()).into();
        assert_eq!(err.kind(), "config");
    }
}
