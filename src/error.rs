use thiserror::Error;

/// Main error type for cuttle operations
#[derive(Error, Debug)]
pub enum CuttleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corruption in {kind} {id}: {detail}")]
    Corruption {
        kind: &'static str,
        id: String,
        detail: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Operation on closed index")]
    Closed,

    #[error("Index directory is locked by another writer")]
    IndexLocked,

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for cuttle operations
pub type Result<T> = std::result::Result<T, CuttleError>;

impl CuttleError {
    pub fn corruption(
        kind: &'static str,
        id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        CuttleError::Corruption {
            kind,
            id: id.into(),
            detail: detail.into(),
        }
    }

    /// Check if this error indicates a transient failure that could be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, CuttleError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CuttleError::corruption("segment", "42", "bad checksum");
        assert_eq!(err.to_string(), "Corruption in segment 42: bad checksum");
    }

    #[test]
    fn test_transient_errors() {
        let io = CuttleError::Io(std::io::Error::other("disk"));
        assert!(io.is_transient());
        assert!(!CuttleError::Cancelled.is_transient());
        assert!(!CuttleError::corruption("segment", "1", "x").is_transient());
    }
}
