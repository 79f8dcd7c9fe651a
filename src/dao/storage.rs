use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by repositories regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No document with the given id exists in the addressed partition.
    #[error("document `{id}` not found")]
    NotFound {
        /// Requested id.
        id: String,
    },
    /// The supplied etag no longer matches the stored document, or the id is already taken.
    #[error("document `{id}` was modified concurrently")]
    Conflict {
        /// Id of the contested document.
        id: String,
    },
    /// The partition key passed alongside a document disagrees with the document itself.
    #[error("partition key `{supplied}` does not match document partition `{actual}`")]
    PartitionMismatch {
        /// Key passed by the caller.
        supplied: String,
        /// Key carried by the document.
        actual: String,
    },
    /// Raw query text could not be parsed.
    #[error("invalid query at position {position}: {message}")]
    InvalidQuery {
        /// Byte offset of the problem in the query text.
        position: usize,
        /// What was expected there.
        message: String,
    },
    /// The database refused a well-formed query, e.g. a sort it has no index for.
    #[error("query rejected by the store: {reason}")]
    QueryRejected {
        /// Explanation returned by the database.
        reason: String,
    },
    /// A continuation token was not issued by this store.
    #[error("invalid continuation token")]
    InvalidToken,
    /// Page size of zero was requested.
    #[error("page size must be at least 1")]
    InvalidPageSize,
    /// The repository has already released its connection.
    #[error("repository connection has been closed")]
    Closed,
    /// The database could not be reached or answered unexpectedly.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Summary of the failed operation.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether a caller can report the failure and keep using the repository.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            StorageError::Unavailable { .. } | StorageError::Closed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_are_not_recoverable() {
        let err = StorageError::unavailable(
            "connection reset".into(),
            std::io::Error::other("reset by peer"),
        );
        assert!(!err.is_recoverable());
        assert!(!StorageError::Closed.is_recoverable());
    }

    #[test]
    fn contract_violations_are_recoverable() {
        assert!(StorageError::Conflict { id: "a".into() }.is_recoverable());
        assert!(StorageError::NotFound { id: "a".into() }.is_recoverable());
        assert!(StorageError::InvalidToken.is_recoverable());
        assert!(StorageError::InvalidPageSize.is_recoverable());
    }
}
