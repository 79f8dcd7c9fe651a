use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Result alias for console operations.
pub type ConsoleResult<T> = Result<T, ConsoleError>;

/// Errors raised while running a console session.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Reading from or writing to the terminal failed.
    #[error("console I/O failed")]
    Io(#[from] std::io::Error),
    /// Input ended while a command was still prompting.
    #[error("input ended")]
    EndOfInput,
    /// The user typed something the command cannot use.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The repository reported a failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ConsoleError {
    /// Whether the menu loop can report the error and keep prompting.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ConsoleError::InvalidInput(_) => true,
            ConsoleError::Storage(err) => err.is_recoverable(),
            ConsoleError::Io(_) | ConsoleError::EndOfInput => false,
        }
    }
}

impl From<ValidationErrors> for ConsoleError {
    fn from(err: ValidationErrors) -> Self {
        ConsoleError::InvalidInput(format!("validation failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_keep_their_classification() {
        let conflict: ConsoleError = StorageError::Conflict { id: "g1".into() }.into();
        assert!(conflict.is_recoverable());
        assert_eq!(conflict.to_string(), "document `g1` was modified concurrently");

        let closed: ConsoleError = StorageError::Closed.into();
        assert!(!closed.is_recoverable());
        assert!(!ConsoleError::EndOfInput.is_recoverable());
        assert!(ConsoleError::InvalidInput("year".into()).is_recoverable());
    }
}
