use std::error::Error as StdError;

use crate::executor::HandleState;

/// Boxed error used to carry a caller's failure through the unit of work.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error type for unit of work operations
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    #[error("no transaction")]
    NoTransaction,

    #[error("transaction already started")]
    TransactionAlreadyStarted,

    /// A rollback failed and the state of the database session is unknown.
    /// The unit refuses further work until it is abandoned.
    #[error("transaction state is unknown after a failed rollback; abandon the unit of work")]
    TransactionPoisoned,

    #[error("transaction is no longer open (state: {0})")]
    TransactionClosed(HandleState),

    #[error("repository not registered: {0}")]
    RepositoryNotRegistered(String),

    #[error("repository `{name}` is not a `{expected}`")]
    RepositoryTypeMismatch { name: String, expected: &'static str },

    #[error("failed to begin transaction: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("Transaction commit failed: {0}")]
    CommitFailed(#[source] sqlx::Error),

    #[error("Transaction rollback failed: {0}")]
    RollbackFailed(#[source] sqlx::Error),

    /// A cleanup rollback failed after `original` had already failed.
    #[error("error on rollback: {rollback}; original error: {original}")]
    RollbackAfterFailure {
        rollback: Box<UnitOfWorkError>,
        #[source]
        original: BoxError,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl UnitOfWorkError {
    pub(crate) fn rollback_after_failure(rollback: UnitOfWorkError, original: impl Into<BoxError>) -> Self {
        Self::RollbackAfterFailure {
            rollback: Box::new(rollback),
            original: original.into(),
        }
    }

    /// The failed cleanup rollback, when this is a `RollbackAfterFailure`.
    pub fn rollback_error(&self) -> Option<&UnitOfWorkError> {
        match self {
            Self::RollbackAfterFailure { rollback, .. } => Some(rollback),
            _ => None,
        }
    }

    /// The error that triggered the cleanup rollback, when this is a
    /// `RollbackAfterFailure`.
    pub fn original_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::RollbackAfterFailure { original, .. } => Some(original.as_ref()),
            _ => None,
        }
    }
}

/// Result type for unit of work operations
pub type UnitOfWorkResult<T> = Result<T, UnitOfWorkError>;
