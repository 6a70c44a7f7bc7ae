use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::{DriverTransaction, UnitOfWorkError, UnitOfWorkResult};

/// Lifecycle of a transaction held by an [`Executor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Open,
    Committed,
    RolledBack,
    /// The driver rejected a commit or rollback.
    Failed,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::RolledBack => "rolled back",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

struct Slot<T> {
    tx: T,
    state: HandleState,
}

/// Exclusive access to an open transaction, returned by [`Executor::lock`].
pub struct TransactionGuard<'a, T> {
    slot: MutexGuard<'a, Slot<T>>,
}

impl<T> Deref for TransactionGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot.tx
    }
}

impl<T> DerefMut for TransactionGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.slot.tx
    }
}

/// Executor wraps a database transaction for use by repositories.
///
/// Every repository built during one unit of work receives a clone of the
/// same executor, so they all share a single transaction. Once the unit of
/// work commits or rolls back, `lock` refuses access.
pub struct Executor<T> {
    inner: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for Executor<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Executor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("handle", &Arc::as_ptr(&self.inner))
            .finish_non_exhaustive()
    }
}

impl<T: DriverTransaction> Executor<T> {
    /// Creates a new Executor from an open driver transaction.
    pub fn new(tx: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slot {
                tx,
                state: HandleState::Open,
            })),
        }
    }

    /// Lock the transaction for running statements.
    ///
    /// Fails with `TransactionClosed` once the transaction has been resolved.
    /// Release the guard before the unit of work commits or rolls back.
    pub async fn lock(&self) -> UnitOfWorkResult<TransactionGuard<'_, T>> {
        let slot = self.inner.lock().await;
        if slot.state != HandleState::Open {
            return Err(UnitOfWorkError::TransactionClosed(slot.state));
        }
        Ok(TransactionGuard { slot })
    }

    pub async fn state(&self) -> HandleState {
        self.inner.lock().await.state
    }

    /// Whether both executors share the same underlying transaction.
    pub fn same_transaction(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) async fn commit(&self) -> UnitOfWorkResult<()> {
        let mut slot = self.inner.lock().await;
        if slot.state != HandleState::Open {
            return Err(UnitOfWorkError::TransactionClosed(slot.state));
        }
        match slot.tx.commit().await {
            Ok(()) => {
                slot.state = HandleState::Committed;
                Ok(())
            }
            Err(err) => {
                slot.state = HandleState::Failed;
                Err(UnitOfWorkError::CommitFailed(err))
            }
        }
    }

    /// Roll back an open transaction, or clean up after a failed commit.
    pub(crate) async fn rollback(&self) -> UnitOfWorkResult<()> {
        let mut slot = self.inner.lock().await;
        if !matches!(slot.state, HandleState::Open | HandleState::Failed) {
            return Err(UnitOfWorkError::TransactionClosed(slot.state));
        }
        match slot.tx.rollback().await {
            Ok(()) => {
                slot.state = HandleState::RolledBack;
                Ok(())
            }
            Err(err) => {
                slot.state = HandleState::Failed;
                Err(UnitOfWorkError::RollbackFailed(err))
            }
        }
    }
}
