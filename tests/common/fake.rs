use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use repository_unit_of_work::{
    DriverTransaction, Executor, TransactionSource, UnitOfWorkError, UnitOfWorkResult,
};

/// Calls seen by the fake driver
#[derive(Debug, Default)]
struct Journal {
    begins: usize,
    commits: usize,
    rollbacks: usize,
    writes: Vec<(u64, String)>,
}

#[derive(Debug, Clone, Default)]
struct Behavior {
    fail_begin: bool,
    stall_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

/// In-memory stand-in for a connection pool that records every driver call
/// and can be told to reject begin, commit or rollback.
#[derive(Default)]
pub struct FakePool {
    journal: Arc<Mutex<Journal>>,
    behavior: Mutex<Behavior>,
    next_id: AtomicU64,
}

impl FakePool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_begin(&self, fail: bool) {
        self.behavior.lock().fail_begin = fail;
    }

    pub fn stall_begin(&self, stall: bool) {
        self.behavior.lock().stall_begin = stall;
    }

    pub fn fail_commit(&self, fail: bool) {
        self.behavior.lock().fail_commit = fail;
    }

    pub fn fail_rollback(&self, fail: bool) {
        self.behavior.lock().fail_rollback = fail;
    }

    pub fn begins(&self) -> usize {
        self.journal.lock().begins
    }

    pub fn commits(&self) -> usize {
        self.journal.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.journal.lock().rollbacks
    }

    /// Writes recorded so far as `(transaction id, entry)`.
    pub fn writes(&self) -> Vec<(u64, String)> {
        self.journal.lock().writes.clone()
    }
}

#[async_trait]
impl TransactionSource for FakePool {
    type Transaction = FakeTransaction;

    async fn begin_transaction(&self) -> Result<FakeTransaction, sqlx::Error> {
        let behavior = self.behavior.lock().clone();
        if behavior.stall_begin {
            std::future::pending::<()>().await;
        }

        self.journal.lock().begins += 1;
        if behavior.fail_begin {
            return Err(sqlx::Error::PoolClosed);
        }

        Ok(FakeTransaction {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            journal: Arc::clone(&self.journal),
            fail_commit: behavior.fail_commit,
            fail_rollback: behavior.fail_rollback,
        })
    }
}

pub struct FakeTransaction {
    id: u64,
    journal: Arc<Mutex<Journal>>,
    fail_commit: bool,
    fail_rollback: bool,
}

impl FakeTransaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn write(&mut self, entry: impl Into<String>) {
        self.journal.lock().writes.push((self.id, entry.into()));
    }
}

#[async_trait]
impl DriverTransaction for FakeTransaction {
    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        self.journal.lock().commits += 1;
        if self.fail_commit {
            return Err(sqlx::Error::Protocol("commit rejected".to_string()));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        self.journal.lock().rollbacks += 1;
        if self.fail_rollback {
            return Err(sqlx::Error::Protocol("rollback rejected".to_string()));
        }
        Ok(())
    }
}

/// Repository writing order entries through the fake transaction
#[derive(Clone)]
pub struct OrderLedger {
    executor: Executor<FakeTransaction>,
}

impl OrderLedger {
    pub fn new(executor: Executor<FakeTransaction>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Executor<FakeTransaction> {
        &self.executor
    }

    pub async fn record(&self, entry: &str) -> UnitOfWorkResult<u64> {
        let mut tx = self.executor.lock().await?;
        tx.write(format!("order:{entry}"));
        Ok(tx.id())
    }
}

/// Repository writing user entries through the fake transaction
#[derive(Clone)]
pub struct UserLedger {
    executor: Executor<FakeTransaction>,
}

impl UserLedger {
    pub fn new(executor: Executor<FakeTransaction>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Executor<FakeTransaction> {
        &self.executor
    }

    pub async fn record(&self, entry: &str) -> UnitOfWorkResult<u64> {
        let mut tx = self.executor.lock().await?;
        tx.write(format!("user:{entry}"));
        Ok(tx.id())
    }
}

/// Application-level error returned from work run inside a unit of work
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("out of stock")]
    OutOfStock,

    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),
}
