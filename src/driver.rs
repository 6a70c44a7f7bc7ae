use async_trait::async_trait;
use sqlx::{Database, Pool, Transaction};

use crate::{HandleState, UnitOfWorkError, UnitOfWorkResult};

/// Source of database transactions, usually a connection pool.
///
/// The unit of work only ever asks it for a fresh transaction; pool sizing
/// and connection setup stay with the caller.
#[async_trait]
pub trait TransactionSource: Send + Sync {
    type Transaction: DriverTransaction;

    /// Open a new transaction.
    async fn begin_transaction(&self) -> Result<Self::Transaction, sqlx::Error>;
}

/// A single open transaction as seen by the driver.
///
/// Both methods take `&mut self` so a failed commit still leaves the
/// transaction in place for a cleanup rollback.
#[async_trait]
pub trait DriverTransaction: Send + 'static {
    async fn commit(&mut self) -> Result<(), sqlx::Error>;

    async fn rollback(&mut self) -> Result<(), sqlx::Error>;
}

/// Adapter from an sqlx transaction to [`DriverTransaction`].
#[derive(Debug)]
pub struct SqlxTransaction<DB: Database> {
    tx: Option<Transaction<'static, DB>>,
}

impl<DB: Database> SqlxTransaction<DB> {
    pub fn new(tx: Transaction<'static, DB>) -> Self {
        Self { tx: Some(tx) }
    }

    /// The underlying sqlx transaction, if it has not been resolved yet.
    pub fn transaction(&mut self) -> Option<&mut Transaction<'static, DB>> {
        self.tx.as_mut()
    }

    /// Connection to run queries against: `query.execute(tx.connection()?)`.
    pub fn connection(&mut self) -> UnitOfWorkResult<&mut DB::Connection> {
        self.tx
            .as_deref_mut()
            .ok_or(UnitOfWorkError::TransactionClosed(HandleState::Failed))
    }
}

#[async_trait]
impl<DB: Database> DriverTransaction for SqlxTransaction<DB> {
    async fn commit(&mut self) -> Result<(), sqlx::Error> {
        // sqlx consumes the transaction either way; on failure its drop
        // queues the rollback on the connection.
        let tx = self.tx.take().ok_or(sqlx::Error::PoolClosed)?;
        tx.commit().await
    }

    async fn rollback(&mut self) -> Result<(), sqlx::Error> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await,
            // Dropped by a failed commit, sqlx already rolled it back.
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<DB: Database> TransactionSource for Pool<DB> {
    type Transaction = SqlxTransaction<DB>;

    async fn begin_transaction(&self) -> Result<Self::Transaction, sqlx::Error> {
        let tx = self.begin().await?;
        Ok(SqlxTransaction::new(tx))
    }
}
