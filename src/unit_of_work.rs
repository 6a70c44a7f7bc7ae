use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sqlx::{PgPool, Postgres};
use tracing::{debug, trace};

use crate::{
    BeginMode, BoxError, Executor, RepositoryKey, RepositoryRegistry, SqlxTransaction,
    TransactionSource, UnitOfWorkConfig, UnitOfWorkError, UnitOfWorkResult,
};

/// Future returned by the work passed to [`UnitOfWork::execute`].
pub type WorkFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Unit of work over a PostgreSQL pool.
pub type PgUnitOfWork = UnitOfWork<PgPool>;

/// Executor handed to repositories of a [`PgUnitOfWork`].
pub type PgExecutor = Executor<SqlxTransaction<Postgres>>;

/// Observable state of the transaction slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Open,
    /// A rollback failed; only [`UnitOfWork::abandon`] clears this.
    Poisoned,
}

enum TransactionSlot<T> {
    Empty,
    Open(Executor<T>),
    Poisoned(Executor<T>),
}

/// Unit of Work pattern for managing database transactions.
///
/// A unit holds at most one open transaction and builds repositories from
/// its registry on top of it, so everything done during one operation is
/// committed or rolled back together. Create one per request, or reuse one
/// across sequential operations; every state change takes `&mut self`, so
/// a unit cannot be driven by two operations at once.
///
/// ```ignore
/// let mut uow = PgUnitOfWork::new(Arc::new(pool));
/// uow.register("orders", OrderRepository::new);
///
/// uow.execute(|uow| Box::pin(async move {
///     let orders: Arc<OrderRepository> = uow.get_repository("orders").await?;
///     orders.create(&order).await?;
///     Ok::<_, UnitOfWorkError>(())
/// }))
/// .await?;
/// ```
pub struct UnitOfWork<P: TransactionSource> {
    pool: Arc<P>,
    registry: Arc<RepositoryRegistry<P::Transaction>>,
    slot: TransactionSlot<P::Transaction>,
    config: UnitOfWorkConfig,
}

impl<P: TransactionSource> UnitOfWork<P> {
    /// Create a new UnitOfWork with the given connection pool.
    pub fn new(pool: Arc<P>) -> Self {
        Self::with_config(pool, UnitOfWorkConfig::default())
    }

    pub fn with_config(pool: Arc<P>, config: UnitOfWorkConfig) -> Self {
        Self {
            pool,
            registry: Arc::new(RepositoryRegistry::new()),
            slot: TransactionSlot::Empty,
            config,
        }
    }

    /// Use a registry populated elsewhere, typically once at startup and
    /// shared by every unit. Registering through this unit afterwards
    /// copies the registry instead of changing the shared one.
    pub fn with_registry(mut self, registry: Arc<RepositoryRegistry<P::Transaction>>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &UnitOfWorkConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<RepositoryRegistry<P::Transaction>> {
        &self.registry
    }

    /// Store `factory` under `name`, overwriting any previous registration.
    pub fn register<R, F>(&mut self, name: impl Into<String>, factory: F)
    where
        R: Send + 'static,
        F: Fn(Executor<P::Transaction>) -> R + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.registry).register(name, factory);
    }

    pub fn register_key<R, F>(&mut self, key: RepositoryKey<R>, factory: F)
    where
        R: Send + 'static,
        F: Fn(Executor<P::Transaction>) -> R + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.registry).register_key(key, factory);
    }

    /// Remove the factory registered under `name`. Returns whether one existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        if !self.registry.contains(name) {
            return false;
        }
        Arc::make_mut(&mut self.registry).unregister(name)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn slot_state(&self) -> SlotState {
        match self.slot {
            TransactionSlot::Empty => SlotState::Empty,
            TransactionSlot::Open(_) => SlotState::Open,
            TransactionSlot::Poisoned(_) => SlotState::Poisoned,
        }
    }

    pub fn has_open_transaction(&self) -> bool {
        self.slot_state() == SlotState::Open
    }

    pub fn is_poisoned(&self) -> bool {
        self.slot_state() == SlotState::Poisoned
    }

    /// The executor of the open transaction, if any.
    pub fn current_transaction(&self) -> Option<&Executor<P::Transaction>> {
        match &self.slot {
            TransactionSlot::Open(executor) => Some(executor),
            _ => None,
        }
    }

    /// Open a transaction for this unit.
    ///
    /// Fails with `TransactionAlreadyStarted` while one is open, and with
    /// `Connection` when the pool cannot provide one within the configured
    /// `begin_timeout`.
    pub async fn begin(&mut self) -> UnitOfWorkResult<Executor<P::Transaction>> {
        match self.slot {
            TransactionSlot::Empty => {}
            TransactionSlot::Open(_) => return Err(UnitOfWorkError::TransactionAlreadyStarted),
            TransactionSlot::Poisoned(_) => return Err(UnitOfWorkError::TransactionPoisoned),
        }

        let tx = self.acquire().await?;
        let executor = Executor::new(tx);
        self.slot = TransactionSlot::Open(executor.clone());
        debug!(handle = ?executor, "transaction opened");
        Ok(executor)
    }

    /// Build the repository registered under `name` on the open transaction.
    ///
    /// Unknown names fail before anything else happens. Without an open
    /// transaction this fails with `NoTransaction`, unless the unit runs in
    /// [`BeginMode::Lazy`], where the transaction is opened here.
    pub async fn get_repository<R: 'static>(&mut self, name: &str) -> UnitOfWorkResult<R> {
        if !self.registry.contains(name) {
            return Err(UnitOfWorkError::RepositoryNotRegistered(name.to_string()));
        }

        let executor = match self.open_executor()? {
            Some(executor) => executor,
            None if self.config.begin_mode == BeginMode::Lazy => self.begin().await?,
            None => return Err(UnitOfWorkError::NoTransaction),
        };

        trace!(repository = name, "building repository");
        self.registry.build(name, executor)
    }

    /// Typed form of [`get_repository`](Self::get_repository).
    pub async fn repository<R: 'static>(&mut self, key: RepositoryKey<R>) -> UnitOfWorkResult<R> {
        self.get_repository(key.name()).await
    }

    /// Run `work` inside a fresh transaction.
    ///
    /// `work` receives this unit so it can fetch repositories. Success
    /// commits; failure rolls back and returns the error unchanged. If that
    /// rollback fails as well, the result is `RollbackAfterFailure` carrying
    /// both errors and the unit is poisoned.
    pub async fn execute<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut Self) -> WorkFuture<'a, T, E>,
        E: From<UnitOfWorkError> + Into<BoxError>,
    {
        self.begin().await?;
        let outcome = work(&mut *self).await;
        self.commit_or_rollback(outcome).await
    }

    /// Commit on `Ok`, roll back on `Err`.
    ///
    /// A failed rollback never hides the pending error: both end up in
    /// `RollbackAfterFailure`.
    pub async fn commit_or_rollback<T, E>(&mut self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<UnitOfWorkError> + Into<BoxError>,
    {
        match outcome {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => match self.rollback().await {
                Ok(()) => Err(err),
                Err(rollback) => Err(E::from(UnitOfWorkError::rollback_after_failure(rollback, err))),
            },
        }
    }

    /// Commit the open transaction.
    ///
    /// When the driver rejects the commit, the transaction is rolled back
    /// and `CommitFailed` is returned; if that rollback fails too, both
    /// errors are returned and the unit is poisoned.
    pub async fn commit(&mut self) -> UnitOfWorkResult<()> {
        let executor = self.resolvable()?;

        let commit_err = match executor.commit().await {
            Ok(()) => {
                self.slot = TransactionSlot::Empty;
                debug!(handle = ?executor, "transaction committed");
                return Ok(());
            }
            Err(err) => err,
        };

        match executor.rollback().await {
            Ok(()) => {
                self.slot = TransactionSlot::Empty;
                debug!(handle = ?executor, "commit rejected, transaction rolled back");
                Err(commit_err)
            }
            Err(rollback_err) => {
                self.poison(executor);
                Err(UnitOfWorkError::rollback_after_failure(rollback_err, commit_err))
            }
        }
    }

    /// Roll back the open transaction. A driver failure is returned as is
    /// and poisons the unit.
    pub async fn rollback(&mut self) -> UnitOfWorkResult<()> {
        let executor = self.resolvable()?;

        match executor.rollback().await {
            Ok(()) => {
                self.slot = TransactionSlot::Empty;
                debug!(handle = ?executor, "transaction rolled back");
                Ok(())
            }
            Err(err) => {
                self.poison(executor);
                Err(err)
            }
        }
    }

    /// Drop whatever transaction the unit holds, poisoned or not, and
    /// return to the empty state. An sqlx transaction still open at this
    /// point is rolled back by the driver once the last executor clone is
    /// dropped. Returns whether anything was discarded.
    pub fn abandon(&mut self) -> bool {
        match std::mem::replace(&mut self.slot, TransactionSlot::Empty) {
            TransactionSlot::Empty => false,
            TransactionSlot::Open(executor) | TransactionSlot::Poisoned(executor) => {
                debug!(handle = ?executor, "transaction abandoned");
                true
            }
        }
    }

    async fn acquire(&self) -> UnitOfWorkResult<P::Transaction> {
        let begin = self.pool.begin_transaction();
        let result = match self.config.begin_timeout {
            Some(limit) => tokio::time::timeout(limit, begin)
                .await
                .unwrap_or(Err(sqlx::Error::PoolTimedOut)),
            None => begin.await,
        };
        result.map_err(UnitOfWorkError::Connection)
    }

    fn open_executor(&self) -> UnitOfWorkResult<Option<Executor<P::Transaction>>> {
        match &self.slot {
            TransactionSlot::Empty => Ok(None),
            TransactionSlot::Open(executor) => Ok(Some(executor.clone())),
            TransactionSlot::Poisoned(_) => Err(UnitOfWorkError::TransactionPoisoned),
        }
    }

    fn resolvable(&self) -> UnitOfWorkResult<Executor<P::Transaction>> {
        self.open_executor()?.ok_or(UnitOfWorkError::NoTransaction)
    }

    fn poison(&mut self, executor: Executor<P::Transaction>) {
        debug!(handle = ?executor, "rollback failed, unit of work poisoned");
        self.slot = TransactionSlot::Poisoned(executor);
    }
}
