//! Repository Unit of Work
//!
//! Coordinates one database transaction per logical operation: repositories
//! are built from a name-keyed factory registry on top of a shared
//! transaction, which is then committed or rolled back as a whole.

pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod registry;
pub mod unit_of_work;

pub use config::{BeginMode, ConfigError, UnitOfWorkConfig};
pub use driver::{DriverTransaction, SqlxTransaction, TransactionSource};
pub use error::{BoxError, UnitOfWorkError, UnitOfWorkResult};
pub use executor::{Executor, HandleState, TransactionGuard};
pub use registry::{RepositoryKey, RepositoryRegistry};
pub use unit_of_work::{PgExecutor, PgUnitOfWork, SlotState, UnitOfWork, WorkFuture};
