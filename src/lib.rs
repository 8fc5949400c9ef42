//! Unit-of-work SQL coordinator.
//!
//! A [`Coordinator`] owns one connection (opened lazily) and at most one transaction. It runs
//! parameterized commands and returns affected-row counts, scalars or result sets, and it can
//! bulk-load rows into a table. [`BlockingCoordinator`] offers the same operations
//! synchronously.
//!
//! Backends are selected with cargo features: `sqlite` (default, via rusqlite) and `mssql`
//! (via tiberius).

#[cfg(not(any(feature = "sqlite", feature = "mssql")))]
compile_error!("enable at least one of the `sqlite` or `mssql` features");

pub mod blocking;
pub mod bulk;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod params;
pub mod prelude;
pub mod results;
pub mod transaction;
pub mod types;

mod backend;
mod command;

#[cfg(feature = "mssql")]
mod mssql;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use blocking::BlockingCoordinator;
pub use bulk::{BulkLoadOptions, DEFAULT_BATCH_SIZE, DEFAULT_NOTIFY_AFTER, ProgressCallback};
pub use config::{
    AppSettings, CoordinatorOptions, CoordinatorOptionsBuilder, DEFAULT_COMMAND_TIMEOUT,
    DEFAULT_CONNECTION_NAME,
};
pub use coordinator::Coordinator;
pub use error::{FailureKind, SqlCoordinatorError};
pub use params::{Parameter, ParameterSet};
pub use results::{DbRow, ResultSet};
pub use transaction::TransactionState;
pub use types::{CommandKind, DatabaseType, DbType, DbValue};
