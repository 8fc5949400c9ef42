#[cfg(feature = "mssql")]
use crate::mssql::{MssqlConnection, MssqlOptions};
#[cfg(feature = "sqlite")]
use crate::sqlite::{SqliteConnection, SqliteOptions};

use crate::bulk::{BulkPayload, ProgressTracker};
use crate::command::{CancelToken, Command, CommandOutcome, ResultShape};
use crate::error::SqlCoordinatorError;
use crate::types::DatabaseType;

/// Parsed, driver-specific connection settings. Parsing never touches the network or disk.
#[derive(Debug, Clone)]
pub(crate) enum BackendConfig {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteOptions),
    #[cfg(feature = "mssql")]
    Mssql(MssqlOptions),
}

impl BackendConfig {
    pub(crate) fn parse(
        database_type: DatabaseType,
        connection_string: &str,
    ) -> Result<Self, SqlCoordinatorError> {
        match database_type {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => Ok(BackendConfig::Sqlite(SqliteOptions::parse(
                connection_string,
            )?)),
            #[cfg(feature = "mssql")]
            DatabaseType::Mssql => Ok(BackendConfig::Mssql(MssqlOptions::parse(
                connection_string,
            )?)),
            #[allow(unreachable_patterns)]
            other => Err(SqlCoordinatorError::ConfigurationError(format!(
                "{other} support is not enabled in this build"
            ))),
        }
    }
}

/// An open connection to one of the supported engines.
pub(crate) enum Backend {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteConnection),
    #[cfg(feature = "mssql")]
    Mssql(MssqlConnection),
}

// Manual Debug implementation because the tiberius client does not implement Debug
impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => f.debug_tuple("Sqlite").field(conn).finish(),
            #[cfg(feature = "mssql")]
            Self::Mssql(conn) => f.debug_tuple("Mssql").field(conn).finish(),
        }
    }
}

impl Backend {
    pub(crate) async fn open(config: &BackendConfig) -> Result<Self, SqlCoordinatorError> {
        match config {
            #[cfg(feature = "sqlite")]
            BackendConfig::Sqlite(opts) => Ok(Backend::Sqlite(
                SqliteConnection::open(opts.clone()).await?,
            )),
            #[cfg(feature = "mssql")]
            BackendConfig::Mssql(opts) => Ok(Backend::Mssql(MssqlConnection::open(opts).await?)),
        }
    }

    pub(crate) async fn close(self) -> Result<(), SqlCoordinatorError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.close().await,
            #[cfg(feature = "mssql")]
            Backend::Mssql(conn) => conn.close().await,
        }
    }

    pub(crate) async fn begin(&mut self) -> Result<(), SqlCoordinatorError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.begin().await,
            #[cfg(feature = "mssql")]
            Backend::Mssql(conn) => conn.begin().await,
        }
    }

    pub(crate) async fn commit(&mut self) -> Result<(), SqlCoordinatorError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.commit().await,
            #[cfg(feature = "mssql")]
            Backend::Mssql(conn) => conn.commit().await,
        }
    }

    pub(crate) async fn rollback(&mut self) -> Result<(), SqlCoordinatorError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.rollback().await,
            #[cfg(feature = "mssql")]
            Backend::Mssql(conn) => conn.rollback().await,
        }
    }

    #[cfg_attr(not(feature = "sqlite"), allow(unused_variables))]
    pub(crate) async fn execute(
        &mut self,
        command: Command,
        shape: ResultShape,
        cancel: CancelToken,
    ) -> Result<CommandOutcome, SqlCoordinatorError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.execute(command, shape, cancel).await,
            #[cfg(feature = "mssql")]
            Backend::Mssql(conn) => conn.execute(&command, shape).await,
        }
    }

    #[cfg_attr(not(feature = "sqlite"), allow(unused_variables))]
    pub(crate) async fn bulk_load(
        &mut self,
        payload: BulkPayload,
        tracker: ProgressTracker,
        cancel: CancelToken,
    ) -> Result<u64, SqlCoordinatorError> {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.bulk_load(payload, tracker, cancel).await,
            #[cfg(feature = "mssql")]
            Backend::Mssql(conn) => {
                let mut tracker = tracker;
                conn.bulk_load(&payload, &mut tracker).await
            }
        }
    }

    /// False once the engine has ended the transaction on its own after a failure.
    pub(crate) fn in_transaction(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.in_transaction(),
            #[cfg(feature = "mssql")]
            Backend::Mssql(conn) => conn.in_transaction(),
        }
    }

    /// Stop the statement in flight, where the driver can do that without losing the session.
    pub(crate) fn interrupt(&self) {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(conn) => conn.interrupt(),
            #[cfg(feature = "mssql")]
            Backend::Mssql(_) => {}
        }
    }

    /// SQL Server sessions are left mid-response when a call is abandoned, so the
    /// connection has to go.
    pub(crate) fn drops_on_timeout(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(_) => false,
            #[cfg(feature = "mssql")]
            Backend::Mssql(_) => true,
        }
    }
}
