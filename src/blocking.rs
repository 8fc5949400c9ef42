use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::bulk::BulkLoadOptions;
use crate::config::{AppSettings, CoordinatorOptions};
use crate::coordinator::Coordinator;
use crate::error::SqlCoordinatorError;
use crate::params::ParameterSet;
use crate::results::ResultSet;
use crate::transaction::TransactionState;
use crate::types::{CommandKind, DatabaseType, DbValue};

/// Synchronous front end over [`Coordinator`], driving it on a private current-thread runtime.
///
/// Must not be used from inside an async context; `block_on` panics there.
pub struct BlockingCoordinator {
    // dropped before the runtime so the connection closes while the runtime still exists
    inner: Coordinator,
    runtime: Runtime,
}

impl std::fmt::Debug for BlockingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingCoordinator")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl BlockingCoordinator {
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` for invalid options and
    /// `SqlCoordinatorError::UnexpectedError` if the runtime cannot be created.
    pub fn new(options: CoordinatorOptions) -> Result<Self, SqlCoordinatorError> {
        let inner = Coordinator::new(options)?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SqlCoordinatorError::unexpected("failed to start runtime", e))?;
        Ok(Self { inner, runtime })
    }

    /// # Errors
    /// Same as [`BlockingCoordinator::new`], plus incomplete settings.
    pub fn from_settings(settings: &AppSettings) -> Result<Self, SqlCoordinatorError> {
        Self::new(CoordinatorOptions::from_settings(settings)?)
    }

    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        self.inner.database_type()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    #[must_use]
    pub fn transaction_state(&self) -> TransactionState {
        self.inner.transaction_state()
    }

    /// # Errors
    /// See [`Coordinator::open`].
    pub fn open(&mut self) -> Result<(), SqlCoordinatorError> {
        self.runtime.block_on(self.inner.open())
    }

    /// # Errors
    /// See [`Coordinator::close`].
    pub fn close(&mut self) -> Result<(), SqlCoordinatorError> {
        self.runtime.block_on(self.inner.close())
    }

    /// # Errors
    /// See [`Coordinator::begin_transaction`].
    pub fn begin_transaction(&mut self) -> Result<(), SqlCoordinatorError> {
        self.runtime.block_on(self.inner.begin_transaction())
    }

    /// # Errors
    /// See [`Coordinator::commit`].
    pub fn commit(&mut self) -> Result<(), SqlCoordinatorError> {
        self.runtime.block_on(self.inner.commit())
    }

    /// # Errors
    /// See [`Coordinator::rollback`].
    pub fn rollback(&mut self) -> Result<(), SqlCoordinatorError> {
        self.runtime.block_on(self.inner.rollback())
    }

    /// # Errors
    /// See [`Coordinator::execute_statement`].
    pub fn execute_statement(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Option<Duration>,
    ) -> Result<u64, SqlCoordinatorError> {
        self.runtime
            .block_on(self.inner.execute_statement(sql, kind, params, timeout))
    }

    /// # Errors
    /// See [`Coordinator::execute_scalar`].
    pub fn execute_scalar(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Option<Duration>,
    ) -> Result<DbValue, SqlCoordinatorError> {
        self.runtime
            .block_on(self.inner.execute_scalar(sql, kind, params, timeout))
    }

    /// # Errors
    /// See [`Coordinator::execute_row_set`].
    pub fn execute_row_set(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Option<Duration>,
    ) -> Result<ResultSet, SqlCoordinatorError> {
        self.runtime
            .block_on(self.inner.execute_row_set(sql, kind, params, timeout))
    }

    /// # Errors
    /// See [`Coordinator::execute_multi_row_set`].
    pub fn execute_multi_row_set(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Option<Duration>,
    ) -> Result<Vec<ResultSet>, SqlCoordinatorError> {
        self.runtime
            .block_on(self.inner.execute_multi_row_set(sql, kind, params, timeout))
    }

    /// # Errors
    /// See [`Coordinator::bulk_load`].
    pub fn bulk_load(
        &mut self,
        destination_table: &str,
        rows: &ResultSet,
        timeout: Option<Duration>,
        options: Option<BulkLoadOptions>,
    ) -> Result<u64, SqlCoordinatorError> {
        self.runtime
            .block_on(self.inner.bulk_load(destination_table, rows, timeout, options))
    }
}
