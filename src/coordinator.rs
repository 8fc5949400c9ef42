use std::time::Duration;

use tracing::{debug, error, warn};

use crate::backend::{Backend, BackendConfig};
use crate::bulk::{BulkLoadOptions, BulkPayload};
use crate::command::{CancelToken, Command, CommandOutcome, ResultShape};
use crate::config::{AppSettings, CoordinatorOptions};
use crate::error::{FailureKind, SqlCoordinatorError};
use crate::params::ParameterSet;
use crate::results::ResultSet;
use crate::transaction::TransactionState;
use crate::types::{CommandKind, DatabaseType, DbValue};

/// Owns one database connection and at most one transaction for a unit of work.
///
/// The connection opens on first use and closes when the coordinator is closed or dropped.
/// Every operation takes `&mut self`, so one coordinator serves one task at a time.
///
/// If the database rolls a transaction back on its own after a failed statement or a
/// timeout, the state becomes `RolledBack` and every further command fails with
/// `InvalidState` until the caller acknowledges it with
/// [`Coordinator::rollback`]. Nothing runs outside the transaction the caller asked for.
///
/// ```no_run
/// use sql_coordinator::prelude::*;
///
/// # async fn demo() -> Result<(), SqlCoordinatorError> {
/// let mut db = Coordinator::new(CoordinatorOptions::sqlite("app.db"))?;
/// db.begin_transaction().await?;
///
/// let mut params = ParameterSet::new();
/// params.add("@name", "widget", DbType::NVarChar)?;
/// db.execute_statement(
///     "INSERT INTO items (name) VALUES (@name)",
///     CommandKind::Text,
///     Some(&params),
///     None,
/// )
/// .await?;
///
/// db.commit().await?;
/// # Ok(())
/// # }
/// ```
pub struct Coordinator {
    options: CoordinatorOptions,
    config: BackendConfig,
    backend: Option<Backend>,
    state: TransactionState,
    // set when the engine (or a timeout) ended the transaction behind the caller's back;
    // cleared by rollback(), commit() or close()
    abandoned: bool,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("options", &self.options)
            .field("open", &self.backend.is_some())
            .field("state", &self.state)
            .field("abandoned", &self.abandoned)
            .finish()
    }
}

impl Coordinator {
    /// Validate the options and parse the connection string. Nothing is opened yet.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` for a blank or malformed connection
    /// string, a zero timeout, or a database type this build was compiled without.
    pub fn new(options: CoordinatorOptions) -> Result<Self, SqlCoordinatorError> {
        options.validate()?;
        let config = BackendConfig::parse(options.database_type, &options.connection_string)?;
        Ok(Self {
            options,
            config,
            backend: None,
            state: TransactionState::None,
            abandoned: false,
        })
    }

    /// Build a coordinator from host settings (`ConnectionStrings:DefaultConnection`).
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` if the settings are incomplete.
    pub fn from_settings(settings: &AppSettings) -> Result<Self, SqlCoordinatorError> {
        Self::new(CoordinatorOptions::from_settings(settings)?)
    }

    #[must_use]
    pub fn database_type(&self) -> DatabaseType {
        self.options.database_type
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    #[must_use]
    pub fn transaction_state(&self) -> TransactionState {
        self.state
    }

    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.options.default_timeout
    }

    /// Open the connection if it is not open yet.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConnectionError` if the driver cannot connect within the
    /// default timeout.
    pub async fn open(&mut self) -> Result<(), SqlCoordinatorError> {
        if self.backend.is_some() {
            return Ok(());
        }
        let timeout = self.options.default_timeout;
        let backend = match tokio::time::timeout(timeout, Backend::open(&self.config)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    database = %self.options.database_type,
                    ?timeout,
                    "connection attempt timed out"
                );
                return Err(SqlCoordinatorError::ConnectionError {
                    kind: FailureKind::Driver,
                    message: format!(
                        "opening the {} connection timed out after {timeout:?}",
                        self.options.database_type
                    ),
                    source: None,
                });
            }
        };
        debug!(database = %self.options.database_type, "connection opened");
        self.backend = Some(backend);
        Ok(())
    }

    /// Close the connection if it is open.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::InvalidState` while a transaction is active, or
    /// `SqlCoordinatorError::ConnectionError` if the driver fails to close.
    pub async fn close(&mut self) -> Result<(), SqlCoordinatorError> {
        if self.state.is_active() {
            return Err(SqlCoordinatorError::InvalidState(
                "cannot close the connection while a transaction is active".into(),
            ));
        }
        self.abandoned = false;
        if let Some(backend) = self.backend.take() {
            backend.close().await?;
            debug!(database = %self.options.database_type, "connection closed");
        }
        Ok(())
    }

    /// Start a transaction, opening the connection first if needed.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::InvalidState` if a transaction is already active and
    /// `SqlCoordinatorError::ConnectionError` if the driver cannot start one.
    pub async fn begin_transaction(&mut self) -> Result<(), SqlCoordinatorError> {
        if self.state.is_active() {
            return Err(SqlCoordinatorError::InvalidState(
                "a transaction is already active on this coordinator".into(),
            ));
        }
        self.ensure_not_abandoned()?;
        self.open().await?;
        self.backend_mut()?.begin().await?;
        self.state = TransactionState::Active;
        debug!("transaction started");
        Ok(())
    }

    /// Commit the active transaction. Does nothing when no transaction is active.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::DatabaseError` if the commit fails; the transaction is
    /// then rolled back and the state becomes `RolledBack`. Also fails when the database
    /// already rolled the transaction back on its own.
    pub async fn commit(&mut self) -> Result<(), SqlCoordinatorError> {
        if self.abandoned {
            self.abandoned = false;
            return Err(SqlCoordinatorError::database_message(
                "commit failed: the transaction was already rolled back by the database",
            ));
        }
        if !self.state.is_active() {
            return Ok(());
        }
        let result = self.backend_mut()?.commit().await;
        self.state = if result.is_ok() {
            TransactionState::Committed
        } else {
            TransactionState::RolledBack
        };
        debug!(state = %self.state, "transaction finished");
        result
    }

    /// Roll back the active transaction. Does nothing when no transaction is active.
    ///
    /// After the database rolled back on its own this only acknowledges it, and commands are
    /// accepted again.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::DatabaseError` if the driver reports a failure.
    pub async fn rollback(&mut self) -> Result<(), SqlCoordinatorError> {
        if self.abandoned {
            self.abandoned = false;
            debug!("abandoned transaction acknowledged");
            return Ok(());
        }
        if !self.state.is_active() {
            return Ok(());
        }
        let result = self.backend_mut()?.rollback().await;
        self.state = TransactionState::RolledBack;
        debug!(state = %self.state, "transaction finished");
        result
    }

    /// Run a command and return the number of rows it changed.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::InvalidArgument` for blank SQL and
    /// `SqlCoordinatorError::DatabaseError` for driver failures and timeouts.
    pub async fn execute_statement(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Option<Duration>,
    ) -> Result<u64, SqlCoordinatorError> {
        let command = self.command(sql, kind, params, timeout)?;
        let outcome = self.run(command, ResultShape::RowsAffected).await?;
        Ok(outcome.rows_affected)
    }

    /// First column of the first row of the first result set, or `DbValue::Null`.
    ///
    /// # Errors
    /// Same as [`Coordinator::execute_statement`].
    pub async fn execute_scalar(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Option<Duration>,
    ) -> Result<DbValue, SqlCoordinatorError> {
        let command = self.command(sql, kind, params, timeout)?;
        let outcome = self.run(command, ResultShape::FirstResult).await?;
        Ok(outcome
            .result_sets
            .first()
            .and_then(ResultSet::first_value)
            .cloned()
            .unwrap_or(DbValue::Null))
    }

    /// The first result set; empty when the command produced none.
    ///
    /// # Errors
    /// Same as [`Coordinator::execute_statement`].
    pub async fn execute_row_set(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Option<Duration>,
    ) -> Result<ResultSet, SqlCoordinatorError> {
        let command = self.command(sql, kind, params, timeout)?;
        let outcome = self.run(command, ResultShape::FirstResult).await?;
        Ok(outcome.result_sets.into_iter().next().unwrap_or_default())
    }

    /// Every result set the command produced, in server order.
    ///
    /// # Errors
    /// Same as [`Coordinator::execute_statement`].
    pub async fn execute_multi_row_set(
        &mut self,
        sql: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Option<Duration>,
    ) -> Result<Vec<ResultSet>, SqlCoordinatorError> {
        let command = self.command(sql, kind, params, timeout)?;
        let outcome = self.run(command, ResultShape::AllResults).await?;
        Ok(outcome.result_sets)
    }

    /// Copy `rows` into `destination_table`, matching columns by name.
    ///
    /// Inside an active transaction the load is part of it; otherwise each batch commits on
    /// its own. This surface is still experimental.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::InvalidArgument` for a blank table name or an empty row
    /// set (checked before the connection is touched) and `SqlCoordinatorError::DatabaseError`
    /// for anything the database rejects.
    pub async fn bulk_load(
        &mut self,
        destination_table: &str,
        rows: &ResultSet,
        timeout: Option<Duration>,
        options: Option<BulkLoadOptions>,
    ) -> Result<u64, SqlCoordinatorError> {
        let options = options.unwrap_or_default();
        let payload = BulkPayload::prepare(destination_table, rows, &options)?;
        self.ensure_not_abandoned()?;
        let timeout = timeout.unwrap_or(self.options.default_timeout);
        debug!(
            table = %payload.table,
            rows = payload.row_count(),
            batch_size = payload.batch_size,
            "bulk load (experimental)"
        );

        self.open().await?;
        let cancel = CancelToken::new();
        let backend = self.backend_mut()?;
        let load = backend.bulk_load(payload, options.tracker(), cancel.clone());
        let result = tokio::time::timeout(timeout, load).await;
        match result {
            Ok(result) => {
                self.settle_transaction();
                result
            }
            Err(_) => Err(self.timed_out("bulk load", timeout, &cancel).await),
        }
    }

    fn command(
        &self,
        sql: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Option<Duration>,
    ) -> Result<Command, SqlCoordinatorError> {
        let command = Command::build(
            sql,
            kind,
            params,
            timeout.unwrap_or(self.options.default_timeout),
            self.state.is_active(),
        )?;
        self.ensure_not_abandoned()?;
        Ok(command)
    }

    fn ensure_not_abandoned(&self) -> Result<(), SqlCoordinatorError> {
        if self.abandoned {
            return Err(SqlCoordinatorError::InvalidState(
                "the database rolled back the transaction; call rollback() before continuing"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Pick up a transaction the engine ended while failing the last call.
    fn settle_transaction(&mut self) {
        let ended = self.state.is_active()
            && self
                .backend
                .as_ref()
                .is_some_and(|backend| !backend.in_transaction());
        if ended {
            warn!(
                database = %self.options.database_type,
                "transaction was rolled back by the database"
            );
            self.state = TransactionState::RolledBack;
            self.abandoned = true;
        }
    }

    async fn run(
        &mut self,
        command: Command,
        shape: ResultShape,
    ) -> Result<CommandOutcome, SqlCoordinatorError> {
        self.open().await?;
        debug!(
            kind = ?command.kind,
            parameters = command.parameters.len(),
            in_transaction = command.in_transaction,
            "executing command"
        );
        let timeout = command.timeout;
        let cancel = CancelToken::new();
        let backend = self.backend_mut()?;
        let execution = backend.execute(command, shape, cancel.clone());
        let result = tokio::time::timeout(timeout, execution).await;
        match result {
            Ok(result) => {
                self.settle_transaction();
                result
            }
            Err(_) => Err(self.timed_out("command", timeout, &cancel).await),
        }
    }

    /// Clean up after a call that outlived its timeout. Any active transaction is lost.
    async fn timed_out(
        &mut self,
        operation: &str,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> SqlCoordinatorError {
        cancel.cancel();
        warn!(operation, ?timeout, "database call timed out");
        let was_active = self.state.is_active();
        if let Some(backend) = self.backend.as_mut() {
            if backend.drops_on_timeout() {
                // reopened lazily by the next call
                self.backend = None;
            } else {
                backend.interrupt();
                if was_active {
                    if let Err(e) = backend.rollback().await {
                        debug!("rollback after timeout failed: {e}");
                    }
                }
            }
        }
        if was_active {
            self.state = TransactionState::RolledBack;
            self.abandoned = true;
        }
        SqlCoordinatorError::database_message(format!("{operation} timed out after {timeout:?}"))
    }

    fn backend_mut(&mut self) -> Result<&mut Backend, SqlCoordinatorError> {
        self.backend
            .as_mut()
            .ok_or_else(|| SqlCoordinatorError::connection_state("connection is not open"))
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if self.state.is_active() {
            // the backend's own drop rolls back (SQLite) or the server does on disconnect
            error!(
                database = %self.options.database_type,
                "coordinator dropped with an active transaction; rolling back"
            );
        }
    }
}
