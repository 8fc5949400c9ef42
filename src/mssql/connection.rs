use std::fmt;

use tiberius::Client;
use tracing::{debug, warn};

use crate::bulk::{BulkPayload, ProgressTracker};
use crate::command::{Command, CommandOutcome, ResultShape};
use crate::error::{FailureKind, SqlCoordinatorError};

use super::client::{MssqlClient, create_mssql_client};
use super::config::MssqlOptions;
use super::{bulk, database_error, query};

/// One SQL Server session.
///
/// Transaction control goes through plain batches rather than RPC so the server does not
/// complain about a transaction count that changed inside `sp_executesql`.
pub struct MssqlConnection {
    client: MssqlClient,
    in_transaction: bool,
}

impl MssqlConnection {
    /// Connect and log in.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConnectionError` if the server is unreachable or the
    /// login is rejected.
    pub async fn open(opts: &MssqlOptions) -> Result<Self, SqlCoordinatorError> {
        let client = create_mssql_client(opts.config.clone()).await?;
        Ok(Self {
            client,
            in_transaction: false,
        })
    }

    /// Log out and close the socket. An open transaction is rolled back by the server.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConnectionError` if the socket cannot be shut down cleanly.
    pub async fn close(self) -> Result<(), SqlCoordinatorError> {
        Client::close(self.client).await.map_err(|e| {
            SqlCoordinatorError::connection(
                FailureKind::Driver,
                "failed to close SQL Server connection",
                e,
            )
        })
    }

    pub async fn begin(&mut self) -> Result<(), SqlCoordinatorError> {
        if self.in_transaction {
            return Err(SqlCoordinatorError::connection_state(
                "SQL Server transaction already in progress",
            ));
        }
        self.batch("BEGIN TRANSACTION").await.map_err(|e| {
            SqlCoordinatorError::connection(
                FailureKind::Driver,
                "failed to begin SQL Server transaction",
                e,
            )
        })?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit; a failed commit is followed by a best-effort rollback.
    pub async fn commit(&mut self) -> Result<(), SqlCoordinatorError> {
        self.finish_transaction("COMMIT TRANSACTION").await
    }

    pub async fn rollback(&mut self) -> Result<(), SqlCoordinatorError> {
        self.finish_transaction("ROLLBACK TRANSACTION").await
    }

    async fn finish_transaction(&mut self, verb: &'static str) -> Result<(), SqlCoordinatorError> {
        if !self.in_transaction {
            return Err(SqlCoordinatorError::connection_state(
                "SQL Server transaction not active",
            ));
        }
        self.in_transaction = false;
        if let Err(err) = self.batch(verb).await {
            if let Err(cleanup) = self.batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION").await {
                debug!("rollback after failed {verb} also failed: {cleanup}");
            }
            return Err(database_error(verb, err));
        }
        Ok(())
    }

    /// Run a command and collect what `shape` asks for.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::DatabaseError` for anything the server rejects.
    pub async fn execute(
        &mut self,
        command: &Command,
        shape: ResultShape,
    ) -> Result<CommandOutcome, SqlCoordinatorError> {
        let result = query::run_command(&mut self.client, command, shape).await;
        if result.is_err() {
            self.check_transaction().await;
        }
        result
    }

    pub async fn bulk_load(
        &mut self,
        payload: &BulkPayload,
        tracker: &mut ProgressTracker,
    ) -> Result<u64, SqlCoordinatorError> {
        let result = bulk::bulk_insert(&mut self.client, payload, tracker).await;
        if result.is_err() {
            self.check_transaction().await;
        }
        result
    }

    /// True while this session has a transaction open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Severe errors (and `XACT_ABORT`) make the server roll the transaction back itself.
    async fn check_transaction(&mut self) {
        if !self.in_transaction {
            return;
        }
        let open = match self.transaction_count().await {
            Ok(count) => count > 0,
            Err(e) => {
                debug!("could not read @@TRANCOUNT after a failed command: {e}");
                false
            }
        };
        if !open {
            warn!("SQL Server rolled back the transaction after a failed command");
            self.in_transaction = false;
        }
    }

    async fn transaction_count(&mut self) -> Result<i32, tiberius::error::Error> {
        let row = self
            .client
            .simple_query("SELECT @@TRANCOUNT")
            .await?
            .into_row()
            .await?;
        match row {
            Some(row) => Ok(row.try_get::<i32, _>(0)?.unwrap_or(0)),
            None => Ok(0),
        }
    }

    async fn batch(&mut self, sql: &str) -> Result<(), tiberius::error::Error> {
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }
}

impl fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlConnection")
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}
