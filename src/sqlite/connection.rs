use std::fmt;
use std::sync::Arc;

use rusqlite::InterruptHandle;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle, spawn_blocking};
use tracing::{debug, warn};

use crate::bulk::{BulkPayload, ProgressTracker};
use crate::command::{CancelToken, Command, CommandOutcome, ResultShape};
use crate::error::{FailureKind, SqlCoordinatorError};
use crate::types::CommandKind;

use super::config::SqliteOptions;
use super::{bulk, database_error, query};

/// Shared handle to the single `rusqlite` connection, locked by whichever blocking task runs.
pub type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// One physical `SQLite` connection; statements run on the blocking pool.
pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    interrupt: Arc<InterruptHandle>,
    in_transaction: bool,
}

impl SqliteConnection {
    /// Open the database described by `opts`.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConnectionError` if the file cannot be opened or the
    /// connection pragmas fail.
    pub async fn open(opts: SqliteOptions) -> Result<Self, SqlCoordinatorError> {
        let conn = spawn_blocking(move || {
            let conn = rusqlite::Connection::open_with_flags(&opts.path, opts.flags)
                .map_err(|e| open_error(&opts.path, e))?;
            if let Some(timeout) = opts.busy_timeout {
                conn.busy_timeout(timeout)
                    .map_err(|e| open_error(&opts.path, e))?;
            }
            if let Some(enabled) = opts.foreign_keys {
                conn.pragma_update(None, "foreign_keys", enabled)
                    .map_err(|e| open_error(&opts.path, e))?;
            }
            Ok::<_, SqlCoordinatorError>(conn)
        })
        .await
        .map_err(|e| worker_failed("open", e))??;

        let interrupt = Arc::new(conn.get_interrupt_handle());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
            in_transaction: false,
        })
    }

    /// Close the connection, reporting close failures.
    ///
    /// If a timed-out statement still holds the handle, closing is left to the last owner.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConnectionError` if `SQLite` refuses to close.
    pub async fn close(mut self) -> Result<(), SqlCoordinatorError> {
        // closing with an open transaction rolls it back, no explicit ROLLBACK needed
        self.in_transaction = false;
        let shared = Arc::clone(&self.conn);
        drop(self);
        let Ok(mutex) = Arc::try_unwrap(shared) else {
            return Ok(());
        };
        let conn = mutex.into_inner();
        spawn_blocking(move || {
            conn.close().map_err(|(_, e)| {
                SqlCoordinatorError::connection(
                    FailureKind::Driver,
                    "failed to close SQLite connection",
                    e,
                )
            })
        })
        .await
        .map_err(|e| worker_failed("close", e))?
    }

    pub async fn begin(&mut self) -> Result<(), SqlCoordinatorError> {
        if self.in_transaction {
            return Err(SqlCoordinatorError::connection_state(
                "SQLite transaction already in progress",
            ));
        }
        spawn_locked(self.conn_handle(), |guard| {
            guard.execute_batch("BEGIN").map_err(|e| {
                SqlCoordinatorError::connection(
                    FailureKind::Driver,
                    "failed to begin SQLite transaction",
                    e,
                )
            })
        })
        .await
        .map_err(|e| worker_failed("begin", e))??;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the open transaction. On failure the transaction is rolled back before the
    /// error is returned, so the connection never stays mid-transaction.
    pub async fn commit(&mut self) -> Result<(), SqlCoordinatorError> {
        self.finish_transaction("COMMIT").await
    }

    pub async fn rollback(&mut self) -> Result<(), SqlCoordinatorError> {
        self.finish_transaction("ROLLBACK").await
    }

    async fn finish_transaction(&mut self, verb: &'static str) -> Result<(), SqlCoordinatorError> {
        if !self.in_transaction {
            return Err(SqlCoordinatorError::connection_state(
                "SQLite transaction not active",
            ));
        }
        self.in_transaction = false;
        run_blocking(self.conn_handle(), move |guard| {
            // SQLite may already have rolled back on its own (interrupt, ROLLBACK conflict clause)
            if guard.is_autocommit() {
                return match verb {
                    "ROLLBACK" => Ok(()),
                    _ => Err(SqlCoordinatorError::database_message(
                        "SQLite COMMIT failed: the transaction was already rolled back",
                    )),
                };
            }
            let result = guard.execute_batch(verb).map_err(|e| database_error(verb, e));
            if result.is_err() && !guard.is_autocommit() {
                if let Err(cleanup) = guard.execute_batch("ROLLBACK") {
                    debug!("rollback after failed {verb} also failed: {cleanup}");
                }
            }
            result
        })
        .await
    }

    /// True while this connection has a transaction open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// A statement can end the transaction inside SQLite; stop tracking it if so.
    fn settle<R>(
        &mut self,
        (result, autocommit): (Result<R, SqlCoordinatorError>, bool),
    ) -> Result<R, SqlCoordinatorError> {
        if self.in_transaction && autocommit {
            warn!("SQLite ended the transaction during a statement");
            self.in_transaction = false;
        }
        result
    }

    /// Run a command to completion on the blocking pool.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::InvalidArgument` for stored procedures and
    /// `SqlCoordinatorError::DatabaseError` for anything `SQLite` rejects.
    pub async fn execute(
        &mut self,
        command: Command,
        shape: ResultShape,
        cancel: CancelToken,
    ) -> Result<CommandOutcome, SqlCoordinatorError> {
        if command.kind == CommandKind::StoredProcedure {
            return Err(SqlCoordinatorError::InvalidArgument(
                "SQLite does not support stored procedures".into(),
            ));
        }
        let outcome = run_blocking(self.conn_handle(), move |guard| {
            let result =
                query::run_batch(guard, &command.text, &command.parameters, shape, &cancel);
            Ok((result, guard.is_autocommit()))
        })
        .await?;
        self.settle(outcome)
    }

    pub async fn bulk_load(
        &mut self,
        payload: BulkPayload,
        mut tracker: ProgressTracker,
        cancel: CancelToken,
    ) -> Result<u64, SqlCoordinatorError> {
        let outcome = run_blocking(self.conn_handle(), move |guard| {
            let result = bulk::bulk_insert(guard, &payload, &mut tracker, &cancel);
            Ok((result, guard.is_autocommit()))
        })
        .await?;
        self.settle(outcome)
    }

    /// Abort whatever statement is running right now.
    pub fn interrupt(&self) {
        self.interrupt.interrupt();
    }

    fn conn_handle(&self) -> SharedSqliteConnection {
        Arc::clone(&self.conn)
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        if !self.in_transaction {
            return;
        }
        // best effort; a busy handle rolls back when its last owner closes it
        if let Ok(guard) = self.conn.try_lock() {
            if let Err(e) = guard.execute_batch("ROLLBACK") {
                debug!("rollback on drop failed: {e}");
            }
        }
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

/// Run `func` against the locked connection; a failed worker is an `UnexpectedError`.
async fn run_blocking<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> Result<R, SqlCoordinatorError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlCoordinatorError> + Send + 'static,
    R: Send + 'static,
{
    spawn_locked(conn, func).await?
}

fn spawn_locked<F, R>(
    conn: SharedSqliteConnection,
    func: F,
) -> JoinHandle<Result<R, SqlCoordinatorError>>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, SqlCoordinatorError> + Send + 'static,
    R: Send + 'static,
{
    spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
}

/// Connection lifecycle paths report a lost worker as a connection failure.
fn worker_failed(operation: &str, err: JoinError) -> SqlCoordinatorError {
    SqlCoordinatorError::connection(
        FailureKind::Unexpected,
        format!("SQLite {operation} worker failed"),
        err,
    )
}

fn open_error(path: &str, err: rusqlite::Error) -> SqlCoordinatorError {
    SqlCoordinatorError::connection(
        FailureKind::Driver,
        format!("failed to open SQLite database '{path}'"),
        err,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lost_worker_is_an_unexpected_connection_error() {
        let join_err = tokio::spawn(async { panic!("worker died") })
            .await
            .unwrap_err();
        let err = worker_failed("open", join_err);
        assert!(matches!(
            err,
            SqlCoordinatorError::ConnectionError {
                kind: FailureKind::Unexpected,
                source: Some(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn conflict_rollback_ends_the_tracked_transaction() {
        let mut conn = SqliteConnection::open(SqliteOptions::new(":memory:"))
            .await
            .unwrap();
        let setup = Command::build(
            "CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);",
            CommandKind::Text,
            None,
            std::time::Duration::from_secs(5),
            false,
        )
        .unwrap();
        conn.execute(setup, ResultShape::RowsAffected, CancelToken::new())
            .await
            .unwrap();

        conn.begin().await.unwrap();
        let duplicate = Command::build(
            "INSERT OR ROLLBACK INTO t VALUES (1)",
            CommandKind::Text,
            None,
            std::time::Duration::from_secs(5),
            true,
        )
        .unwrap();
        let err = conn
            .execute(duplicate, ResultShape::RowsAffected, CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SqlCoordinatorError::DatabaseError { .. }));
        assert!(!conn.in_transaction());
    }
}
