// SQLite driver - runs commands through rusqlite on the blocking pool
//
// - config: connection-string parsing
// - params: value coercion and placeholder binding
// - query: multi-statement execution and result extraction
// - bulk: batched inserts behind savepoints
// - connection: the connection handle and its transaction state

pub mod bulk;
pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::SqliteOptions;
pub use connection::SqliteConnection;

use crate::error::SqlCoordinatorError;

/// Wrap a rusqlite failure, keeping the extended result code when there is one.
pub(crate) fn database_error(context: &str, err: rusqlite::Error) -> SqlCoordinatorError {
    let code = err.sqlite_error().map(|e| i64::from(e.extended_code));
    SqlCoordinatorError::database(code, format!("SQLite {context} failed: {err}"), err)
}
