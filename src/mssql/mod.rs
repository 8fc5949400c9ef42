// SQL Server driver - one tiberius client over a tokio TCP stream
//
// - config: ADO.NET / JDBC connection-string parsing
// - client: TCP connect, login and redirect handling
// - params: sp_executesql and stored-procedure call building
// - query: result-stream extraction
// - bulk: native bulk copy (INSERT BULK)
// - connection: the connection handle and its transaction state

pub mod bulk;
pub mod client;
pub mod config;
pub mod connection;
pub mod params;
pub mod query;

pub use config::MssqlOptions;
pub use connection::MssqlConnection;

use crate::error::SqlCoordinatorError;

/// Wrap a tiberius failure, keeping the server error number when the server sent one.
pub(crate) fn database_error(context: &str, err: tiberius::error::Error) -> SqlCoordinatorError {
    let code = match &err {
        tiberius::error::Error::Server(token) => Some(i64::from(token.code())),
        _ => None,
    };
    SqlCoordinatorError::database(code, format!("SQL Server {context} failed: {err}"), err)
}
