use tiberius::{Client, Config, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::error::{FailureKind, SqlCoordinatorError};

/// Type alias for SQL Server client
pub type MssqlClient = Client<Compat<TcpStream>>;

/// Open a client for `config`, following one server redirect.
///
/// Named instances (`Server=host\instance`) are resolved through the SQL Browser service.
///
/// # Errors
/// Returns `SqlCoordinatorError::ConnectionError` if the TCP connection or the login fails.
pub async fn create_mssql_client(config: Config) -> Result<MssqlClient, SqlCoordinatorError> {
    let tcp = open_tcp(&config).await?;
    match Client::connect(config.clone(), tcp.compat_write()).await {
        Ok(client) => Ok(client),
        // Azure SQL gateways redirect to the node that owns the database
        Err(tiberius::error::Error::Routing { host, port }) => {
            let mut config = config;
            config.host(&host);
            config.port(port);
            let tcp = open_tcp(&config).await?;
            Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| login_error(&e.to_string(), e))
        }
        Err(e) => Err(login_error(&e.to_string(), e)),
    }
}

async fn open_tcp(config: &Config) -> Result<TcpStream, SqlCoordinatorError> {
    TcpStream::connect_named(config).await.map_err(|e| {
        SqlCoordinatorError::connection(
            FailureKind::Driver,
            format!("TCP connection to {} failed: {e}", config.get_addr()),
            e,
        )
    })
}

fn login_error(detail: &str, err: tiberius::error::Error) -> SqlCoordinatorError {
    SqlCoordinatorError::connection(
        FailureKind::Driver,
        format!("SQL Server connection error: {detail}"),
        err,
    )
}
