use tiberius::Config as TiberiusConfig;

use crate::error::SqlCoordinatorError;

/// Parsed SQL Server connection settings.
///
/// Both ADO.NET (`Server=tcp:host,1433;Database=app;User Id=sa;Password=...`) and JDBC
/// (`jdbc:sqlserver://host:1433;databaseName=app;user=sa;password=...`) strings are accepted.
#[derive(Clone)]
pub struct MssqlOptions {
    pub config: TiberiusConfig,
}

// Manual Debug implementation because the tiberius config carries credentials
impl std::fmt::Debug for MssqlOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlOptions")
            .field("addr", &self.config.get_addr())
            .finish_non_exhaustive()
    }
}

impl MssqlOptions {
    /// Parse a connection string without touching the network.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` if tiberius cannot parse it.
    pub fn parse(connection_string: &str) -> Result<Self, SqlCoordinatorError> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(SqlCoordinatorError::ConfigurationError(
                "connection string must not be empty".into(),
            ));
        }
        let is_jdbc = trimmed
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("jdbc:"));
        let config = if is_jdbc {
            TiberiusConfig::from_jdbc_string(trimmed)
        } else {
            TiberiusConfig::from_ado_string(trimmed)
        }
        .map_err(|e| {
            SqlCoordinatorError::ConfigurationError(format!(
                "invalid SQL Server connection string: {e}"
            ))
        })?;
        Ok(Self { config })
    }
}
