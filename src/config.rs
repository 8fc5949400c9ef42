use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use crate::coordinator::Coordinator;
use crate::error::SqlCoordinatorError;
use crate::types::DatabaseType;

/// Command timeout used when a call does not pass its own.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings key the hosting application resolves its connection string from.
pub const DEFAULT_CONNECTION_NAME: &str = "DefaultConnection";

/// Options for constructing a [`Coordinator`].
#[derive(Clone)]
pub struct CoordinatorOptions {
    pub database_type: DatabaseType,
    pub connection_string: String,
    pub default_timeout: Duration,
}

// Manual Debug implementation because connection strings usually carry credentials
impl fmt::Debug for CoordinatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinatorOptions")
            .field("database_type", &self.database_type)
            .field("connection_string", &"<redacted>")
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

impl CoordinatorOptions {
    #[must_use]
    pub fn new(database_type: DatabaseType, connection_string: impl Into<String>) -> Self {
        Self {
            database_type,
            connection_string: connection_string.into(),
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    #[must_use]
    pub fn sqlite(connection_string: impl Into<String>) -> Self {
        Self::new(DatabaseType::Sqlite, connection_string)
    }

    #[must_use]
    pub fn mssql(connection_string: impl Into<String>) -> Self {
        Self::new(DatabaseType::Mssql, connection_string)
    }

    #[must_use]
    pub fn with_default_timeout(mut self, default_timeout: Duration) -> Self {
        self.default_timeout = default_timeout;
        self
    }

    /// Resolve options from host settings using the `DefaultConnection` entry.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` if the entry or the database type is
    /// missing or invalid.
    pub fn from_settings(settings: &AppSettings) -> Result<Self, SqlCoordinatorError> {
        let connection_string = settings.connection_string(DEFAULT_CONNECTION_NAME)?;
        let mut opts = Self::new(settings.database_type()?, connection_string);
        if let Some(secs) = settings.command_timeout_seconds {
            opts.default_timeout = Duration::from_secs(secs);
        }
        Ok(opts)
    }

    pub(crate) fn validate(&self) -> Result<(), SqlCoordinatorError> {
        if self.connection_string.trim().is_empty() {
            return Err(SqlCoordinatorError::ConfigurationError(
                "connection string must not be empty".into(),
            ));
        }
        if self.default_timeout.is_zero() {
            return Err(SqlCoordinatorError::ConfigurationError(
                "default timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for coordinator options.
#[derive(Debug, Clone)]
pub struct CoordinatorOptionsBuilder {
    opts: CoordinatorOptions,
}

impl CoordinatorOptionsBuilder {
    #[must_use]
    pub fn new(database_type: DatabaseType, connection_string: impl Into<String>) -> Self {
        Self {
            opts: CoordinatorOptions::new(database_type, connection_string),
        }
    }

    #[must_use]
    pub fn default_timeout(mut self, default_timeout: Duration) -> Self {
        self.opts.default_timeout = default_timeout;
        self
    }

    #[must_use]
    pub fn finish(self) -> CoordinatorOptions {
        self.opts
    }

    /// Build a `Coordinator`. No connection is opened yet.
    ///
    /// # Errors
    ///
    /// Returns `SqlCoordinatorError::ConfigurationError` if the options are invalid.
    pub fn build(self) -> Result<Coordinator, SqlCoordinatorError> {
        Coordinator::new(self.finish())
    }
}

impl Coordinator {
    #[must_use]
    pub fn builder(
        database_type: DatabaseType,
        connection_string: impl Into<String>,
    ) -> CoordinatorOptionsBuilder {
        CoordinatorOptionsBuilder::new(database_type, connection_string)
    }
}

/// The slice of a host's JSON settings this crate reads.
///
/// ```json
/// {
///   "ConnectionStrings": { "DefaultConnection": "Data Source=app.db" },
///   "DatabaseType": "sqlite",
///   "CommandTimeoutSeconds": 15
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppSettings {
    #[serde(rename = "ConnectionStrings", default)]
    pub connection_strings: HashMap<String, String>,
    #[serde(rename = "DatabaseType", default)]
    pub database_type: Option<String>,
    #[serde(rename = "CommandTimeoutSeconds", default)]
    pub command_timeout_seconds: Option<u64>,
}

impl AppSettings {
    /// Parse settings from a JSON document.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self, SqlCoordinatorError> {
        serde_json::from_str(json).map_err(|e| {
            SqlCoordinatorError::ConfigurationError(format!("invalid settings JSON: {e}"))
        })
    }

    /// Read and parse a JSON settings file.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` if the file cannot be read or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SqlCoordinatorError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SqlCoordinatorError::ConfigurationError(format!(
                "cannot read settings file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json_str(&json)
    }

    /// Look up a named connection string.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` if it is absent or blank.
    pub fn connection_string(&self, name: &str) -> Result<String, SqlCoordinatorError> {
        match self.connection_strings.get(name) {
            Some(value) if !value.trim().is_empty() => Ok(value.clone()),
            Some(_) => Err(SqlCoordinatorError::ConfigurationError(format!(
                "connection string '{name}' is blank"
            ))),
            None => Err(SqlCoordinatorError::ConfigurationError(format!(
                "connection string '{name}' is not configured"
            ))),
        }
    }

    /// The configured database type.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` if it is absent or unknown.
    pub fn database_type(&self) -> Result<DatabaseType, SqlCoordinatorError> {
        let raw = self.database_type.as_deref().ok_or_else(|| {
            SqlCoordinatorError::ConfigurationError("DatabaseType is not configured".into())
        })?;
        DatabaseType::from_str(raw.trim(), true).map_err(|e| {
            SqlCoordinatorError::ConfigurationError(format!("unknown DatabaseType '{raw}': {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_resolve_default_connection() {
        let settings = AppSettings::from_json_str(
            r#"{
                "ConnectionStrings": { "DefaultConnection": "Data Source=app.db" },
                "DatabaseType": "SQLite",
                "CommandTimeoutSeconds": 5
            }"#,
        )
        .unwrap();
        let opts = CoordinatorOptions::from_settings(&settings).unwrap();
        assert_eq!(opts.database_type, DatabaseType::Sqlite);
        assert_eq!(opts.connection_string, "Data Source=app.db");
        assert_eq!(opts.default_timeout, Duration::from_secs(5));
    }

    #[test]
    fn missing_or_blank_connection_is_a_configuration_error() {
        let settings = AppSettings::from_json_str(
            r#"{ "ConnectionStrings": { "Other": "x", "Blank": "  " }, "DatabaseType": "mssql" }"#,
        )
        .unwrap();
        for name in [DEFAULT_CONNECTION_NAME, "Blank"] {
            assert!(matches!(
                settings.connection_string(name),
                Err(SqlCoordinatorError::ConfigurationError(_))
            ));
        }
        assert!(matches!(
            CoordinatorOptions::from_settings(&settings),
            Err(SqlCoordinatorError::ConfigurationError(_))
        ));
    }

    #[test]
    fn unknown_database_type_is_rejected() {
        let settings = AppSettings::from_json_str(r#"{ "DatabaseType": "oracle" }"#).unwrap();
        assert!(matches!(
            settings.database_type(),
            Err(SqlCoordinatorError::ConfigurationError(_))
        ));
    }

    #[test]
    fn default_timeout_can_be_overridden() {
        let opts = CoordinatorOptions::sqlite(":memory:");
        assert_eq!(opts.default_timeout, Duration::from_secs(30));
        let opts = opts.with_default_timeout(Duration::from_millis(250));
        assert_eq!(opts.default_timeout, Duration::from_millis(250));
    }

    #[test]
    fn debug_output_redacts_connection_string() {
        let opts = CoordinatorOptions::mssql("Server=x;Password=hunter2");
        let printed = format!("{opts:?}");
        assert!(!printed.contains("hunter2"));
    }
}
