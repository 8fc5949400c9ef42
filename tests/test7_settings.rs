use std::io::Write;
use std::time::Duration;

use sql_coordinator::prelude::*;
use sql_coordinator::DEFAULT_COMMAND_TIMEOUT;

#[test]
fn coordinator_from_settings_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        r#"{{
            "ConnectionStrings": {{ "DefaultConnection": "Data Source=:memory:;Foreign Keys=true" }},
            "DatabaseType": "sqlite",
            "CommandTimeoutSeconds": 12
        }}"#
    )?;

    let settings = AppSettings::from_path(file.path())?;
    let opts = CoordinatorOptions::from_settings(&settings)?;
    assert_eq!(opts.default_timeout, Duration::from_secs(12));

    let db = Coordinator::from_settings(&settings)?;
    assert_eq!(db.database_type(), DatabaseType::Sqlite);
    assert!(!db.is_open());
    Ok(())
}

#[test]
fn timeout_defaults_to_thirty_seconds() -> Result<(), SqlCoordinatorError> {
    let settings = AppSettings::from_json_str(
        r#"{ "ConnectionStrings": { "DefaultConnection": "app.db" }, "DatabaseType": "SQLITE" }"#,
    )?;
    let db = Coordinator::from_settings(&settings)?;
    assert_eq!(db.default_timeout(), DEFAULT_COMMAND_TIMEOUT);
    assert_eq!(DEFAULT_COMMAND_TIMEOUT, Duration::from_secs(30));
    Ok(())
}

#[test]
fn malformed_settings_are_configuration_errors() {
    let missing = AppSettings::from_json_str(r#"{ "DatabaseType": "sqlite" }"#).unwrap();
    assert!(matches!(
        Coordinator::from_settings(&missing),
        Err(SqlCoordinatorError::ConfigurationError(_))
    ));

    let unknown_type = AppSettings::from_json_str(
        r#"{ "ConnectionStrings": { "DefaultConnection": "app.db" }, "DatabaseType": "oracle" }"#,
    )
    .unwrap();
    assert!(matches!(
        Coordinator::from_settings(&unknown_type),
        Err(SqlCoordinatorError::ConfigurationError(_))
    ));

    assert!(matches!(
        AppSettings::from_json_str("{ not json"),
        Err(SqlCoordinatorError::ConfigurationError(_))
    ));

    assert!(matches!(
        Coordinator::new(CoordinatorOptions::sqlite("Data Source=app.db;Colour=blue")),
        Err(SqlCoordinatorError::ConfigurationError(_))
    ));
}

#[cfg(not(feature = "mssql"))]
#[test]
fn disabled_backend_is_a_configuration_error() {
    assert!(matches!(
        Coordinator::new(CoordinatorOptions::mssql("Server=localhost;User Id=sa;Password=x")),
        Err(SqlCoordinatorError::ConfigurationError(_))
    ));
}

#[cfg(feature = "mssql")]
#[test]
fn mssql_strings_are_parsed_without_connecting() -> Result<(), SqlCoordinatorError> {
    let db = Coordinator::builder(
        DatabaseType::Mssql,
        "Server=tcp:db.example.invalid,1433;Database=app;User Id=sa;Password=secret",
    )
    .default_timeout(Duration::from_secs(5))
    .build()?;
    assert!(!db.is_open());
    assert!(!format!("{db:?}").contains("secret"));
    Ok(())
}
