use std::time::Duration;

use rusqlite::OpenFlags;

use crate::error::SqlCoordinatorError;

/// Parsed `SQLite` connection settings.
///
/// Accepts either a bare path (`app.db`, `:memory:`, `file:app.db?mode=ro`) or a
/// `key=value;` string:
///
/// | Key | Values |
/// |---|---|
/// | `Data Source`, `DataSource`, `Filename` | database path |
/// | `Mode` | `ReadWriteCreate` (default), `ReadWrite`, `ReadOnly`, `Memory` |
/// | `Cache` | `Default`, `Shared`, `Private` |
/// | `Foreign Keys` | `True` / `False` |
/// | `Busy Timeout` | milliseconds to wait on a locked database |
/// | `Pooling` | accepted and ignored |
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub path: String,
    pub flags: OpenFlags,
    pub foreign_keys: Option<bool>,
    pub busy_timeout: Option<Duration>,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            flags: OpenFlags::default(),
            foreign_keys: None,
            busy_timeout: None,
        }
    }

    /// Parse a connection string.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::ConfigurationError` for unknown keys, bad values or a
    /// missing data source.
    pub fn parse(connection_string: &str) -> Result<Self, SqlCoordinatorError> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(config_error("connection string must not be empty"));
        }
        if !trimmed.contains('=') || trimmed.starts_with("file:") {
            return Ok(Self::new(trimmed));
        }

        let mut opts = Self::new(String::new());
        let mut memory = false;
        for pair in trimmed.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| config_error(format!("expected key=value, found '{pair}'")))?;
            let value = value.trim();
            match normalize_key(key).as_str() {
                "datasource" | "filename" => value.clone_into(&mut opts.path),
                "mode" => match normalize_key(value).as_str() {
                    "readwritecreate" => opts.flags = OpenFlags::default(),
                    "readwrite" => opts.flags.remove(OpenFlags::SQLITE_OPEN_CREATE),
                    "readonly" => {
                        opts.flags.remove(
                            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
                        );
                        opts.flags.insert(OpenFlags::SQLITE_OPEN_READ_ONLY);
                    }
                    "memory" => {
                        opts.flags.insert(OpenFlags::SQLITE_OPEN_MEMORY);
                        memory = true;
                    }
                    _ => return Err(config_error(format!("unknown Mode '{value}'"))),
                },
                "cache" => match normalize_key(value).as_str() {
                    "default" => {}
                    "shared" => opts.flags.insert(OpenFlags::SQLITE_OPEN_SHARED_CACHE),
                    "private" => opts.flags.insert(OpenFlags::SQLITE_OPEN_PRIVATE_CACHE),
                    _ => return Err(config_error(format!("unknown Cache '{value}'"))),
                },
                "foreignkeys" => opts.foreign_keys = Some(parse_bool(key, value)?),
                "busytimeout" => {
                    let millis: u64 = value.parse().map_err(|_| {
                        config_error(format!(
                            "Busy Timeout must be a number of milliseconds, found '{value}'"
                        ))
                    })?;
                    opts.busy_timeout = Some(Duration::from_millis(millis));
                }
                "pooling" => {}
                other => return Err(config_error(format!("unsupported SQLite keyword '{other}'"))),
            }
        }

        if opts.path.is_empty() {
            if memory {
                ":memory:".clone_into(&mut opts.path);
            } else {
                return Err(config_error("connection string has no Data Source"));
            }
        }
        Ok(opts)
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, SqlCoordinatorError> {
    match normalize_key(value).as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(config_error(format!(
            "{} expects true or false, found '{value}'",
            key.trim()
        ))),
    }
}

fn config_error(message: impl Into<String>) -> SqlCoordinatorError {
    SqlCoordinatorError::ConfigurationError(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_paths_pass_through() {
        for raw in [":memory:", "data/app.db", "file:app.db?mode=ro"] {
            let opts = SqliteOptions::parse(raw).unwrap();
            assert_eq!(opts.path, raw);
            assert_eq!(opts.flags, OpenFlags::default());
        }
    }

    #[test]
    fn keyword_string_is_parsed() {
        let opts = SqliteOptions::parse(
            "Data Source=app.db; Mode=ReadOnly; Foreign Keys=True; Busy Timeout=250;",
        )
        .unwrap();
        assert_eq!(opts.path, "app.db");
        assert!(opts.flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY));
        assert!(!opts.flags.contains(OpenFlags::SQLITE_OPEN_CREATE));
        assert_eq!(opts.foreign_keys, Some(true));
        assert_eq!(opts.busy_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn memory_mode_needs_no_path() {
        let opts = SqliteOptions::parse("Mode=Memory;Cache=Shared").unwrap();
        assert_eq!(opts.path, ":memory:");
        assert!(opts.flags.contains(OpenFlags::SQLITE_OPEN_SHARED_CACHE));
    }

    #[test]
    fn malformed_strings_are_configuration_errors() {
        for raw in [
            "Mode=ReadOnly",
            "Data Source=a.db;Password=x",
            "Data Source=a.db;Foreign Keys=maybe",
            "Data Source=a.db;Busy Timeout=soon",
            "Data Source=a.db;junk",
        ] {
            assert!(
                matches!(
                    SqliteOptions::parse(raw),
                    Err(SqlCoordinatorError::ConfigurationError(_))
                ),
                "{raw} should be rejected"
            );
        }
    }
}
