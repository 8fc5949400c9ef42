use std::fmt;

use thiserror::Error;

/// Boxed cause carried by the wrapping error variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Where a connection-level failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The driver reported the failure (network, authentication, SQLite open error, ...).
    Driver,
    /// The connection or transaction was not in a state that allows the operation.
    InvalidState,
    /// Anything else (a panicked worker, a runtime shutting down, ...).
    Unexpected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Driver => f.write_str("driver"),
            FailureKind::InvalidState => f.write_str("invalid state"),
            FailureKind::Unexpected => f.write_str("unexpected"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SqlCoordinatorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Connection error ({kind}): {message}")]
    ConnectionError {
        kind: FailureKind,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Database error{}: {message}", format_code(.code))]
    DatabaseError {
        code: Option<i64>,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Unexpected error: {message}")]
    UnexpectedError {
        message: String,
        #[source]
        source: BoxError,
    },
}

fn format_code(code: &Option<i64>) -> String {
    code.map(|c| format!(" [{c}]")).unwrap_or_default()
}

impl SqlCoordinatorError {
    pub(crate) fn connection(
        kind: FailureKind,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        SqlCoordinatorError::ConnectionError {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn connection_state(message: impl Into<String>) -> Self {
        SqlCoordinatorError::ConnectionError {
            kind: FailureKind::InvalidState,
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn database(
        code: Option<i64>,
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        SqlCoordinatorError::DatabaseError {
            code,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub(crate) fn database_message(message: impl Into<String>) -> Self {
        SqlCoordinatorError::DatabaseError {
            code: None,
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn unexpected(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        SqlCoordinatorError::UnexpectedError {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Native error code reported by the database, if any.
    ///
    /// SQL Server error numbers and SQLite extended result codes both land here.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        match self {
            SqlCoordinatorError::DatabaseError { code, .. } => *code,
            _ => None,
        }
    }

    /// True for the argument-validation failures raised before any driver call.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, SqlCoordinatorError::InvalidArgument(_))
    }
}

/// Worker join failures: the blocking task panicked or the runtime is shutting down.
impl From<tokio::task::JoinError> for SqlCoordinatorError {
    fn from(err: tokio::task::JoinError) -> Self {
        SqlCoordinatorError::unexpected("blocking worker failed", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_error_display_includes_code() {
        let err = SqlCoordinatorError::DatabaseError {
            code: Some(2627),
            message: "duplicate key".into(),
            source: None,
        };
        assert_eq!(err.to_string(), "Database error [2627]: duplicate key");
        assert_eq!(err.code(), Some(2627));

        let err = SqlCoordinatorError::database_message("timed out");
        assert_eq!(err.to_string(), "Database error: timed out");
        assert_eq!(err.code(), None);
    }

    #[test]
    fn connection_error_keeps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = SqlCoordinatorError::connection(FailureKind::Driver, "open failed", io);
        assert_eq!(err.to_string(), "Connection error (driver): open failed");
        let source = std::error::Error::source(&err).expect("cause preserved");
        assert_eq!(source.to_string(), "refused");
    }
}
