use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Values read from a row or bound as command parameters.
///
/// `Null` is the explicit database-null marker: parameter values that are absent on the
/// Rust side (`None`) are normalized to it before binding, and scalar reads that find no
/// row report it.
/// ```rust
/// use sql_coordinator::prelude::*;
///
/// let present: DbValue = Some(42_i64).into();
/// let absent: DbValue = None::<i64>.into();
/// assert_eq!(present, DbValue::Int(42));
/// assert!(absent.is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// NULL value
    Null,
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// JSON value
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl DbValue {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DbValue::Int(value) => Some(*value),
            DbValue::Bool(value) => Some(i64::from(*value)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            DbValue::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            DbValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let DbValue::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DbValue::Bool(value) => Some(*value),
            DbValue::Int(1) => Some(true),
            DbValue::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let DbValue::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS" with optional fraction
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
            // ISO-8601 with the `T` separator
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let DbValue::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let DbValue::Json(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// Short name of the variant, used in conversion error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Int(_) => "int",
            DbValue::Float(_) => "float",
            DbValue::Text(_) => "text",
            DbValue::Bool(_) => "bool",
            DbValue::Timestamp(_) => "timestamp",
            DbValue::Json(_) => "json",
            DbValue::Blob(_) => "blob",
        }
    }
}

impl From<i64> for DbValue {
    fn from(value: i64) -> Self {
        DbValue::Int(value)
    }
}

impl From<i32> for DbValue {
    fn from(value: i32) -> Self {
        DbValue::Int(i64::from(value))
    }
}

impl From<f64> for DbValue {
    fn from(value: f64) -> Self {
        DbValue::Float(value)
    }
}

impl From<bool> for DbValue {
    fn from(value: bool) -> Self {
        DbValue::Bool(value)
    }
}

impl From<String> for DbValue {
    fn from(value: String) -> Self {
        DbValue::Text(value)
    }
}

impl From<&str> for DbValue {
    fn from(value: &str) -> Self {
        DbValue::Text(value.to_owned())
    }
}

impl From<NaiveDateTime> for DbValue {
    fn from(value: NaiveDateTime) -> Self {
        DbValue::Timestamp(value)
    }
}

impl From<NaiveDate> for DbValue {
    fn from(value: NaiveDate) -> Self {
        DbValue::Timestamp(value.and_time(chrono::NaiveTime::MIN))
    }
}

impl From<JsonValue> for DbValue {
    fn from(value: JsonValue) -> Self {
        DbValue::Json(value)
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(value: Vec<u8>) -> Self {
        DbValue::Blob(value)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(DbValue::Null, Into::into)
    }
}

/// Declared database type of a command parameter.
///
/// SQL Server uses it to declare the bind variable; SQLite uses it to pick the storage class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    Bit,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Float,
    Decimal,
    Char,
    VarChar,
    NChar,
    NVarChar,
    Text,
    Date,
    DateTime,
    DateTime2,
    UniqueIdentifier,
    Binary,
    VarBinary,
    Json,
}

impl DbType {
    /// True for types whose `size` bounds a character or byte length.
    #[must_use]
    pub fn is_sized(self) -> bool {
        matches!(
            self,
            DbType::Char
                | DbType::VarChar
                | DbType::NChar
                | DbType::NVarChar
                | DbType::Binary
                | DbType::VarBinary
        )
    }
}

/// How the command text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// Plain SQL text (one or more statements).
    #[default]
    Text,
    /// Name of a stored procedure; parameters are passed by name.
    StoredProcedure,
}

/// The database engine a coordinator talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// `SQLite` database (embedded, via rusqlite)
    Sqlite,
    /// SQL Server database (via tiberius)
    Mssql,
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseType::Sqlite => f.write_str("sqlite"),
            DatabaseType::Mssql => f.write_str("mssql"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_none_becomes_null() {
        assert_eq!(DbValue::from(None::<String>), DbValue::Null);
        assert_eq!(DbValue::from(Some("x")), DbValue::Text("x".into()));
    }

    #[test]
    fn timestamp_parses_from_text() {
        let value = DbValue::Text("2024-01-01 08:00:01".into());
        let expected = NaiveDateTime::parse_from_str("2024-01-01 08:00:01", "%Y-%m-%d %H:%M:%S")
            .expect("valid timestamp");
        assert_eq!(value.as_timestamp(), Some(expected));

        let iso = DbValue::Text("2024-01-01T08:00:01.500".into());
        assert!(iso.as_timestamp().is_some());
    }

    #[test]
    fn bool_reads_from_integer_storage() {
        assert_eq!(DbValue::Int(1).as_bool(), Some(true));
        assert_eq!(DbValue::Int(0).as_bool(), Some(false));
        assert_eq!(DbValue::Int(7).as_bool(), None);
    }

    #[test]
    fn accessors_only_match_their_variant() {
        assert_eq!(DbValue::Int(3).as_int(), Some(3));
        assert_eq!(DbValue::Text("3".into()).as_int(), None);
        assert_eq!(DbValue::from(vec![1_u8, 2]).as_blob(), Some(&[1_u8, 2][..]));
        let json = DbValue::from(serde_json::json!({ "a": 1 }));
        assert_eq!(json.as_json().and_then(|v| v.get("a")), Some(&serde_json::json!(1)));
        assert!(DbType::NVarChar.is_sized());
        assert!(!DbType::Int.is_sized());
    }

    #[test]
    fn database_type_parses_case_insensitively() {
        assert_eq!(
            DatabaseType::from_str("MsSql", true).expect("parses"),
            DatabaseType::Mssql
        );
        assert!(DatabaseType::from_str("oracle", true).is_err());
    }
}
