use rusqlite::Statement;
use rusqlite::types::Value;

use crate::error::SqlCoordinatorError;
use crate::params::{Parameter, strip_prefix};
use crate::types::{DbType, DbValue};

/// Convert a value to the storage class its declared type implies.
#[must_use]
pub fn to_sqlite_value(value: &DbValue, db_type: Option<DbType>) -> Value {
    match (value, db_type) {
        (DbValue::Null, _) => Value::Null,
        (DbValue::Int(i), Some(DbType::Bit)) => Value::Integer(i64::from(*i != 0)),
        #[allow(clippy::cast_precision_loss)]
        (DbValue::Int(i), Some(DbType::Real | DbType::Float | DbType::Decimal)) => {
            Value::Real(*i as f64)
        }
        (DbValue::Int(i), _) => Value::Integer(*i),
        (DbValue::Float(f), _) => Value::Real(*f),
        (DbValue::Text(s), _) => Value::Text(s.clone()),
        (DbValue::Bool(b), _) => Value::Integer(i64::from(*b)),
        (DbValue::Timestamp(dt), Some(DbType::Date)) => {
            Value::Text(dt.format("%Y-%m-%d").to_string())
        }
        (DbValue::Timestamp(dt), _) => Value::Text(dt.format("%F %T%.f").to_string()),
        (DbValue::Json(json), _) => Value::Text(json.to_string()),
        (DbValue::Blob(bytes), _) => Value::Blob(bytes.clone()),
    }
}

/// Bind every placeholder of `stmt` from `params`.
///
/// Named placeholders (`@id`, `:id`, `$id`) match a parameter with the same name, with or
/// without its prefix. Numbered (`?2`) and anonymous (`?`) placeholders bind by position.
///
/// # Errors
/// Returns `SqlCoordinatorError::DatabaseError` if a placeholder has no parameter, or if
/// `SQLite` rejects the binding.
pub fn bind_parameters(
    stmt: &mut Statement<'_>,
    params: &[Parameter],
) -> Result<(), SqlCoordinatorError> {
    for index in 1..=stmt.parameter_count() {
        let param = match stmt.parameter_name(index) {
            Some(name) if name.starts_with('?') => {
                let position = name[1..].parse::<usize>().unwrap_or(index);
                position.checked_sub(1).and_then(|i| params.get(i))
            }
            Some(name) => find_named(params, name),
            None => params.get(index - 1),
        };
        let Some(param) = param else {
            let label = stmt
                .parameter_name(index)
                .map_or_else(|| format!("?{index}"), ToOwned::to_owned);
            return Err(SqlCoordinatorError::database_message(format!(
                "no value supplied for placeholder {label}"
            )));
        };
        let value = to_sqlite_value(param.value(), Some(param.db_type()));
        stmt.raw_bind_parameter(index, value)
            .map_err(|e| super::database_error("bind parameter", e))?;
    }
    Ok(())
}

fn find_named<'a>(params: &'a [Parameter], placeholder: &str) -> Option<&'a Parameter> {
    let bare = strip_prefix(placeholder);
    params
        .iter()
        .find(|p| p.name() == placeholder || p.bare_name() == bare)
        .or_else(|| {
            params
                .iter()
                .find(|p| p.bare_name().eq_ignore_ascii_case(bare))
        })
}
