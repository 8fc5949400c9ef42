use std::sync::LazyLock;

use regex::Regex;
use tiberius::{Query, Uuid};

use crate::command::Command;
use crate::error::SqlCoordinatorError;
use crate::params::Parameter;
use crate::types::{CommandKind, DbType, DbValue};

static PARAMETER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[@:$]?[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Turn a command into a tiberius query. User values only ever travel as RPC parameters.
///
/// Text commands with parameters go through a nested `sp_executesql` so the caller's own
/// `@name` placeholders are declared with their `DbType`: `@P1` carries the SQL text, `@P2`
/// the declaration list and `@P3..` the values. Stored procedures are called by their
/// quoted name with `@name = @Pn` arguments.
///
/// # Errors
/// Returns `SqlCoordinatorError::InvalidArgument` for bad parameter or procedure names and
/// unconvertible values.
pub(crate) fn build_query(command: &Command) -> Result<Query<'static>, SqlCoordinatorError> {
    let params = &command.parameters;
    let mut query = match command.kind {
        CommandKind::Text if params.is_empty() => return Ok(Query::new(command.text.clone())),
        CommandKind::Text => {
            let (sql, declarations) = text_call(params)?;
            let mut query = Query::new(sql);
            query.bind(command.text.clone());
            query.bind(declarations);
            query
        }
        CommandKind::StoredProcedure => Query::new(procedure_call(&command.text, params)?),
    };
    for param in params {
        bind_value(&mut query, param)?;
    }
    Ok(query)
}

/// `@name` as SQL Server needs it, after checking the name is a plain identifier.
///
/// # Errors
/// Returns `SqlCoordinatorError::InvalidArgument` for names that are not identifiers.
pub fn server_name(param: &Parameter) -> Result<String, SqlCoordinatorError> {
    if !PARAMETER_NAME.is_match(param.name()) {
        return Err(SqlCoordinatorError::InvalidArgument(format!(
            "parameter name '{}' is not a valid SQL Server identifier",
            param.name()
        )));
    }
    Ok(format!("@{}", param.bare_name()))
}

/// Declared type for the `sp_executesql` parameter list.
#[must_use]
pub fn declared_type(param: &Parameter) -> String {
    let size = param.size().filter(|n| *n > 0);
    let value_len = match param.value() {
        DbValue::Text(s) => s.chars().count(),
        DbValue::Blob(b) => b.len(),
        _ => 1,
    };
    let fixed = |limit: usize| size.unwrap_or(value_len).clamp(1, limit);
    let var = |name: &str, limit: usize| match size {
        Some(n) if n <= limit => format!("{name}({n})"),
        _ => format!("{name}(max)"),
    };
    match param.db_type() {
        DbType::Bit => "bit".into(),
        DbType::TinyInt => "tinyint".into(),
        DbType::SmallInt => "smallint".into(),
        DbType::Int => "int".into(),
        DbType::BigInt => "bigint".into(),
        DbType::Real => "real".into(),
        DbType::Float => "float".into(),
        DbType::Decimal => "decimal(38, 10)".into(),
        DbType::Char => format!("char({})", fixed(8000)),
        DbType::NChar => format!("nchar({})", fixed(4000)),
        DbType::Binary => format!("binary({})", fixed(8000)),
        DbType::VarChar => var("varchar", 8000),
        DbType::NVarChar => var("nvarchar", 4000),
        DbType::VarBinary => var("varbinary", 8000),
        DbType::Text | DbType::Json => "nvarchar(max)".into(),
        DbType::Date => "date".into(),
        DbType::DateTime => "datetime".into(),
        DbType::DateTime2 => "datetime2".into(),
        DbType::UniqueIdentifier => "uniqueidentifier".into(),
    }
}

/// Quote a possibly schema-qualified object name: `dbo.Load Items` becomes
/// `[dbo].[Load Items]`.
///
/// # Errors
/// Returns `SqlCoordinatorError::InvalidArgument` if any part is empty.
pub fn quote_object_name(name: &str) -> Result<String, SqlCoordinatorError> {
    let mut quoted = Vec::new();
    for part in name.trim().split('.') {
        let part = part.trim();
        let part = part
            .strip_prefix('[')
            .and_then(|p| p.strip_suffix(']'))
            .unwrap_or(part);
        if part.is_empty() {
            return Err(SqlCoordinatorError::InvalidArgument(format!(
                "'{name}' is not a valid object name"
            )));
        }
        quoted.push(format!("[{}]", part.replace(']', "]]")));
    }
    Ok(quoted.join("."))
}

/// `EXEC sp_executesql` text and declaration list for a parameterized text command.
fn text_call(params: &[Parameter]) -> Result<(String, String), SqlCoordinatorError> {
    let mut declarations = Vec::with_capacity(params.len());
    let mut assignments = Vec::with_capacity(params.len());
    for (i, param) in params.iter().enumerate() {
        let name = server_name(param)?;
        declarations.push(format!("{name} {}", declared_type(param)));
        assignments.push(format!("{name} = @P{}", i + 3));
    }
    Ok((
        format!("EXEC sp_executesql @P1, @P2, {}", assignments.join(", ")),
        declarations.join(", "),
    ))
}

fn procedure_call(procedure: &str, params: &[Parameter]) -> Result<String, SqlCoordinatorError> {
    let mut sql = format!("EXEC {}", quote_object_name(procedure)?);
    for (i, param) in params.iter().enumerate() {
        let separator = if i == 0 { " " } else { ", " };
        sql.push_str(&format!("{separator}{} = @P{}", server_name(param)?, i + 1));
    }
    Ok(sql)
}

/// Bind one value, typed after its declared type so NULLs carry the right wire type.
///
/// # Errors
/// Returns `SqlCoordinatorError::InvalidArgument` if a `UniqueIdentifier` value is not a UUID.
pub fn bind_value(query: &mut Query<'_>, param: &Parameter) -> Result<(), SqlCoordinatorError> {
    match (param.db_type(), param.value()) {
        (DbType::Bit, DbValue::Null) => query.bind(Option::<bool>::None),
        (DbType::Bit, DbValue::Int(i)) => query.bind(*i != 0),
        (DbType::TinyInt | DbType::SmallInt | DbType::Int | DbType::BigInt, DbValue::Null) => {
            query.bind(Option::<i64>::None);
        }
        (DbType::Real | DbType::Float | DbType::Decimal, DbValue::Null) => {
            query.bind(Option::<f64>::None);
        }
        #[allow(clippy::cast_precision_loss)]
        (DbType::Real | DbType::Float | DbType::Decimal, DbValue::Int(i)) => query.bind(*i as f64),
        (DbType::Date | DbType::DateTime | DbType::DateTime2, DbValue::Null) => {
            query.bind(Option::<chrono::NaiveDateTime>::None);
        }
        (DbType::UniqueIdentifier, DbValue::Null) => query.bind(Option::<Uuid>::None),
        (DbType::UniqueIdentifier, DbValue::Text(s)) => query.bind(parse_uuid(param, s)?),
        (DbType::UniqueIdentifier, DbValue::Blob(b)) => {
            let uuid = Uuid::from_slice(b).map_err(|e| uuid_error(param, &e.to_string()))?;
            query.bind(uuid);
        }
        (DbType::Binary | DbType::VarBinary, DbValue::Null) => query.bind(Option::<Vec<u8>>::None),
        (DbType::Binary | DbType::VarBinary, DbValue::Text(s)) => query.bind(s.as_bytes().to_vec()),
        (_, value) => bind_by_value(query, value),
    }
    Ok(())
}

fn bind_by_value(query: &mut Query<'_>, value: &DbValue) {
    match value {
        DbValue::Null => query.bind(Option::<String>::None),
        DbValue::Int(i) => query.bind(*i),
        DbValue::Float(f) => query.bind(*f),
        DbValue::Text(s) => query.bind(s.clone()),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Timestamp(dt) => query.bind(*dt),
        DbValue::Json(json) => query.bind(json.to_string()),
        DbValue::Blob(bytes) => query.bind(bytes.clone()),
    }
}

fn parse_uuid(param: &Parameter, text: &str) -> Result<Uuid, SqlCoordinatorError> {
    Uuid::parse_str(text.trim()).map_err(|e| uuid_error(param, &e.to_string()))
}

fn uuid_error(param: &Parameter, detail: &str) -> SqlCoordinatorError {
    SqlCoordinatorError::InvalidArgument(format!(
        "parameter '{}' is not a valid uniqueidentifier: {detail}",
        param.name()
    ))
}
