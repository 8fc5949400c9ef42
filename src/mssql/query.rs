use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::TryStreamExt;
use tiberius::{ColumnData, FromSql, QueryItem};

use crate::command::{Command, CommandOutcome, ResultShape};
use crate::error::SqlCoordinatorError;
use crate::results::ResultSet;
use crate::types::DbValue;

use super::client::MssqlClient;
use super::database_error;
use super::params::build_query;

/// Run a command and collect what `shape` asks for.
///
/// # Errors
/// Returns `SqlCoordinatorError::DatabaseError` if the server rejects the command or the
/// stream breaks; `InvalidArgument` if the command cannot be bound.
pub async fn run_command(
    client: &mut MssqlClient,
    command: &Command,
    shape: ResultShape,
) -> Result<CommandOutcome, SqlCoordinatorError> {
    let query = build_query(command)?;
    if shape == ResultShape::RowsAffected {
        let exec_result = query
            .execute(client)
            .await
            .map_err(|e| database_error("execute", e))?;
        let rows_affected: u64 = exec_result.rows_affected().iter().sum();
        return Ok(CommandOutcome {
            rows_affected,
            result_sets: Vec::new(),
        });
    }

    let stream = query
        .query(client)
        .await
        .map_err(|e| database_error("query", e))?;
    let result_sets = build_result_sets(stream, shape.max_result_sets()).await?;
    Ok(CommandOutcome {
        rows_affected: 0,
        result_sets,
    })
}

/// Drain a query stream into result sets, keeping at most `max_sets` of them.
///
/// The stream is always read to the end so later statements finish and their errors surface.
///
/// # Errors
/// Returns `SqlCoordinatorError::DatabaseError` on any stream error.
pub async fn build_result_sets(
    mut stream: tiberius::QueryStream<'_>,
    max_sets: usize,
) -> Result<Vec<ResultSet>, SqlCoordinatorError> {
    let mut result_sets: Vec<ResultSet> = Vec::new();
    let mut collecting = false;

    while let Some(item) = stream
        .try_next()
        .await
        .map_err(|e| database_error("row fetch", e))?
    {
        match item {
            QueryItem::Metadata(meta) => {
                collecting = result_sets.len() < max_sets;
                if collecting {
                    let column_names: Vec<String> =
                        meta.columns().iter().map(|col| col.name().to_string()).collect();
                    result_sets.push(ResultSet::with_columns(Arc::new(column_names), 10));
                }
            }
            QueryItem::Row(row) => {
                if !collecting {
                    continue;
                }
                let Some(result_set) = result_sets.last_mut() else {
                    continue;
                };
                let mut row_values = Vec::with_capacity(row.len());
                for data in row {
                    row_values.push(extract_value(&data)?);
                }
                result_set.add_row_values(row_values);
            }
        }
    }

    Ok(result_sets)
}

/// Convert one column value to a `DbValue`.
///
/// Dates and `datetime2` become timestamps; `time` and `datetimeoffset` are returned as ISO
/// text, `uniqueidentifier` as its hyphenated form and `decimal`/`numeric` as floats.
///
/// # Errors
/// Returns `SqlCoordinatorError::DatabaseError` if a temporal value is out of range.
pub fn extract_value(data: &ColumnData<'static>) -> Result<DbValue, SqlCoordinatorError> {
    let value = match data {
        ColumnData::U8(v) => v.map(|v| DbValue::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| DbValue::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| DbValue::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(DbValue::Int),
        ColumnData::F32(v) => v.map(|v| DbValue::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(DbValue::Float),
        ColumnData::Bit(v) => v.map(DbValue::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| DbValue::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| DbValue::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| DbValue::Blob(b.to_vec())),
        ColumnData::Numeric(v) => v.map(|n| DbValue::Float(f64::from(n))),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|xml| DbValue::Text(xml.clone().into_owned().into_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(data)
                .map_err(|e| database_error("datetime conversion", e))?
                .map(DbValue::Timestamp)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(data)
            .map_err(|e| database_error("date conversion", e))?
            .map(DbValue::from),
        ColumnData::Time(_) => NaiveTime::from_sql(data)
            .map_err(|e| database_error("time conversion", e))?
            .map(|t| DbValue::Text(t.format("%H:%M:%S%.f").to_string())),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(data)
            .map_err(|e| database_error("datetimeoffset conversion", e))?
            .map(|dt| DbValue::Text(dt.to_rfc3339())),
    };
    Ok(value.unwrap_or(DbValue::Null))
}
