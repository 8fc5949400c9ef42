use std::sync::Arc;

use rusqlite::types::Value;
use rusqlite::{Batch, Connection, Statement};

use crate::command::{CancelToken, CommandOutcome, ResultShape};
use crate::error::SqlCoordinatorError;
use crate::params::Parameter;
use crate::results::ResultSet;
use crate::types::DbValue;

use super::database_error;
use super::params::bind_parameters;

/// Extract a `DbValue` from a `SQLite` row.
///
/// # Errors
///
/// Returns `SqlCoordinatorError` if the value cannot be read.
pub fn sqlite_extract_value_sync(
    row: &rusqlite::Row,
    idx: usize,
) -> Result<DbValue, SqlCoordinatorError> {
    let value: Value = row.get(idx).map_err(|e| database_error("read column", e))?;
    match value {
        Value::Null => Ok(DbValue::Null),
        Value::Integer(i) => Ok(DbValue::Int(i)),
        Value::Real(f) => Ok(DbValue::Float(f)),
        Value::Text(s) => Ok(DbValue::Text(s)),
        Value::Blob(b) => Ok(DbValue::Blob(b)),
    }
}

/// Build a result set from a statement whose parameters are already bound.
///
/// # Errors
/// Returns `SqlCoordinatorError::DatabaseError` if stepping the statement fails.
pub fn build_result_set(
    stmt: &mut Statement<'_>,
    cancel: &CancelToken,
) -> Result<ResultSet, SqlCoordinatorError> {
    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let col_count = column_names.len();
    let mut result_set = ResultSet::with_columns(Arc::new(column_names), 10);

    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().map_err(|e| database_error("query", e))? {
        if cancel.is_cancelled() {
            return Err(interrupted());
        }
        let mut row_values = Vec::with_capacity(col_count);
        for i in 0..col_count {
            row_values.push(sqlite_extract_value_sync(row, i)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// Run every statement in `sql`, in order, on one connection.
///
/// Statements that produce columns contribute a result set until `shape` has enough; the
/// rest are stepped to completion without materializing rows. The affected-row count sums
/// the changes of every statement that modified the database.
///
/// # Errors
/// Returns `SqlCoordinatorError::DatabaseError` for prepare, bind or step failures. Earlier
/// statements in the batch are not undone.
pub fn run_batch(
    conn: &Connection,
    sql: &str,
    params: &[Parameter],
    shape: ResultShape,
    cancel: &CancelToken,
) -> Result<CommandOutcome, SqlCoordinatorError> {
    let mut outcome = CommandOutcome::default();
    let max_sets = shape.max_result_sets();
    let mut batch = Batch::new(conn, sql);

    while let Some(mut stmt) = batch.next().map_err(|e| database_error("prepare", e))? {
        if cancel.is_cancelled() {
            return Err(interrupted());
        }
        bind_parameters(&mut stmt, params)?;
        let before = conn.total_changes();

        if stmt.column_count() == 0 {
            let changed = stmt.raw_execute().map_err(|e| database_error("execute", e))?;
            if conn.total_changes() != before {
                outcome.rows_affected += changed as u64;
            }
            continue;
        }

        if outcome.result_sets.len() < max_sets {
            let result_set = build_result_set(&mut stmt, cancel)?;
            outcome.result_sets.push(result_set);
        } else {
            let mut rows = stmt.raw_query();
            while rows.next().map_err(|e| database_error("query", e))?.is_some() {
                if cancel.is_cancelled() {
                    return Err(interrupted());
                }
            }
        }
        // INSERT ... RETURNING and friends
        if conn.total_changes() != before {
            outcome.rows_affected += conn.changes();
        }
    }

    Ok(outcome)
}

fn interrupted() -> SqlCoordinatorError {
    SqlCoordinatorError::database_message("statement cancelled")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterSet;
    use crate::types::DbType;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT);")
            .unwrap();
        conn
    }

    #[test]
    fn ddl_reports_zero_rows() {
        let conn = setup();
        conn.execute("INSERT INTO t (name) VALUES ('a')", []).unwrap();
        let outcome = run_batch(
            &conn,
            "CREATE TABLE u (x INTEGER)",
            &[],
            ResultShape::RowsAffected,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.rows_affected, 0);
    }

    #[test]
    fn batch_sums_changes_and_collects_sets_in_order() {
        let conn = setup();
        let mut params = ParameterSet::new();
        params.add("@name", "b", DbType::NVarChar).unwrap();
        let outcome = run_batch(
            &conn,
            "INSERT INTO t (name) VALUES ('a'); INSERT INTO t (name) VALUES (@name);
             SELECT COUNT(*) AS n FROM t; SELECT name FROM t ORDER BY id;",
            params.list(),
            ResultShape::AllResults,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.rows_affected, 2);
        assert_eq!(outcome.result_sets.len(), 2);
        assert_eq!(outcome.result_sets[0].first_value(), Some(&DbValue::Int(2)));
        assert_eq!(outcome.result_sets[1].column_names(), ["name".to_string()]);
        assert_eq!(outcome.result_sets[1].len(), 2);
    }

    #[test]
    fn first_result_shape_still_runs_later_statements() {
        let conn = setup();
        let outcome = run_batch(
            &conn,
            "SELECT 1; INSERT INTO t (name) VALUES ('late');",
            &[],
            ResultShape::FirstResult,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(outcome.result_sets.len(), 1);
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn cancelled_token_stops_before_the_first_statement() {
        let conn = setup();
        let token = CancelToken::new();
        token.cancel();
        let err = run_batch(
            &conn,
            "INSERT INTO t (name) VALUES ('x')",
            &[],
            ResultShape::RowsAffected,
            &token,
        )
        .unwrap_err();
        assert!(matches!(err, SqlCoordinatorError::DatabaseError { .. }));
    }
}
