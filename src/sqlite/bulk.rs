use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::bulk::{BulkPayload, ProgressTracker};
use crate::command::CancelToken;
use crate::error::SqlCoordinatorError;

use super::database_error;
use super::params::to_sqlite_value;

const SAVEPOINT: &str = "sql_coordinator_bulk_load";

/// Quote an identifier, keeping a schema prefix (`main.t`) as separate parts.
pub(crate) fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| {
            let part = part.trim();
            if part.starts_with('"') && part.ends_with('"') && part.len() > 1 {
                part.to_owned()
            } else {
                format!("\"{}\"", part.replace('"', "\"\""))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        quote_identifier(table)
    )
}

/// Insert every payload row through one cached statement, one savepoint per batch.
///
/// Outside a transaction each released savepoint commits its batch, so completed batches
/// survive a later failure. Inside one, the batches join it.
///
/// # Errors
/// Returns `SqlCoordinatorError::DatabaseError` on the first failing row; that row's batch is
/// rolled back to its savepoint.
pub fn bulk_insert(
    conn: &Connection,
    payload: &BulkPayload,
    tracker: &mut ProgressTracker,
    cancel: &CancelToken,
) -> Result<u64, SqlCoordinatorError> {
    let sql = insert_sql(&payload.table, &payload.columns);
    let mut stmt = conn
        .prepare_cached(&sql)
        .map_err(|e| database_error("prepare bulk insert", e))?;

    let mut copied: u64 = 0;
    for batch in payload.rows.chunks(payload.batch_size) {
        conn.execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))
            .map_err(|e| database_error("begin bulk batch", e))?;

        let written = batch.iter().try_for_each(|row| {
            if cancel.is_cancelled() {
                return Err(SqlCoordinatorError::database_message("bulk load cancelled"));
            }
            let values = row.iter().map(|v| to_sqlite_value(v, None));
            stmt.execute(params_from_iter(values))
                .map_err(|e| database_error("bulk insert row", e))?;
            copied += 1;
            tracker.row_copied(copied);
            Ok(())
        });

        if let Err(err) = written {
            // the savepoint has to be released even after rolling back to it
            if let Err(cleanup) =
                conn.execute_batch(&format!("ROLLBACK TO {SAVEPOINT}; RELEASE {SAVEPOINT};"))
            {
                debug!("releasing bulk savepoint after a failed batch failed: {cleanup}");
            }
            return Err(err);
        }
        conn.execute_batch(&format!("RELEASE {SAVEPOINT}"))
            .map_err(|e| database_error("commit bulk batch", e))?;
    }

    tracker.finish(copied);
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted_per_part() {
        assert_eq!(quote_identifier("main.items"), "\"main\".\"items\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_identifier("\"done\""), "\"done\"");
        assert_eq!(
            insert_sql("t", &["a".into(), "b".into()]),
            "INSERT INTO \"t\" (\"a\", \"b\") VALUES (?1, ?2)"
        );
    }
}
