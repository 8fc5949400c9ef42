use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SqlCoordinatorError;
use crate::types::DbValue;

/// A row from a database query result
///
/// This struct represents a single row from a database query result,
/// with access to both the column names and the values.
#[derive(Debug, Clone)]
pub struct DbRow {
    /// The column names for this row (shared across all rows in a result set)
    pub column_names: Arc<Vec<String>>,
    /// The values for this row
    pub values: Vec<DbValue>,
    column_index: Arc<HashMap<String, usize>>,
}

impl DbRow {
    /// Get the index of a column by name
    ///
    /// Exact matches win; otherwise the first case-insensitive match is used.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index.get(column_name) {
            return Some(idx);
        }

        self.column_names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }

    /// Get a value from the row by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&DbValue> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&DbValue> {
        self.values.get(index)
    }
}

/// An in-memory tabular result: ordered rows over named columns.
///
/// Also the input shape of [`Coordinator::bulk_load`](crate::Coordinator::bulk_load).
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<DbRow>,
    column_names: Arc<Vec<String>>,
    column_index: Arc<HashMap<String, usize>>,
}

impl ResultSet {
    /// Create an empty result set over the given columns.
    #[must_use]
    pub fn new<I, S>(column_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column_names: Vec<String> = column_names.into_iter().map(Into::into).collect();
        Self::with_columns(Arc::new(column_names), 0)
    }

    pub(crate) fn with_columns(column_names: Arc<Vec<String>>, capacity: usize) -> Self {
        let column_index = Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>(),
        );
        ResultSet {
            results: Vec::with_capacity(capacity),
            column_names,
            column_index,
        }
    }

    /// Get the column names for this result set
    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Append a row of values in column order.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::InvalidArgument` if the value count differs from the
    /// column count.
    pub fn push_row(&mut self, values: Vec<DbValue>) -> Result<(), SqlCoordinatorError> {
        if values.len() != self.column_names.len() {
            return Err(SqlCoordinatorError::InvalidArgument(format!(
                "row has {} values but the result set has {} columns",
                values.len(),
                self.column_names.len()
            )));
        }
        self.add_row_values(values);
        Ok(())
    }

    /// Add a row whose arity was already checked by the driver.
    pub(crate) fn add_row_values(&mut self, values: Vec<DbValue>) {
        self.results.push(DbRow {
            column_names: Arc::clone(&self.column_names),
            values,
            column_index: Arc::clone(&self.column_index),
        });
    }

    /// First value of the first row, if any.
    #[must_use]
    pub fn first_value(&self) -> Option<&DbValue> {
        self.results.first().and_then(|row| row.values.first())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DbRow> {
        self.results.iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a DbRow;
    type IntoIter = std::slice::Iter<'a, DbRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
