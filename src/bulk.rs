use std::fmt;
use std::sync::Arc;

use crate::error::SqlCoordinatorError;
use crate::results::ResultSet;
use crate::types::DbValue;

/// Rows written per batch unless overridden.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Rows between progress notifications unless overridden.
pub const DEFAULT_NOTIFY_AFTER: u64 = 1000;

/// Receives the cumulative number of rows copied so far.
pub type ProgressCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Tuning and observation hooks for [`Coordinator::bulk_load`](crate::Coordinator::bulk_load).
#[derive(Clone)]
pub struct BulkLoadOptions {
    pub batch_size: usize,
    pub notify_after: u64,
    progress: Option<ProgressCallback>,
}

impl Default for BulkLoadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            notify_after: DEFAULT_NOTIFY_AFTER,
            progress: None,
        }
    }
}

impl fmt::Debug for BulkLoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkLoadOptions")
            .field("batch_size", &self.batch_size)
            .field("notify_after", &self.notify_after)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl BulkLoadOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_notify_after(mut self, notify_after: u64) -> Self {
        self.notify_after = notify_after;
        self
    }

    /// Observe progress. The callback runs on the thread doing the copy, so keep it short.
    #[must_use]
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    pub(crate) fn tracker(&self) -> ProgressTracker {
        ProgressTracker {
            callback: self.progress.clone(),
            notify_after: self.notify_after,
            last_notified: 0,
        }
    }
}

/// Fires the progress callback every `notify_after` rows and once more at the end.
pub(crate) struct ProgressTracker {
    callback: Option<ProgressCallback>,
    notify_after: u64,
    last_notified: u64,
}

impl ProgressTracker {
    pub(crate) fn row_copied(&mut self, copied: u64) {
        if self.notify_after > 0 && copied % self.notify_after == 0 {
            self.notify(copied);
        }
    }

    pub(crate) fn finish(&mut self, total: u64) {
        if total != self.last_notified {
            self.notify(total);
        }
    }

    fn notify(&mut self, copied: u64) {
        if let Some(callback) = &self.callback {
            callback(copied);
        }
        self.last_notified = copied;
    }
}

/// Owned copy of a bulk request, movable onto a worker thread.
#[derive(Debug, Clone)]
pub(crate) struct BulkPayload {
    pub(crate) table: String,
    pub(crate) columns: Vec<String>,
    pub(crate) rows: Vec<Vec<DbValue>>,
    pub(crate) batch_size: usize,
}

impl BulkPayload {
    /// Validate a request before any connection work happens.
    pub(crate) fn prepare(
        table: &str,
        rows: &ResultSet,
        options: &BulkLoadOptions,
    ) -> Result<Self, SqlCoordinatorError> {
        let table = table.trim();
        if table.is_empty() {
            return Err(SqlCoordinatorError::InvalidArgument(
                "destination table name must not be empty".into(),
            ));
        }
        if rows.is_empty() {
            return Err(SqlCoordinatorError::InvalidArgument(
                "bulk load requires at least one row".into(),
            ));
        }
        if rows.column_names().is_empty() {
            return Err(SqlCoordinatorError::InvalidArgument(
                "bulk load requires at least one column".into(),
            ));
        }
        if options.batch_size == 0 {
            return Err(SqlCoordinatorError::InvalidArgument(
                "batch size must be greater than zero".into(),
            ));
        }
        Ok(BulkPayload {
            table: table.to_owned(),
            columns: rows.column_names().to_vec(),
            rows: rows.iter().map(|row| row.values.clone()).collect(),
            batch_size: options.batch_size,
        })
    }

    pub(crate) fn row_count(&self) -> u64 {
        self.rows.len() as u64
    }
}
