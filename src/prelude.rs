//! Convenient imports for common functionality.
//!
//! `use sql_coordinator::prelude::*;` brings in the coordinators, their options and the
//! value types every call site needs.

pub use crate::blocking::BlockingCoordinator;
pub use crate::bulk::BulkLoadOptions;
pub use crate::config::{AppSettings, CoordinatorOptions};
pub use crate::coordinator::Coordinator;
pub use crate::error::SqlCoordinatorError;
pub use crate::params::ParameterSet;
pub use crate::results::{DbRow, ResultSet};
pub use crate::transaction::TransactionState;
pub use crate::types::{CommandKind, DatabaseType, DbType, DbValue};
