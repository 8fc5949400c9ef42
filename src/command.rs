use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::SqlCoordinatorError;
use crate::params::{Parameter, ParameterSet};
use crate::results::ResultSet;
use crate::types::CommandKind;

/// A single execution request, built per call and dropped when the call returns.
///
/// Parameters are copied out of the caller's set, so the set can be mutated or reused
/// while (or after) the command runs.
#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub(crate) text: String,
    pub(crate) kind: CommandKind,
    pub(crate) parameters: Vec<Parameter>,
    pub(crate) timeout: Duration,
    /// Whether the coordinator had an active transaction when the command was built.
    pub(crate) in_transaction: bool,
}

impl Command {
    pub(crate) fn build(
        text: &str,
        kind: CommandKind,
        params: Option<&ParameterSet>,
        timeout: Duration,
        in_transaction: bool,
    ) -> Result<Self, SqlCoordinatorError> {
        if text.trim().is_empty() {
            return Err(SqlCoordinatorError::InvalidArgument(
                "command text must not be empty".into(),
            ));
        }
        let parameters = params
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        Ok(Command {
            text: text.to_owned(),
            kind,
            parameters,
            timeout,
            in_transaction,
        })
    }
}

/// How much of a command's output the caller wants back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResultShape {
    /// Only the affected-row count.
    RowsAffected,
    /// The first result set (also used for scalars).
    FirstResult,
    /// Every result set, in the order the database produced them.
    AllResults,
}

impl ResultShape {
    /// Upper bound on materialized result sets. Later statements still execute.
    pub(crate) fn max_result_sets(self) -> usize {
        match self {
            ResultShape::RowsAffected => 0,
            ResultShape::FirstResult => 1,
            ResultShape::AllResults => usize::MAX,
        }
    }
}

/// What a driver hands back for one command.
#[derive(Debug, Default)]
pub(crate) struct CommandOutcome {
    pub(crate) rows_affected: u64,
    pub(crate) result_sets: Vec<ResultSet>,
}

/// Set by the coordinator when a call outlives its timeout; blocking work polls it between
/// statements and rows.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DbType, DbValue};

    #[test]
    fn blank_text_is_rejected() {
        for text in ["", "  ", "\n"] {
            let err = Command::build(text, CommandKind::Text, None, Duration::from_secs(1), false)
                .unwrap_err();
            assert!(err.is_invalid_argument());
        }
    }

    #[test]
    fn parameters_are_copied() {
        let mut params = ParameterSet::new();
        params.add("@id", 1_i64, DbType::Int).unwrap();
        let command = Command::build(
            "SELECT @id",
            CommandKind::Text,
            Some(&params),
            Duration::from_secs(5),
            true,
        )
        .unwrap();

        params.clear();
        params.add("@id", 2_i64, DbType::Int).unwrap();

        assert_eq!(command.parameters.len(), 1);
        assert_eq!(command.parameters[0].value(), &DbValue::Int(1));
        assert!(command.in_transaction);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let worker = token.clone();
        assert!(!worker.is_cancelled());
        token.cancel();
        assert!(worker.is_cancelled());
    }
}
