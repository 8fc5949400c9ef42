use std::fmt;

/// Transaction state of a coordinator.
///
/// `Active` is the only state commit and rollback act on; from any other state they are
/// deliberate no-ops. `Committed` and `RolledBack` record how the last transaction ended
/// and, like `None`, allow a new one to begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    None,
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::None => f.write_str("none"),
            TransactionState::Active => f.write_str("active"),
            TransactionState::Committed => f.write_str("committed"),
            TransactionState::RolledBack => f.write_str("rolled back"),
        }
    }
}
