use crate::error::SqlCoordinatorError;
use crate::types::{DbType, DbValue};

/// One named, typed command parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: DbValue,
    db_type: DbType,
    size: Option<usize>,
}

impl Parameter {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &DbValue {
        &self.value
    }

    #[must_use]
    pub fn db_type(&self) -> DbType {
        self.db_type
    }

    /// Maximum length for sized types; `None` means the widest form (`max`).
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    /// Name without its `@`, `:` or `$` prefix.
    #[must_use]
    pub fn bare_name(&self) -> &str {
        strip_prefix(&self.name)
    }
}

pub(crate) fn strip_prefix(name: &str) -> &str {
    name.strip_prefix(['@', ':', '$']).unwrap_or(name)
}

/// Ordered, named collection of command parameters.
///
/// Values are never spliced into SQL text: the coordinator copies each entry into a bound
/// driver parameter when it builds the command, so a set can be cleared and reused as soon
/// as the call returns.
///
/// ```rust
/// use sql_coordinator::prelude::*;
///
/// # fn demo() -> Result<(), SqlCoordinatorError> {
/// let mut params = ParameterSet::new();
/// params
///     .add("@id", 7_i64, DbType::Int)?
///     .add("@title", None::<String>, DbType::NVarChar)?;
/// assert_eq!(params.list()[1].value(), &DbValue::Null);
/// # Ok(()) }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    ///
    /// Duplicate names are not detected; they reach the driver as-is.
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::InvalidArgument` if `name` is empty or only whitespace.
    pub fn add(
        &mut self,
        name: &str,
        value: impl Into<DbValue>,
        db_type: DbType,
    ) -> Result<&mut Self, SqlCoordinatorError> {
        self.push(name, value.into(), db_type, None)
    }

    /// Append a parameter with an explicit size (length of a string or binary type).
    ///
    /// # Errors
    /// Returns `SqlCoordinatorError::InvalidArgument` if `name` is empty or only whitespace.
    pub fn add_with_size(
        &mut self,
        name: &str,
        value: impl Into<DbValue>,
        db_type: DbType,
        size: usize,
    ) -> Result<&mut Self, SqlCoordinatorError> {
        self.push(name, value.into(), db_type, Some(size))
    }

    fn push(
        &mut self,
        name: &str,
        value: DbValue,
        db_type: DbType,
        size: Option<usize>,
    ) -> Result<&mut Self, SqlCoordinatorError> {
        if name.trim().is_empty() {
            return Err(SqlCoordinatorError::InvalidArgument(
                "parameter name must not be empty".into(),
            ));
        }
        self.params.push(Parameter {
            name: name.to_owned(),
            value,
            db_type,
            size,
        });
        Ok(self)
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// Parameters in insertion order.
    #[must_use]
    pub fn list(&self) -> &[Parameter] {
        &self.params
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.params.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.params.iter()
    }
}
