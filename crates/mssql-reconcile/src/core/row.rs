//! Rows read from one side at one moment.

use uuid::Uuid;

use super::schema::DataType;
use super::value::SqlValue;

/// A named, typed column value.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue {
    pub name: String,
    pub data_type: DataType,
    pub value: SqlValue,
}

impl ColumnValue {
    pub fn new(name: impl Into<String>, data_type: DataType, value: SqlValue) -> Self {
        Self {
            name: name.into(),
            data_type,
            value,
        }
    }
}

/// An ordered set of column values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<ColumnValue>,
}

impl Row {
    pub fn new(values: Vec<ColumnValue>) -> Self {
        Self { values }
    }

    /// Append a value, typed from the value itself.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        self.values
            .push(ColumnValue::new(name, value.data_type(), value));
        self
    }

    /// Look up a column (names compare case-insensitively, as on SQL Server).
    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.values
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name))
    }

    /// Look up a column value.
    pub fn value(&self, name: &str) -> Option<&SqlValue> {
        self.get(name).map(|v| &v.value)
    }

    /// Row identity read from `column`; `None` if absent or NULL.
    pub fn guid(&self, column: &str) -> Option<Uuid> {
        self.value(column).and_then(SqlValue::as_uuid)
    }

    /// Row version read from `column`; `None` if absent or NULL.
    pub fn version(&self, column: &str) -> Option<i64> {
        self.value(column).and_then(SqlValue::as_i64)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoIterator for Row {
    type Item = ColumnValue;
    type IntoIter = std::vec::IntoIter<ColumnValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// A row paired with its ordinal in the current window numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct SequencedRow {
    pub sequence: i64,
    pub row: Row,
}
