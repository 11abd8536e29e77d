//! The relational store capability both sides implement.
//!
//! The reconciler never builds SQL text. It asks a [`RelationalStore`] for
//! typed operations (a numbered window of rows, a row by identity, a scalar
//! count or maximum, a write command) and each store renders them for its
//! own protocol. Every value crosses this boundary as a
//! `(name, DataType, SqlValue)` triple.
//!
//! Implementations:
//!
//! - `MssqlStore` in `drivers::mssql` (tiberius over a bb8 pool)
//! - `MemoryStore` in `drivers::memory` (in-process tables)

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::row::{ColumnValue, Row, SequencedRow};
use super::schema::{Column, DataType, Table};
use super::value::SqlValue;

/// A request for one window of a table's row numbering.
///
/// Rows are numbered 1..n in descending order of `ordering_keys` (in an
/// unspecified but per-call deterministic order when there are none) and
/// those with `start < n <= end` are returned.
#[derive(Debug, Clone, Copy)]
pub struct WindowRequest<'a> {
    /// Table to read.
    pub table: &'a Table,
    /// Columns to project, in order.
    pub columns: &'a [Column],
    /// Key columns that define the numbering.
    pub ordering_keys: &'a [String],
    /// Exclusive lower bound of the window.
    pub start: i64,
    /// Inclusive upper bound of the window.
    pub end: i64,
    /// Read without shared locks.
    pub no_lock: bool,
}

impl WindowRequest<'_> {
    /// Maximum number of rows the window can hold.
    pub fn size(&self) -> i64 {
        (self.end - self.start).max(0)
    }
}

/// A single-row write produced by the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCommand {
    /// Insert one row.
    Insert {
        table: Table,
        values: Vec<ColumnValue>,
    },

    /// Update the row matching `filter`, setting every assignment.
    Update {
        table: Table,
        assignments: Vec<ColumnValue>,
        filter: ColumnValue,
    },
}

impl WriteCommand {
    /// Table the command writes to.
    pub fn table(&self) -> &Table {
        match self {
            WriteCommand::Insert { table, .. } | WriteCommand::Update { table, .. } => table,
        }
    }

    /// Short description for logging.
    pub fn describe(&self) -> String {
        match self {
            WriteCommand::Insert { table, values } => {
                format!("INSERT {} ({} columns)", table.qualified_name(), values.len())
            }
            WriteCommand::Update {
                table,
                assignments,
                filter,
            } => format!(
                "UPDATE {} SET {} columns WHERE {} = {}",
                table.qualified_name(),
                assignments.len(),
                filter.name,
                filter.value
            ),
        }
    }
}

/// Operations a side must support to take part in reconciliation.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the orchestrator holds them as
/// `Arc<dyn RelationalStore>`.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Read one window of the table's row numbering.
    ///
    /// Returned rows carry exactly `request.columns` and their ordinal,
    /// sorted by ordinal.
    async fn read_window(&self, request: &WindowRequest<'_>) -> Result<Vec<SequencedRow>>;

    /// Read the row whose `guid_column` equals `guid`.
    async fn read_by_guid(
        &self,
        table: &Table,
        columns: &[Column],
        guid_column: &str,
        guid: Uuid,
    ) -> Result<Option<Row>>;

    /// Count rows whose `column` equals `value`.
    ///
    /// With `hold_lock` the read takes range locks so a concurrent writer
    /// cannot insert the value until the statement completes.
    async fn count_matching(
        &self,
        table: &Table,
        column: &Column,
        value: &SqlValue,
        hold_lock: bool,
    ) -> Result<i64>;

    /// Current maximum of `column`, read under range locks.
    async fn max_value(&self, table: &Table, column: &Column) -> Result<Option<SqlValue>>;

    /// Execute a write and return the number of affected rows.
    async fn execute(&self, command: &WriteCommand) -> Result<u64>;

    /// Whether READ_COMMITTED_SNAPSHOT is enabled on the database.
    ///
    /// When it is, plain reads are already non-blocking and the no-lock
    /// hint is not used.
    async fn read_committed_snapshot(&self) -> Result<bool>;

    /// Store type identifier (e.g., "mssql", "memory").
    fn store_type(&self) -> &'static str;

    /// Whether any row carries `guid` in `guid_column`.
    async fn guid_exists(&self, table: &Table, guid_column: &str, guid: Uuid) -> Result<bool> {
        let column = Column::new(guid_column, DataType::Guid);
        let count = self
            .count_matching(table, &column, &SqlValue::Uuid(guid), false)
            .await?;
        Ok(count > 0)
    }
}
