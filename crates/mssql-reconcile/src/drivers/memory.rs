//! In-process [`RelationalStore`].
//!
//! Tables are plain row vectors behind a tokio mutex. Window numbering,
//! identity assignment and lookups follow SQL Server semantics closely
//! enough for the reconciler; locking hints are accepted and ignored.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::row::{ColumnValue, Row, SequencedRow};
use crate::core::schema::{Column, Table};
use crate::core::traits::{RelationalStore, WindowRequest, WriteCommand};
use crate::core::value::SqlValue;
use crate::error::{ReconcileError, Result};

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl MemoryTable {
    fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Shape a row to the table's columns; absent values become typed NULLs.
    fn normalize(&self, row: &Row) -> Row {
        Row::new(
            self.columns
                .iter()
                .map(|c| {
                    let value = row
                        .value(&c.name)
                        .cloned()
                        .unwrap_or(SqlValue::Null(c.data_type));
                    ColumnValue::new(c.name.clone(), c.data_type, value)
                })
                .collect(),
        )
    }

    fn next_identity(&self, column: &Column) -> Result<SqlValue> {
        let max = self
            .rows
            .iter()
            .filter_map(|r| r.value(&column.name).and_then(SqlValue::as_i64))
            .max()
            .unwrap_or(0);
        SqlValue::integer(column.data_type, max + 1).ok_or_else(|| {
            ReconcileError::metadata(format!(
                "identity column {} cannot hold {}",
                column.name,
                max + 1
            ))
        })
    }
}

/// An in-process store holding a set of tables.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    tables: Mutex<HashMap<Table, MemoryTable>>,
    mutations: AtomicU64,
    read_committed_snapshot: bool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Mutex::new(HashMap::new()),
            mutations: AtomicU64::new(0),
            read_committed_snapshot: false,
        }
    }

    /// Report READ_COMMITTED_SNAPSHOT as enabled.
    pub fn with_read_committed_snapshot(mut self, enabled: bool) -> Self {
        self.read_committed_snapshot = enabled;
        self
    }

    /// Store name, for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create (or replace) a table.
    pub async fn create_table(&self, table: Table, columns: Vec<Column>) {
        self.tables.lock().await.insert(
            table,
            MemoryTable {
                columns,
                rows: Vec::new(),
            },
        );
    }

    /// Load rows as-is, identity values included. Not counted as a mutation.
    pub async fn seed(&self, table: &Table, rows: Vec<Row>) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let t = tables.get_mut(table).ok_or_else(|| missing_table(table))?;
        for row in rows {
            let row = t.normalize(&row);
            t.rows.push(row);
        }
        Ok(())
    }

    /// Snapshot of a table's rows in storage order.
    pub async fn rows(&self, table: &Table) -> Result<Vec<Row>> {
        let tables = self.tables.lock().await;
        let t = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(t.rows.clone())
    }

    /// Number of write commands that changed at least one row.
    pub fn mutations(&self) -> u64 {
        self.mutations.load(AtomicOrdering::SeqCst)
    }
}

fn missing_table(table: &Table) -> ReconcileError {
    ReconcileError::metadata(format!("Invalid object name '{}'", table.qualified_name()))
}

fn project(row: &Row, columns: &[Column]) -> Row {
    Row::new(
        columns
            .iter()
            .map(|c| {
                let value = row
                    .value(&c.name)
                    .cloned()
                    .unwrap_or(SqlValue::Null(c.data_type));
                ColumnValue::new(c.name.clone(), c.data_type, value)
            })
            .collect(),
    )
}

fn compare_desc(a: &Row, b: &Row, keys: &[String]) -> Ordering {
    for key in keys {
        let ordering = match (a.value(key), b.value(key)) {
            (Some(x), Some(y)) => y.sort_cmp(x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl RelationalStore for MemoryStore {
    async fn read_window(&self, request: &WindowRequest<'_>) -> Result<Vec<SequencedRow>> {
        let tables = self.tables.lock().await;
        let t = tables
            .get(request.table)
            .ok_or_else(|| missing_table(request.table))?;

        let mut ordered: Vec<&Row> = t.rows.iter().collect();
        if !request.ordering_keys.is_empty() {
            ordered.sort_by(|a, b| compare_desc(a, b, request.ordering_keys));
        }

        Ok(ordered
            .into_iter()
            .enumerate()
            .map(|(i, row)| (i as i64 + 1, row))
            .filter(|(seq, _)| *seq > request.start && *seq <= request.end)
            .map(|(sequence, row)| SequencedRow {
                sequence,
                row: project(row, request.columns),
            })
            .collect())
    }

    async fn read_by_guid(
        &self,
        table: &Table,
        columns: &[Column],
        guid_column: &str,
        guid: Uuid,
    ) -> Result<Option<Row>> {
        let tables = self.tables.lock().await;
        let t = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(t
            .rows
            .iter()
            .find(|r| r.guid(guid_column) == Some(guid))
            .map(|r| project(r, columns)))
    }

    async fn count_matching(
        &self,
        table: &Table,
        column: &Column,
        value: &SqlValue,
        _hold_lock: bool,
    ) -> Result<i64> {
        let tables = self.tables.lock().await;
        let t = tables.get(table).ok_or_else(|| missing_table(table))?;
        if t.column(&column.name).is_none() {
            return Err(ReconcileError::metadata(format!(
                "Invalid column name '{}'",
                column.name
            )));
        }

        let count = t
            .rows
            .iter()
            .filter(|r| match r.value(&column.name) {
                Some(v) if value.is_null() => v.is_null(),
                Some(v) => !v.is_null() && v.equivalent(value),
                None => false,
            })
            .count();
        Ok(count as i64)
    }

    async fn max_value(&self, table: &Table, column: &Column) -> Result<Option<SqlValue>> {
        let tables = self.tables.lock().await;
        let t = tables.get(table).ok_or_else(|| missing_table(table))?;
        Ok(t
            .rows
            .iter()
            .filter_map(|r| r.value(&column.name))
            .filter(|v| !v.is_null())
            .max_by(|a, b| a.sort_cmp(b))
            .cloned())
    }

    async fn execute(&self, command: &WriteCommand) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let table = command.table();
        let t = tables.get_mut(table).ok_or_else(|| missing_table(table))?;

        let affected = match command {
            WriteCommand::Insert { values, .. } => {
                let mut row = Row::default();
                for value in values {
                    let column = t.column(&value.name).ok_or_else(|| {
                        ReconcileError::metadata(format!("Invalid column name '{}'", value.name))
                    })?;
                    if column.is_auto_number {
                        return Err(ReconcileError::metadata(format!(
                            "Cannot insert explicit value for identity column '{}'",
                            column.name
                        )));
                    }
                    row = row.with(column.name.clone(), value.value.clone());
                }
                for column in t.columns.iter().filter(|c| c.is_auto_number) {
                    let identity = t.next_identity(column)?;
                    row = row.with(column.name.clone(), identity);
                }
                let row = t.normalize(&row);
                t.rows.push(row);
                1
            }
            WriteCommand::Update {
                assignments,
                filter,
                ..
            } => {
                for assignment in assignments {
                    if t.column(&assignment.name).is_none() {
                        return Err(ReconcileError::metadata(format!(
                            "Invalid column name '{}'",
                            assignment.name
                        )));
                    }
                }

                let mut affected = 0;
                for row in t.rows.iter_mut() {
                    let matches = row
                        .value(&filter.name)
                        .is_some_and(|v| !v.is_null() && v.equivalent(&filter.value));
                    if !matches {
                        continue;
                    }
                    let updated = Row::new(
                        row.iter()
                            .map(|cv| {
                                match assignments
                                    .iter()
                                    .find(|a| a.name.eq_ignore_ascii_case(&cv.name))
                                {
                                    Some(a) => ColumnValue::new(
                                        cv.name.clone(),
                                        cv.data_type,
                                        a.value.clone(),
                                    ),
                                    None => cv.clone(),
                                }
                            })
                            .collect(),
                    );
                    *row = updated;
                    affected += 1;
                }
                affected
            }
        };

        if affected > 0 {
            self.mutations.fetch_add(1, AtomicOrdering::SeqCst);
        }
        Ok(affected)
    }

    async fn read_committed_snapshot(&self) -> Result<bool> {
        Ok(self.read_committed_snapshot)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
