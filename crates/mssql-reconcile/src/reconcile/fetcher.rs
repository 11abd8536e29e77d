//! Cursor-driven batch windows over one side of a table map.

use tracing::debug;

use crate::core::row::Row;
use crate::core::schema::{Column, Table};
use crate::core::traits::{RelationalStore, WindowRequest};
use crate::error::Result;
use crate::state::CursorStore;

/// Whether window reads may use the no-lock hint.
///
/// Under READ_COMMITTED_SNAPSHOT plain reads already avoid shared locks, so
/// the hint is only used when snapshot isolation is off.
pub fn use_no_lock(allow_no_lock: bool, read_committed_snapshot: bool) -> bool {
    allow_no_lock && !read_committed_snapshot
}

/// One fetched window.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Rows in window order.
    pub rows: Vec<Row>,
    /// Cursor value the window started after.
    pub start: i64,
    /// Highest ordinal returned, `None` when the window was empty.
    pub last_sequence: Option<i64>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Reads consecutive windows of a table, persisting progress in a cursor store.
pub struct BatchFetcher<'a> {
    store: &'a dyn RelationalStore,
    cursors: &'a dyn CursorStore,
    batch_size: usize,
    no_lock: bool,
}

impl<'a> BatchFetcher<'a> {
    pub fn new(
        store: &'a dyn RelationalStore,
        cursors: &'a dyn CursorStore,
        batch_size: usize,
        no_lock: bool,
    ) -> Self {
        Self {
            store,
            cursors,
            batch_size,
            no_lock,
        }
    }

    /// Fetch the window after the table's cursor and advance the cursor.
    ///
    /// The cursor is keyed by `table.qualified_name()` and created at 0 on
    /// first use. An empty window leaves it unchanged.
    pub async fn fetch(
        &self,
        table: &Table,
        columns: &[Column],
        ordering_keys: &[String],
    ) -> Result<Batch> {
        let cursor_key = table.qualified_name();
        let start = self.cursors.last_sequence(&cursor_key).await?;
        let end = start.saturating_add(self.batch_size as i64);

        let request = WindowRequest {
            table,
            columns,
            ordering_keys,
            start,
            end,
            no_lock: self.no_lock,
        };
        let sequenced = self.store.read_window(&request).await?;

        let last_sequence = sequenced.iter().map(|r| r.sequence).max();
        if let Some(last) = last_sequence {
            self.cursors.set_last_sequence(&cursor_key, last).await?;
        }

        debug!(
            "{}: window ({}, {}] returned {} rows",
            cursor_key,
            start,
            end,
            sequenced.len()
        );

        Ok(Batch {
            rows: sequenced.into_iter().map(|r| r.row).collect(),
            start,
            last_sequence,
        })
    }

    /// Reset the table's cursor to 0.
    pub async fn reset(&self, table: &Table) -> Result<()> {
        self.cursors.reset(&table.qualified_name()).await
    }
}
