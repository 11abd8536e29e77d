//! Cursor store trait for per-table batch sequence persistence.
//!
//! The [`CursorStore`] trait defines where the `LastSequence` high-water mark
//! of each table lives on one side:
//!
//! - **MSSQL**: `MssqlCursorStore` in `mssql_db.rs`, a settings table in the
//!   side's sync schema
//! - **Memory**: `MemoryCursorStore` in `memory.rs`, used by report-only
//!   runs and tests
//!
//! The orchestrator works with `Arc<dyn CursorStore>` without knowing the
//! concrete type.

use async_trait::async_trait;

use crate::error::Result;

/// Name of the cursor settings table inside a sync schema.
pub const SETTINGS_TABLE: &str = "CleanUpSettings";

/// Trait for cursor persistence backends.
///
/// Cursors are keyed by schema-qualified table name.
///
/// # Example
///
/// ```rust,ignore
/// let cursors: Arc<dyn CursorStore> = Arc::new(MssqlCursorStore::new(pool, "Sync"));
/// cursors.init_schema().await?;
/// let start = cursors.last_sequence("dbo.Customer").await?;
/// cursors.set_last_sequence("dbo.Customer", start + 1000).await?;
/// ```
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Create the settings storage if it does not exist.
    ///
    /// This must be idempotent.
    async fn init_schema(&self) -> Result<()>;

    /// Read the cursor for a table, creating it at 0 on first reference.
    async fn last_sequence(&self, table_name: &str) -> Result<i64>;

    /// Persist the cursor for a table.
    async fn set_last_sequence(&self, table_name: &str, sequence: i64) -> Result<()>;

    /// Reset the cursor for a table to 0.
    async fn reset(&self, table_name: &str) -> Result<()> {
        self.set_last_sequence(table_name, 0).await
    }

    /// Get the backend type name for logging/debugging.
    fn backend_type(&self) -> &'static str;
}
