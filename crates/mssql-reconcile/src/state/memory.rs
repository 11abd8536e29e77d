//! In-process cursor store.
//!
//! Report-only runs page through tables with this store so that nothing is
//! written to either database; every run starts every table at 0.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::state::backend::CursorStore;

/// Cursor store backed by a map.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursors: Mutex<HashMap<String, i64>>,
}

impl MemoryCursorStore {
    /// Create an empty cursor store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored cursors.
    pub async fn snapshot(&self) -> HashMap<String, i64> {
        self.cursors.lock().await.clone()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn last_sequence(&self, table_name: &str) -> Result<i64> {
        let mut cursors = self.cursors.lock().await;
        Ok(*cursors.entry(table_name.to_string()).or_insert(0))
    }

    async fn set_last_sequence(&self, table_name: &str, sequence: i64) -> Result<()> {
        self.cursors
            .lock()
            .await
            .insert(table_name.to_string(), sequence);
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
