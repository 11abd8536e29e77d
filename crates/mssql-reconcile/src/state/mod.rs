//! Cursor persistence for batch paging.
//!
//! Each side keeps one `LastSequence` value per table. The fetcher reads it
//! before every window and advances it after a non-empty window; the
//! orchestrator resets it to 0 when a table is finished, so every run is a
//! full scan.

pub mod backend;
pub mod memory;
pub mod mssql_db;

pub use backend::{CursorStore, SETTINGS_TABLE};
pub use memory::MemoryCursorStore;
pub use mssql_db::MssqlCursorStore;
