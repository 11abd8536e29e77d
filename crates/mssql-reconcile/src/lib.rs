//! # mssql-reconcile
//!
//! RowGuid/RowVersion reconciliation between a parent SQL Server database
//! and a child database that replicates a subset of its tables.
//!
//! Every reconcilable table carries a stable row identity (`RowGuid`) and a
//! monotonically increasing version (`RowVersion`). A run pages through each
//! mapped table on both sides, and for every identity whose versions differ
//! copies the newer row over the older one or inserts it where it is
//! missing. Runs can be restricted to reporting the differences.
//!
//! - **Metadata discovery** from the parent's tenant entity registry
//! - **Batch paging** with persisted per-table cursors
//! - **Key collision handling** for non-identity primary keys
//! - **Report-only mode** that writes nothing to either side
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_reconcile::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mssql_reconcile::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(&config).await?;
//!     let maps = orchestrator.discover(&config.reconcile).await?;
//!     let report = orchestrator
//!         .run(&maps, config.reconcile.report_only, CancellationToken::new())
//!         .await?;
//!     print!("{}", report.render());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod reconcile;
pub mod state;

// Re-exports for convenient access
pub use crate::core::{
    Column, ColumnMap, DataType, RelationalStore, Row, Side, SqlValue, Table, TableMap,
};
pub use config::{Config, EndpointConfig, ReconcileConfig};
pub use drivers::{MemoryStore, MetadataSource, MssqlPool, MssqlStore};
pub use error::{ReconcileError, Result};
pub use orchestrator::{Endpoint, HealthCheckResult, Orchestrator, RunSettings};
pub use reconcile::{Finding, FindingKind, Outcome, RunReport, RunStatus};
pub use state::{CursorStore, MemoryCursorStore, MssqlCursorStore};
