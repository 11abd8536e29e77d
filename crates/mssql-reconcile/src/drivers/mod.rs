//! Relational store implementations.
//!
//! - [`mssql`]: SQL Server over tiberius, plus metadata discovery
//! - [`memory`]: in-process tables for tests and dry experiments
//!
//! Both implement [`RelationalStore`](crate::core::RelationalStore); the
//! reconciler only ever sees `&dyn RelationalStore`.

pub mod memory;
pub mod mssql;

pub use memory::MemoryStore;
pub use mssql::{MetadataSource, MssqlDialect, MssqlPool, MssqlStore};
