//! Core types and traits shared by the reconciler and the drivers.
//!
//! - [`schema`]: tables, columns and the parent/child mapping model
//! - [`value`]: typed SQL values
//! - [`row`]: rows as ordered `(name, type, value)` triples
//! - [`traits`]: the [`RelationalStore`] capability and write commands
//! - [`identifier`]: identifier validation and quoting

pub mod identifier;
pub mod row;
pub mod schema;
pub mod traits;
pub mod value;

pub use row::{ColumnValue, Row, SequencedRow};
pub use schema::{
    Column, ColumnMap, DataType, ReservedColumns, Side, SyncType, Table, TableMap, ROW_GUID,
    ROW_VERSION,
};
pub use traits::{RelationalStore, WindowRequest, WriteCommand};
pub use value::SqlValue;
