//! Microsoft SQL Server driver.
//!
//! - [`MssqlPool`]: bb8 pool of tiberius clients
//! - [`MssqlDialect`]: renders store operations into parameterized T-SQL
//! - [`MssqlStore`]: the [`RelationalStore`](crate::core::RelationalStore) of one side
//! - [`MetadataSource`]: table map discovery on the parent

mod convert;
mod dialect;
mod metadata;
mod pool;
mod store;

pub use dialect::{MssqlDialect, Statement, SEQUENCE_COLUMN};
pub use metadata::MetadataSource;
pub use pool::{MssqlConnection, MssqlPool, TiberiusConnectionManager};
pub use store::MssqlStore;
