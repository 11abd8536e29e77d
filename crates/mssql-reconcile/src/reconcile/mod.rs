//! Batch reconciliation of one table map.
//!
//! - [`fetcher`]: cursor-driven windows over one side
//! - [`differ`]: version comparison of a parent batch against a child batch
//! - [`keys`]: replacement values for colliding key columns
//! - [`reconciler`]: winner selection and write commands
//! - [`report`]: findings and the run report

pub mod differ;
pub mod fetcher;
pub mod keys;
pub mod reconciler;
pub mod report;

pub use differ::{diff, DiffOutcome, Difference, ReservedNames, RowPair, SideLookup};
pub use fetcher::{use_no_lock, Batch, BatchFetcher};
pub use keys::{UniqueKeyResolver, DEFAULT_KEY_ATTEMPTS};
pub use reconciler::{Decision, Reconciler};
pub use report::{Finding, FindingKind, Outcome, RunReport, RunStatus, REMEDIED_LINE};
