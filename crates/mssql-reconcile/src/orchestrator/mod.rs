//! Reconciliation orchestrator - main workflow coordinator.
//!
//! Table maps are processed one after another. For each eligible map the
//! orchestrator pages both sides in lockstep, diffs every pair of windows
//! and hands the differences to a [`Reconciler`]. Cursors of a table are
//! reset to 0 once the table is finished or the run is cancelled while on
//! it, so the next run starts from the top again.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, EndpointConfig, ReconcileConfig};
use crate::core::schema::{Column, Side, TableMap};
use crate::core::traits::RelationalStore;
use crate::drivers::{MetadataSource, MssqlPool, MssqlStore};
use crate::error::{ReconcileError, Result};
use crate::reconcile::{
    diff, use_no_lock, BatchFetcher, Difference, Reconciler, ReservedNames, RowPair, SideLookup,
    UniqueKeyResolver,
};
use crate::state::{CursorStore, MemoryCursorStore, MssqlCursorStore};

pub use crate::reconcile::report::{RunReport, RunStatus};

/// Tunables of a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Rows per batch window.
    pub batch_size: usize,
    /// Batch iterations per table before the table is given up.
    pub max_iterations: usize,
    /// Random key attempts before a row fails.
    pub key_attempts: usize,
    /// Allow no-lock window reads when snapshot isolation is off.
    pub allow_no_lock: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_iterations: 100,
            key_attempts: crate::reconcile::DEFAULT_KEY_ATTEMPTS,
            allow_no_lock: true,
        }
    }
}

/// One side of the reconciliation: its rows and its cursors.
#[derive(Clone)]
pub struct Endpoint {
    /// Name used in logs.
    pub label: String,
    pub store: Arc<dyn RelationalStore>,
    pub cursors: Arc<dyn CursorStore>,
    pool: Option<Arc<MssqlPool>>,
}

impl Endpoint {
    pub fn new(
        label: impl Into<String>,
        store: Arc<dyn RelationalStore>,
        cursors: Arc<dyn CursorStore>,
    ) -> Self {
        Self {
            label: label.into(),
            store,
            cursors,
            pool: None,
        }
    }

    /// Connect to a SQL Server database and keep cursors in its sync schema.
    pub async fn connect(
        label: impl Into<String>,
        config: &EndpointConfig,
        max_conns: u32,
    ) -> Result<Self> {
        let pool = Arc::new(MssqlPool::new(config, max_conns).await?);
        let store: Arc<dyn RelationalStore> = Arc::new(MssqlStore::new(pool.clone()));
        let cursors: Arc<dyn CursorStore> =
            Arc::new(MssqlCursorStore::new(pool.clone(), config.sync_schema.clone()));
        Ok(Self {
            label: label.into(),
            store,
            cursors,
            pool: Some(pool),
        })
    }

    /// Connection pool, when the endpoint is a SQL Server database.
    pub fn pool(&self) -> Option<&Arc<MssqlPool>> {
        self.pool.as_ref()
    }

    async fn ping(&self) -> Ping {
        let latency_ms = match &self.pool {
            Some(pool) => match pool.ping().await {
                Ok(latency) => latency.as_millis() as u64,
                Err(e) => {
                    return Ping {
                        connected: false,
                        error: Some(e.to_string()),
                        ..Default::default()
                    }
                }
            },
            None => 0,
        };
        match self.store.read_committed_snapshot().await {
            Ok(enabled) => Ping {
                connected: true,
                latency_ms,
                read_committed_snapshot: Some(enabled),
                error: None,
            },
            Err(e) => Ping {
                connected: true,
                latency_ms,
                read_committed_snapshot: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[derive(Default)]
struct Ping {
    connected: bool,
    latency_ms: u64,
    read_committed_snapshot: Option<bool>,
    error: Option<String>,
}

/// Connectivity of both sides.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub parent_connected: bool,
    pub parent_latency_ms: u64,
    /// READ_COMMITTED_SNAPSHOT on the parent, when it could be read.
    pub parent_read_committed_snapshot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_error: Option<String>,
    pub child_connected: bool,
    pub child_latency_ms: u64,
    pub child_read_committed_snapshot: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_error: Option<String>,
    pub healthy: bool,
}

/// Cursor stores used for one run.
struct RunCursors {
    parent: Arc<dyn CursorStore>,
    child: Arc<dyn CursorStore>,
}

/// Reconciliation orchestrator.
pub struct Orchestrator {
    parent: Endpoint,
    child: Endpoint,
    settings: RunSettings,
}

impl Orchestrator {
    pub fn new(parent: Endpoint, child: Endpoint, settings: RunSettings) -> Self {
        Self {
            parent,
            child,
            settings,
        }
    }

    /// Connect both sides described by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let max_conns = config.reconcile.max_connections;
        let parent = Endpoint::connect("parent", &config.parent, max_conns).await?;
        let child = Endpoint::connect("child", &config.child, max_conns).await?;
        Ok(Self::new(parent, child, config.run_settings()))
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Discover the tenant's table maps from the parent's catalog.
    pub async fn discover(&self, reconcile: &ReconcileConfig) -> Result<Vec<TableMap>> {
        let pool = self.parent.pool().ok_or_else(|| {
            ReconcileError::Config(format!(
                "{} endpoint has no catalog to discover table maps from",
                self.parent.label
            ))
        })?;
        MetadataSource::new(pool.clone())
            .table_maps(
                reconcile.company_id,
                &reconcile.excluded_schemas,
                &reconcile.tables,
            )
            .await
    }

    /// Check that both sides answer.
    pub async fn health_check(&self) -> HealthCheckResult {
        let parent = self.parent.ping().await;
        let child = self.child.ping().await;
        HealthCheckResult {
            healthy: parent.connected
                && parent.error.is_none()
                && child.connected
                && child.error.is_none(),
            parent_connected: parent.connected,
            parent_latency_ms: parent.latency_ms,
            parent_read_committed_snapshot: parent.read_committed_snapshot,
            parent_error: parent.error,
            child_connected: child.connected,
            child_latency_ms: child.latency_ms,
            child_read_committed_snapshot: child.read_committed_snapshot,
            child_error: child.error,
        }
    }

    /// Reset the persisted cursors of every map on both sides.
    pub async fn reset_cursors(&self, maps: &[TableMap]) -> Result<usize> {
        self.parent.cursors.init_schema().await?;
        self.child.cursors.init_schema().await?;
        for map in maps {
            self.parent
                .cursors
                .reset(&map.from_table.qualified_name())
                .await?;
            self.child
                .cursors
                .reset(&map.to_table.qualified_name())
                .await?;
        }
        info!("Reset cursors of {} table maps", maps.len());
        Ok(maps.len())
    }

    /// [`run`](Self::run), abandoned if it has not stopped `grace` after
    /// `cancel` fires.
    ///
    /// An abandoned run loses its report and stops wherever it was, so the
    /// cursors of every map are reset before returning
    /// [`ReconcileError::Cancelled`].
    pub async fn run_with_deadline(
        &self,
        maps: &[TableMap],
        report_only: bool,
        cancel: CancellationToken,
        grace: Duration,
    ) -> Result<RunReport> {
        let deadline = {
            let cancel = cancel.clone();
            async move {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
            }
        };

        tokio::select! {
            result = self.run(maps, report_only, cancel) => result,
            _ = deadline => {
                warn!(
                    "Run did not stop within {}s of cancellation; abandoning it mid-table, report discarded",
                    grace.as_secs()
                );
                if !report_only {
                    if let Err(e) = self.reset_cursors(maps).await {
                        warn!("Failed to reset cursors of abandoned run: {}", e);
                    }
                }
                Err(ReconcileError::Cancelled)
            }
        }
    }

    /// Reconcile every map in order.
    ///
    /// A report-only run records differences without writing rows and
    /// pages with in-memory cursors, so neither database is modified.
    /// Cancellation is observed between batches and between tables; a
    /// cancelled run returns its report with [`RunStatus::Cancelled`].
    /// Any error other than a row-scoped key failure aborts the run with
    /// [`ReconcileError::RunAborted`] carrying the report so far.
    pub async fn run(
        &self,
        maps: &[TableMap],
        report_only: bool,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let mut report = RunReport::new(report_only);
        info!(
            "Starting reconciliation run {}: {} table maps{}",
            report.run_id,
            maps.len(),
            if report_only { " (report only)" } else { "" }
        );

        let outcome = self
            .run_tables(maps, report_only, &cancel, &mut report)
            .await;

        match outcome {
            Ok(status) => {
                report.finish(status);
                info!(
                    "Reconciliation {}: {} tables, {} differences ({} remedied, {} failed) in {:.1}s",
                    report.status,
                    report.tables_processed,
                    report.differences_found,
                    report.differences_remedied,
                    report.differences_failed,
                    report.duration_seconds
                );
                Ok(report)
            }
            Err(e) => {
                error!("Reconciliation aborted: {}", e);
                report.finish(RunStatus::Aborted);
                Err(ReconcileError::RunAborted {
                    report: Box::new(report),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn run_tables(
        &self,
        maps: &[TableMap],
        report_only: bool,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<RunStatus> {
        let cursors = if report_only {
            RunCursors {
                parent: Arc::new(MemoryCursorStore::new()),
                child: Arc::new(MemoryCursorStore::new()),
            }
        } else {
            self.parent.cursors.init_schema().await?;
            self.child.cursors.init_schema().await?;
            RunCursors {
                parent: self.parent.cursors.clone(),
                child: self.child.cursors.clone(),
            }
        };

        let parent_no_lock = use_no_lock(
            self.settings.allow_no_lock,
            self.parent.store.read_committed_snapshot().await?,
        );
        let child_no_lock = use_no_lock(
            self.settings.allow_no_lock,
            self.child.store.read_committed_snapshot().await?,
        );
        debug!(
            "No-lock reads: {} {}, {} {}",
            self.parent.label, parent_no_lock, self.child.label, child_no_lock
        );

        let batch_size = self.settings.batch_size.max(1);
        let parent_fetcher = BatchFetcher::new(
            self.parent.store.as_ref(),
            cursors.parent.as_ref(),
            batch_size,
            parent_no_lock,
        );
        let child_fetcher = BatchFetcher::new(
            self.child.store.as_ref(),
            cursors.child.as_ref(),
            batch_size,
            child_no_lock,
        );
        let keys = UniqueKeyResolver::new(self.settings.key_attempts);

        for map in maps {
            if cancel.is_cancelled() {
                info!("Cancelled before {}", map);
                return Ok(RunStatus::Cancelled);
            }

            let Some(reconciler) = Reconciler::new(
                map,
                self.parent.store.as_ref(),
                self.child.store.as_ref(),
                &keys,
            ) else {
                warn!("{}: RowGuid or RowVersion not mapped, skipping", map);
                report.tables_skipped.push(map.to_string());
                continue;
            };

            info!("Reconciling {}", map);
            let table = TableRun {
                map,
                reconciler: &reconciler,
                parent_fetcher: &parent_fetcher,
                child_fetcher: &child_fetcher,
                parent_store: self.parent.store.as_ref(),
                child_store: self.child.store.as_ref(),
                max_iterations: self.settings.max_iterations,
            };
            let finished = table.run(report_only, cancel, report).await?;

            parent_fetcher.reset(&map.from_table).await?;
            child_fetcher.reset(&map.to_table).await?;

            if !finished {
                info!("Cancelled while reconciling {}", map);
                return Ok(RunStatus::Cancelled);
            }
            report.tables_processed += 1;
        }

        Ok(RunStatus::Completed)
    }
}

/// The batch loop of one table map.
struct TableRun<'a> {
    map: &'a TableMap,
    reconciler: &'a Reconciler<'a>,
    parent_fetcher: &'a BatchFetcher<'a>,
    child_fetcher: &'a BatchFetcher<'a>,
    parent_store: &'a dyn RelationalStore,
    child_store: &'a dyn RelationalStore,
    max_iterations: usize,
}

impl TableRun<'_> {
    /// Returns `false` if the loop stopped because of cancellation.
    async fn run(
        &self,
        report_only: bool,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<bool> {
        let Some(reserved) = self.map.reserved_columns() else {
            return Ok(true);
        };
        let names = ReservedNames {
            parent_guid: &reserved.guid.column(Side::Parent).name,
            parent_version: &reserved.version.column(Side::Parent).name,
            child_guid: &reserved.guid.column(Side::Child).name,
            child_version: &reserved.version.column(Side::Child).name,
        };

        let parent_columns = self.map.columns_for(Side::Parent);
        let child_columns = self.map.columns_for(Side::Child);
        let parent_keys = self.map.ordering_keys(Side::Parent);
        let child_keys = self.map.ordering_keys(Side::Child);

        let parent_lookup = SideLookup::new(
            self.parent_store,
            &self.map.from_table,
            &parent_columns,
            names.parent_guid,
        );
        let child_lookup = SideLookup::new(
            self.child_store,
            &self.map.to_table,
            &child_columns,
            names.child_guid,
        );

        // Windows shift after inserts, so a row that failed earlier can come
        // around again; it is recorded once per table.
        let mut recorded: HashSet<Uuid> = HashSet::new();

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Ok(false);
            }

            let parent_batch = self
                .parent_fetcher
                .fetch(&self.map.from_table, &parent_columns, &parent_keys)
                .await?;
            let child_batch = self
                .child_fetcher
                .fetch(&self.map.to_table, &child_columns, &child_keys)
                .await?;

            if parent_batch.is_empty() && child_batch.is_empty() {
                debug!("{}: done after {} batches", self.map, iteration - 1);
                return Ok(true);
            }

            let outcome = diff(names, parent_batch.rows, child_batch.rows, &child_lookup).await?;
            let mut differences = outcome.differences;

            // A child row may match a parent row outside the parent window;
            // that row is handled when the parent side reaches it.
            for child in outcome.unmatched_child {
                let Some(guid) = child.guid(names.child_guid) else {
                    continue;
                };
                if parent_lookup.exists(guid).await? {
                    continue;
                }
                differences.push(Difference {
                    guid,
                    pair: RowPair {
                        parent: None,
                        child: Some(child),
                    },
                });
            }

            for difference in &differences {
                if recorded.contains(&difference.guid) {
                    debug!("{}: GUID {} already recorded", self.map, difference.guid);
                    continue;
                }
                let found = report.differences_found;
                self.reconciler
                    .reconcile(difference, report_only, report)
                    .await?;
                if report.differences_found > found {
                    recorded.insert(difference.guid);
                }
            }
        }

        // The last allowed batch may have consumed both sides exactly.
        if self.exhausted(&parent_columns, &child_columns, &parent_keys, &child_keys).await? {
            debug!("{}: done after {} batches", self.map, self.max_iterations);
            return Ok(true);
        }

        warn!(
            "{}: stopped after {} batches without reaching the end",
            self.map, self.max_iterations
        );
        report.tables_capped.push(self.map.to_string());
        Ok(true)
    }

    /// Whether the windows after both cursors are empty.
    async fn exhausted(
        &self,
        parent_columns: &[Column],
        child_columns: &[Column],
        parent_keys: &[String],
        child_keys: &[String],
    ) -> Result<bool> {
        let parent_batch = self
            .parent_fetcher
            .fetch(&self.map.from_table, parent_columns, parent_keys)
            .await?;
        if !parent_batch.is_empty() {
            return Ok(false);
        }
        let child_batch = self
            .child_fetcher
            .fetch(&self.map.to_table, child_columns, child_keys)
            .await?;
        Ok(child_batch.is_empty())
    }
}
