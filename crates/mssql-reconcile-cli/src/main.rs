//! mssql-reconcile CLI - RowGuid/RowVersion reconciliation between SQL Server databases.

use clap::{Parser, Subcommand};
use mssql_reconcile::{Config, Orchestrator, ReconcileError, RunReport, RunStatus, TableMap};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-reconcile")]
#[command(about = "Reconcile parent and child SQL Server databases by RowGuid and RowVersion")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Timeout in seconds for graceful shutdown (default: 60)
    #[arg(long, default_value = "60")]
    shutdown_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every discovered table map
    Run {
        /// Report differences without writing to either database
        #[arg(long)]
        report_only: bool,

        /// Restrict the run to these parent tables (schema.table, repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,

        /// Override rows per batch window
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// List the table maps discovery returns
    Tables {
        /// Restrict discovery to these parent tables (schema.table, repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
    },

    /// Reset the batch cursors of the discovered tables on both sides
    ResetCursors {
        /// Restrict the reset to these parent tables (schema.table, repeatable)
        #[arg(long = "table")]
        tables: Vec<String>,
    },

    /// Test database connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(report) = e.partial_report() {
                print!("{}", report.render());
            }
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), ReconcileError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Run {
            report_only,
            tables,
            batch_size,
        } => {
            if !tables.is_empty() {
                config.reconcile.tables = tables;
            }
            if let Some(size) = batch_size {
                config.reconcile.batch_size = size;
            }
            config.validate()?;
            let report_only = report_only || config.reconcile.report_only;

            let cancel = setup_signal_handler(cli.shutdown_timeout);
            let orchestrator = Orchestrator::connect(&config).await?;
            let maps = orchestrator.discover(&config.reconcile).await?;
            info!("Discovered {} table maps", maps.len());

            let report = orchestrator
                .run_with_deadline(
                    &maps,
                    report_only,
                    cancel,
                    Duration::from_secs(cli.shutdown_timeout),
                )
                .await?;

            print_report(&report, cli.output_json)?;

            if report.status == RunStatus::Cancelled {
                return Err(ReconcileError::Cancelled);
            }
        }

        Commands::Tables { tables } => {
            if !tables.is_empty() {
                config.reconcile.tables = tables;
            }
            let orchestrator = Orchestrator::connect(&config).await?;
            let maps = orchestrator.discover(&config.reconcile).await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&maps)?);
            } else {
                print_table_maps(&maps);
            }
        }

        Commands::ResetCursors { tables } => {
            if !tables.is_empty() {
                config.reconcile.tables = tables;
            }
            let orchestrator = Orchestrator::connect(&config).await?;
            let maps = orchestrator.discover(&config.reconcile).await?;
            let count = orchestrator.reset_cursors(&maps).await?;
            println!("Reset cursors of {} table maps", count);
        }

        Commands::HealthCheck => {
            let orchestrator = Orchestrator::connect(&config).await?;
            let result = orchestrator.health_check().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Parent ({}): {} ({}ms)",
                    config.parent.display_name(),
                    if result.parent_connected { "OK" } else { "FAILED" },
                    result.parent_latency_ms
                );
                if let Some(rcsi) = result.parent_read_committed_snapshot {
                    println!(
                        "    READ_COMMITTED_SNAPSHOT: {}",
                        if rcsi { "ON" } else { "OFF" }
                    );
                }
                if let Some(ref err) = result.parent_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Child ({}): {} ({}ms)",
                    config.child.display_name(),
                    if result.child_connected { "OK" } else { "FAILED" },
                    result.child_latency_ms
                );
                if let Some(rcsi) = result.child_read_committed_snapshot {
                    println!(
                        "    READ_COMMITTED_SNAPSHOT: {}",
                        if rcsi { "ON" } else { "OFF" }
                    );
                }
                if let Some(ref err) = result.child_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(ReconcileError::pool("Health check failed", "health-check"));
            }
        }
    }

    Ok(())
}

fn print_report(report: &RunReport, json: bool) -> Result<(), ReconcileError> {
    if json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    print!("{}", report.render());
    let heading = if report.report_only {
        "Report-only run"
    } else {
        "Reconciliation"
    };
    println!("\n{} {}!", heading, report.status);
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!("  Tables: {}", report.tables_processed);
    println!(
        "  Differences: {} found, {} remedied, {} failed",
        report.differences_found, report.differences_remedied, report.differences_failed
    );
    if !report.tables_skipped.is_empty() {
        println!("  Skipped tables: {:?}", report.tables_skipped);
    }
    if !report.tables_capped.is_empty() {
        println!("  Incomplete tables: {:?}", report.tables_capped);
    }
    Ok(())
}

fn print_table_maps(maps: &[TableMap]) {
    println!("{} table maps:", maps.len());
    for map in maps {
        println!(
            "  {} ({} columns{})",
            map,
            map.column_maps.len(),
            if map.is_eligible() { "" } else { ", not eligible" }
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            let mut stream = match signal(kind) {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to install {} handler: {}", name, e);
                    return;
                }
            };
            stream.recv().await;
            eprintln!(
                "\nReceived {}. Shutting down gracefully (timeout: {}s)...",
                name, shutdown_timeout
            );
            token.cancel();
        });
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler(shutdown_timeout: u64) -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
            return;
        }
        eprintln!(
            "\nReceived Ctrl-C. Shutting down gracefully (timeout: {}s)...",
            shutdown_timeout
        );
        token.cancel();
    });

    cancel_token
}
