//! spotgridd — the SpotGrid daemon.
//!
//! Single binary that assembles the controller:
//! - Deployment store (redb)
//! - Metrics collector seeded with the price catalog, optionally refreshed
//!   from a price file before every tick
//! - Action executor with a simulated backend per backend kind
//! - Reconciliation loop on a fixed tick
//!
//! # Usage
//!
//! ```text
//! spotgridd run --config /etc/spotgrid/spotgridd.toml --data-dir /var/lib/spotgrid
//! spotgridd run --prices-file /var/lib/spotgrid/prices.toml
//! spotgridd show-config --config /etc/spotgrid/spotgridd.toml
//! ```

mod catalog;
mod config;
mod prices;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use spotgrid_metrics::{MetricsCollector, MetricsFeed, render_prometheus};
use spotgrid_scheduler::{ActionExecutor, Scheduler, SchedulerError, SimulatedBackend, executor_channel};
use spotgrid_state::{BackendKind, DeploymentFilter, DeploymentStore, epoch_secs, parse_duration_secs};

use crate::config::DaemonConfig;

/// Pending submissions buffered between the scheduler and the executor.
const EXECUTOR_QUEUE: usize = 64;

#[derive(Parser)]
#[command(name = "spotgridd", about = "SpotGrid cost-aware model serving controller")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the reconciliation loop.
    Run {
        /// Path to spotgridd.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/spotgrid")]
        data_dir: PathBuf,

        /// Tick interval ("30s", "1m"), overriding the config file.
        #[arg(long)]
        tick_interval: Option<String>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,

        /// Write the Prometheus exposition here after every tick.
        #[arg(long)]
        metrics_file: Option<PathBuf>,

        /// Re-read offering prices from this TOML file before every tick.
        #[arg(long)]
        prices_file: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML.
    ShowConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            data_dir,
            tick_interval,
            log_json,
            metrics_file,
            prices_file,
        } => {
            init_tracing(log_json);
            let mut config = DaemonConfig::load(config.as_deref())?;
            if let Some(interval) = tick_interval {
                config.controller.tick_interval_secs =
                    parse_duration_secs(&interval).map_err(anyhow::Error::msg)?;
            }
            let files = TickFiles {
                metrics: metrics_file,
                prices: prices_file,
            };
            run(config, data_dir, files).await
        }
        Command::ShowConfig { config } => {
            let config = DaemonConfig::load(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,spotgridd=debug,spotgrid=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Files the tick loop reads or writes.
struct TickFiles {
    metrics: Option<PathBuf>,
    prices: Option<PathBuf>,
}

async fn run(config: DaemonConfig, data_dir: PathBuf, files: TickFiles) -> anyhow::Result<()> {
    info!("SpotGrid daemon starting");
    config.controller.validate().map_err(anyhow::Error::msg)?;

    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("spotgrid.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = DeploymentStore::open(&db_path)?;
    info!(path = ?db_path, "deployment store opened");

    let collector = MetricsCollector::default();
    let offerings = if config.offerings.is_empty() {
        catalog::default_offerings()
    } else {
        config.offerings.clone()
    };
    let offering_count = offerings.len();
    for offering in offerings {
        collector.set_offering(offering).await;
    }
    info!(offerings = offering_count, "price catalog loaded");

    let (link, endpoint) = executor_channel(EXECUTOR_QUEUE);
    let executor = ActionExecutor::new()
        .with_backend(Arc::new(SimulatedBackend::new(BackendKind::Serverless)))
        .with_backend(Arc::new(SimulatedBackend::new(BackendKind::OrchestratedCluster)));

    let scheduler = Scheduler::new(store, config.controller.clone(), link)?;
    info!(
        tick_interval = config.controller.tick_interval_secs,
        retry_budget = config.controller.retry.budget,
        margin = config.controller.arbitrage.margin,
        "scheduler initialized"
    );

    for request in config.deployments {
        let id = request.id.clone();
        match scheduler.get_deployment(&id) {
            Ok(existing) => debug!(deployment = %id, state = %existing.state, "seed deployment already known"),
            Err(SchedulerError::DeploymentNotFound(_)) => {
                scheduler.propose_deployment(request)?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let executor_handle = tokio::spawn(executor.run(endpoint, shutdown_rx.clone()));

    let period = Duration::from_secs(config.controller.tick_interval_secs);
    let tick_handle = tokio::spawn(run_ticks(scheduler, collector, period, files, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tick_handle.await;
    let _ = executor_handle.await;

    info!("SpotGrid daemon stopped");
    Ok(())
}

async fn run_ticks(
    scheduler: Scheduler,
    collector: MetricsCollector,
    period: Duration,
    files: TickFiles,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(path) = files.prices.as_deref()
                    && let Err(e) = prices::refresh(&collector, path).await
                {
                    warn!(error = %e, "price refresh failed, keeping previous prices");
                }
                match scheduler.tick_with_feed(&collector).await {
                    Ok(report) if !report.emitted.is_empty() || report.failed > 0 || report.errors > 0 => {
                        info!(
                            evaluated = report.evaluated,
                            emitted = report.emitted.len(),
                            rolled_back = report.rolled_back,
                            failed = report.failed,
                            errors = report.errors,
                            "tick"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "tick failed"),
                }
                if let Err(e) = release_terminal(&scheduler, &collector).await {
                    warn!(error = %e, "releasing samples failed");
                }
                if let Err(e) = export_metrics(&scheduler, &collector, files.metrics.as_deref()).await {
                    warn!(error = %e, "metrics export failed");
                }
            }
            _ = shutdown.changed() => {
                info!("reconciliation loop stopping");
                break;
            }
        }
    }
}

/// Drop the samples of deployments that will never be evaluated again.
async fn release_terminal(scheduler: &Scheduler, collector: &MetricsCollector) -> anyhow::Result<()> {
    let tracked = collector.tracked_deployments().await;
    if tracked.is_empty() {
        return Ok(());
    }
    for d in scheduler.list_deployments(&DeploymentFilter::default())? {
        if d.state.is_terminal() && tracked.binary_search(&d.id).is_ok() {
            collector.forget(&d.id).await;
            debug!(deployment = %d.id, state = %d.state, "samples released");
        }
    }
    Ok(())
}

async fn export_metrics(
    scheduler: &Scheduler,
    collector: &MetricsCollector,
    metrics_file: Option<&Path>,
) -> anyhow::Result<()> {
    let deployments = scheduler.list_deployments(&DeploymentFilter::default())?;
    let pricing = collector.pricing_snapshot(epoch_secs()).await;
    let text = render_prometheus(&deployments, &scheduler.action_counts(), &pricing);
    debug!(metrics = %text, "controller metrics");
    if let Some(path) = metrics_file {
        std::fs::write(path, text)?;
    }
    Ok(())
}
