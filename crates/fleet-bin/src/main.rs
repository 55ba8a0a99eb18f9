//! camfleetd: runs a six-camera fleet in two trigger groups.
//!
//! Subcommands:
//! - `run`: build the fleet from the settings directory, trigger it
//!   periodically and drive the PLC alarm registers until Ctrl-C
//! - `check`: startup self-check report
//! - `heal-mapping`: remove duplicate view assignments
//! - `show-config`: print the effective daemon configuration

#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod config;
mod logging;
mod plc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::DaemonConfig;
use fleet_core::Frame;
use fleet_hardware::{
    run_self_check, run_trigger_cycle, AlarmLinkage, Fleet, FleetBuilder, FleetObserver,
    FleetStatusAggregator, SelfCheckInput, ViewMappingResolver, ViewSlot,
};
use fleet_storage::{store::VIEW_MAPPING_FILE, ConfigStore, RunMode};
use logging::TracingConfig;
use plc::LoggedPlc;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser)]
#[command(name = "camfleetd")]
#[command(about = "Camera fleet daemon: grouped triggering, reconnects and offline alarms", long_about = None)]
struct Cli {
    /// Daemon configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Override the settings directory
    #[arg(long, global = true)]
    settings_dir: Option<PathBuf>,

    /// Override the run mode (simulation or production)
    #[arg(long, global = true)]
    mode: Option<RunMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fleet until interrupted
    Run {
        /// Auto-trigger period in milliseconds
        #[arg(long)]
        cycle_ms: Option<u64>,

        /// Do not trigger automatically
        #[arg(long)]
        no_auto: bool,
    },

    /// Check settings and report problems
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove duplicate view assignments and save the result
    HealMapping,

    /// Print the effective configuration as TOML
    ShowConfig,
}

impl Cli {
    fn load_config(&self) -> Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => DaemonConfig::load_from(path),
            None => DaemonConfig::load(),
        }
        .context("Failed to load configuration")?;

        if let Some(dir) = &self.settings_dir {
            config.settings_dir = dir.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Commands::Run { cycle_ms, no_auto } = &self.command {
            if let Some(ms) = cycle_ms {
                config.trigger.cycle_ms = *ms;
            }
            if *no_auto {
                config.trigger.auto = false;
            }
        }

        config
            .validate()
            .map_err(anyhow::Error::msg)
            .context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    let tracing_config = TracingConfig::from_strings(&config.logging.level, &config.logging.format)
        .map_err(anyhow::Error::msg)?
        .with_span_events(config.logging.span_events)
        .with_ansi(std::io::stdout().is_terminal());
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run { .. } => run(config).await,
        Commands::Check { json } => check(&config, json),
        Commands::HealMapping => heal_mapping(&config),
        Commands::ShowConfig => show_config(&config),
    }
}

// =============================================================================
// run
// =============================================================================

/// Logs camera online transitions republished by the aggregator.
struct EventLog;

impl FleetObserver for EventLog {
    fn on_image_ready(&self, device: &str, frame: &Frame) {
        tracing::trace!(device, frame = frame.frame_number, "Image ready");
    }

    fn on_camera_online_changed(&self, device: &str, online: bool) {
        if online {
            tracing::info!(device, "Camera online");
        } else {
            tracing::warn!(device, "Camera offline");
        }
    }
}

async fn run(config: DaemonConfig) -> Result<()> {
    let mode = config.mode;
    let store = ConfigStore::new(config.settings_dir.clone());
    tracing::info!(%mode, settings = %store.dir().display(), "camfleetd starting");

    let cameras = store.load_camera_settings(mode);
    let plc = store.load_plc_settings(mode);
    let (resolver, healed) = ViewMappingResolver::load_healed(&store, mode);
    if healed {
        tracing::warn!("View mapping had duplicate assignments and was repaired");
    }

    let retry = config.retry_policy();
    run_self_check(&SelfCheckInput {
        cameras: &cameras,
        mapping: &resolver,
        plc: &plc,
        retry: &retry,
        sdk: None,
    });

    let fleet = Fleet::new(
        Arc::new(resolver),
        &plc,
        Arc::new(LoggedPlc::new("PLC A", &plc.plc_a, plc.slave_id)),
        Arc::new(LoggedPlc::new("PLC B", &plc.plc_b, plc.slave_id)),
    );
    let events = fleet.aggregator().subscribe(Arc::new(EventLog));

    let builder = FleetBuilder::new(mode)
        .retry_policy(retry)
        .simulation(config.simulation_options());
    fleet
        .rebuild(&builder, &cameras)
        .await
        .context("Failed to build camera fleet")?;
    fleet.start().await;
    tracing::info!(
        online = fleet.registry().online_count(),
        total = fleet.registry().len(),
        "Fleet started"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let cycle = config.trigger.auto.then(|| {
        tokio::spawn(run_trigger_cycle(
            fleet.registry().clone(),
            config.cycle(),
            shutdown_rx.clone(),
        ))
    });
    let status = config.status_interval().map(|period| {
        tokio::spawn(report_status(
            fleet.aggregator().clone(),
            fleet.alarm().clone(),
            period,
            shutdown_rx.clone(),
        ))
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = cycle {
        match handle.await {
            Ok(cycles) => tracing::info!(cycles, "Trigger cycle finished"),
            Err(e) => tracing::warn!(error = %e, "Trigger cycle task failed"),
        }
    }
    if let Some(handle) = status {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Status task failed");
        }
    }

    fleet.aggregator().unsubscribe(events);
    fleet.shutdown().await;
    tracing::info!("camfleetd stopped");
    Ok(())
}

async fn report_status(
    aggregator: Arc<FleetStatusAggregator>,
    alarm: Arc<AlarmLinkage>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = aggregator.snapshot();
                tracing::info!(
                    fps = snapshot.fps,
                    "{} {}",
                    snapshot.overview_label(),
                    snapshot.alarm_summary(&alarm.plc_links())
                );
                for device in snapshot.devices.iter().filter(|d| !d.online) {
                    tracing::debug!(device = %device.name, group = %device.group, "{}", device.label);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

// =============================================================================
// check / heal-mapping / show-config
// =============================================================================

fn check(config: &DaemonConfig, json: bool) -> Result<()> {
    let store = ConfigStore::new(config.settings_dir.clone());
    // read-only: production mode never writes repairs back
    let cameras = store.load_camera_settings(RunMode::Production);
    let plc = store.load_plc_settings(RunMode::Production);
    let mapping = ViewMappingResolver::load(&store);
    let retry = config.retry_policy();

    let items = run_self_check(&SelfCheckInput {
        cameras: &cameras,
        mapping: &mapping,
        plc: &plc,
        retry: &retry,
        sdk: None,
    });

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&items).context("Failed to encode report")?
        );
        return Ok(());
    }

    for item in &items {
        let verdict = if item.passed { "PASS" } else { "FAIL" };
        println!("[{}] {}: {}", verdict, item.name, item.detail);
        if let Some(suggestion) = &item.suggestion {
            println!("       -> {}", suggestion);
        }
    }
    let passed = items.iter().filter(|i| i.passed).count();
    println!();
    println!("{}/{} checks passed", passed, items.len());
    Ok(())
}

fn heal_mapping(config: &DaemonConfig) -> Result<()> {
    let store = ConfigStore::new(config.settings_dir.clone());
    let (resolver, changed) = ViewMappingResolver::load_healed(&store, config.mode);

    for slot in ViewSlot::all() {
        let device = resolver
            .resolve_device_for_slot(slot)
            .unwrap_or_else(|| "-".to_string());
        println!("{}: {}", slot, device);
    }
    println!();

    if !changed {
        println!("View mapping is consistent");
    } else if config.mode.is_locked() {
        println!("Duplicates removed in memory only: {} mode does not write settings", config.mode);
    } else {
        println!(
            "Duplicates removed and saved to {}",
            store.path_of(VIEW_MAPPING_FILE).display()
        );
    }
    Ok(())
}

fn show_config(config: &DaemonConfig) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}
