//! MIORA Infinity Core Runtime
//!
//! The entry point for the infinity core daemon. Handles CLI args,
//! bootstrapping, and orchestrating the coordinator's drivers.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tokio::time::{sleep, Duration};
use tracing::info;

use miora::config::{self, CoreConfig};
use miora::coordinator::UnifiedCoordinator;
use miora::rng::OsRandomness;
use miora::state::SnapshotStore;
use miora::types::EvolutionType;

const VERSION: &str = "0.1.0";

/// How often the run loop prints a stats line.
const STATS_REPORT_SECS: u64 = 15;

/// MIORA Infinity Core -- Autonomous Self-Evolution Runtime
#[derive(Parser, Debug)]
#[command(
    name = "miora",
    version = VERSION,
    about = "MIORA Infinity Core -- Autonomous Self-Evolution Runtime"
)]
struct Cli {
    /// Activate the infinity system and run until interrupted
    #[arg(long)]
    run: bool,

    /// Show the last persisted system status
    #[arg(long)]
    status: bool,

    /// Write the default config to ~/.miora/core.json and exit
    #[arg(long)]
    init: bool,

    /// Trigger one manual evolution event, then run as usual
    #[arg(long)]
    evolve: Option<String>,
}

// ---- Status Command ---------------------------------------------------------

/// Display the last persisted snapshot without touching the run loop.
fn show_status(config: &CoreConfig) {
    let db_path = config::resolve_path(&config.db_path);

    let store = match SnapshotStore::open(&db_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open snapshot store: {:#}", e);
            return;
        }
    };

    let snapshot = match store.load_snapshot() {
        Ok(Some(s)) => s,
        Ok(None) => {
            println!("No session snapshot yet. Run \"miora --run\" first.");
            return;
        }
        Err(e) => {
            eprintln!("Failed to read snapshot: {:#}", e);
            return;
        }
    };

    let mode = if snapshot.emergency_mode {
        "EMERGENCY".red().bold()
    } else if snapshot.autonomous_mode {
        "ACTIVE".green().bold()
    } else {
        "STOPPED".yellow()
    };

    println!();
    println!("{}", "=== MIORA INFINITY STATUS ===".cyan().bold());
    println!("Mode:             {}", mode);
    println!("Infinity level:   {:.1}", snapshot.infinity_level);
    println!("Supremacy:        {:.1}", snapshot.system_supremacy);
    println!("Evolutions:       {}", snapshot.total_evolutions);
    println!("Upgrades:         {}", snapshot.total_upgrades);
    println!("Cycle:            {}", snapshot.cycle_count);
    println!("Loop progress:    {:.1}%", snapshot.loop_progress);
    println!("Snapshot at:      {}", snapshot.timestamp.to_rfc3339());
    println!("DB path:          {}", db_path);
    println!("{}", "=============================".cyan().bold());
    println!();
}

// ---- Main Run ---------------------------------------------------------------

/// The main run loop: load config, open the store, build the
/// coordinator, activate the system, and report stats until a shutdown
/// signal arrives.
async fn run(config: CoreConfig, manual_evolution: Option<String>) -> Result<()> {
    println!(
        "[{}] MIORA Infinity Core v{} starting...",
        chrono::Utc::now().to_rfc3339(),
        VERSION
    );

    let db_path = config::resolve_path(&config.db_path);
    let store = Arc::new(
        SnapshotStore::open(&db_path)
            .with_context(|| format!("Failed to open snapshot store at {db_path}"))?,
    );

    let rng = Arc::new(OsRandomness);
    let mut coordinator = UnifiedCoordinator::new(&config, rng, store);

    coordinator.activate_infinity_system().await;

    if let Some(description) = manual_evolution {
        coordinator
            .trigger_manual_evolution(EvolutionType::Intelligence, &description)
            .await;
    }

    // Graceful shutdown on SIGINT / SIGTERM.
    let shutdown = async {
        let ctrl_c = signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Failed to register SIGTERM handler: {}", e);
                    let _ = ctrl_c.await;
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => {
                    println!("\n[{}] Received SIGINT, shutting down...", chrono::Utc::now().to_rfc3339());
                }
                _ = sigterm.recv() => {
                    println!("\n[{}] Received SIGTERM, shutting down...", chrono::Utc::now().to_rfc3339());
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            println!(
                "\n[{}] Received shutdown signal...",
                chrono::Utc::now().to_rfc3339()
            );
        }
    };

    tokio::select! {
        _ = shutdown => {}
        _ = report_loop(&coordinator) => {}
    }

    // Drivers stop and the final snapshot lands before exit.
    coordinator.pause_infinity_system().await;
    info!("Infinity core shut down cleanly");

    Ok(())
}

/// Print a unified stats line every reporting interval.
async fn report_loop(coordinator: &UnifiedCoordinator) {
    loop {
        sleep(Duration::from_secs(STATS_REPORT_SECS)).await;

        let stats = coordinator.get_unified_stats();
        println!(
            "[{}] level {:.1} | supremacy {:.1} | evolutions {} ({}/5min) | upgrades {} | avg capability {:.1} | power {:.0}",
            chrono::Utc::now().to_rfc3339(),
            stats.infinity_level,
            stats.system_supremacy,
            stats.total_evolutions,
            stats.evolution_rate,
            stats.total_upgrades,
            stats.average_capability_level,
            stats.processing_power,
        );
    }
}

// ---- Entry Point -----------------------------------------------------------

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config().unwrap_or_default();

    if cli.init {
        match config::save_config(&config) {
            Ok(()) => {
                println!("Config written to {}", config::get_config_path().display());
            }
            Err(e) => {
                eprintln!("Init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.status {
        show_status(&config);
        return;
    }

    if cli.run || cli.evolve.is_some() {
        if let Err(e) = run(config, cli.evolve).await {
            eprintln!("Fatal: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    // Default: show usage hints.
    println!("Run \"miora --help\" for usage information.");
    println!("Run \"miora --run\" to activate the infinity system.");
}
