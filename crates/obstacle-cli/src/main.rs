//! `obstacle-visualizer` – runs the obstacle scene as a standalone process.
//!
//! 1. Reads the configuration (`--config`, `OBSTACLE_CONFIG`, or
//!    `./obstacles.toml`).
//! 2. Builds the scene; any configuration error aborts startup.
//! 3. Optionally spawns every obstacle into the simulator.
//! 4. Starts the scene broadcast, the trackers and the WebSocket bridge.
//! 5. Runs until **Ctrl-C**, then stops every task before exiting.

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use obstacle_middleware::{EventBus, WsBridge};
use obstacle_runtime::{ObstacleVisualizer, SpawnReport, init_tracing};
use obstacle_sim::{RosbridgeSpawnService, SimSpawnService, SpawnService};
use obstacle_types::SceneError;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::Config;

const DEFAULT_CONFIG: &str = "obstacles.toml";

#[derive(Parser, Debug)]
#[command(author, version, about = "Broadcasts a live obstacle scene for a robot workspace")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, short, env = "OBSTACLE_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    // Tracing first: the OTLP exporter is synchronous and needs no runtime.
    let _guard = init_tracing("obstacle-visualizer");

    let cfg = match resolve_config(args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("{}: {e}", "Configuration error".red().bold());
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "Failed to start the Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Obstacle visualizer failed");
            eprintln!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// An explicit path must exist.  The default path is optional; without it the
/// scene starts empty.
fn resolve_config(explicit: Option<PathBuf>) -> Result<Config, SceneError> {
    if let Some(path) = explicit {
        return Ok(config::load_from(&path)?);
    }
    let path = PathBuf::from(DEFAULT_CONFIG);
    if path.exists() {
        return Ok(config::load_from(&path)?);
    }
    warn!(path = %path.display(), "No configuration file found; using defaults");
    let mut cfg = Config::default();
    config::apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
    cfg.validate()?;
    Ok(cfg)
}

async fn run(cfg: Config) -> Result<(), SceneError> {
    // ── Shutdown signal ───────────────────────────────────────────────────
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let ctrlc_tx = stop_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        let _ = ctrlc_tx.send(true);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; stop the process with a signal instead");
    }

    // ── Scene ─────────────────────────────────────────────────────────────
    let bus = EventBus::default();
    let visualizer = ObstacleVisualizer::new(cfg.visualizer_config(), &cfg.obstacles, bus.clone())?;
    print_summary(&cfg, &visualizer);

    // ── Simulator ─────────────────────────────────────────────────────────
    if cfg.spawn_in_sim {
        let (service, dry_run) = spawn_service(cfg.rosbridge_url.as_deref());
        if let Some(report) = visualizer.spawn_obstacles(service).await {
            print_spawn_report(&report, dry_run);
        }
    }

    // ── Bridge ────────────────────────────────────────────────────────────
    let bridge = cfg.bridge_port.map(|port| {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let bridge = WsBridge::new(bus.clone());
        tokio::spawn(async move {
            if let Err(e) = bridge.run_ws_server(addr).await {
                error!(error = %e, "WebSocket bridge stopped");
            }
        })
    });

    let running = visualizer.start();
    info!(frame_id = %cfg.frame_id, "Obstacle visualizer started");

    while !*stop_rx.borrow() {
        if stop_rx.changed().await.is_err() {
            break;
        }
    }

    running.shutdown().await;
    if let Some(task) = bridge {
        task.abort();
    }
    drop(stop_tx);
    println!("{}", "  ✓ Obstacle visualizer stopped.".green());
    Ok(())
}

/// The simulator to spawn into, and whether spawning is only a dry run
/// against the in-process recorder.
fn spawn_service(rosbridge_url: Option<&str>) -> (Arc<dyn SpawnService>, bool) {
    match rosbridge_url {
        Some(url) => (Arc::new(RosbridgeSpawnService::new(url)), false),
        None => {
            warn!("spawn_in_sim is set without rosbridge_url; spawning is a dry run");
            (Arc::new(SimSpawnService::new()), true)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Console output
// ─────────────────────────────────────────────────────────────────────────────

fn print_summary(cfg: &Config, visualizer: &ObstacleVisualizer) {
    println!();
    println!("{}", "  Obstacle scene".bold().cyan());
    println!("  frame      {}", cfg.frame_id.bold());
    println!(
        "  tracking   {}",
        if cfg.use_tracking { "on".green() } else { "off".dimmed() }
    );
    println!("  broadcast  every {} ms on /obstacle_markers", cfg.broadcast_period_ms);
    if let Some(port) = cfg.bridge_port {
        println!("  bridge     ws://0.0.0.0:{port}");
    }
    if visualizer.descriptors().is_empty() {
        println!("  {}", "no obstacles configured".yellow());
    }
    for d in visualizer.descriptors() {
        let t = d.initial_pose.translation;
        println!(
            "    • {:<16} {:<8} at ({:.3}, {:.3}, {:.3})",
            d.id,
            d.shape().to_string(),
            t.x,
            t.y,
            t.z
        );
    }
    println!();
}

fn print_spawn_report(report: &SpawnReport, dry_run: bool) {
    if dry_run {
        println!(
            "  {} {} obstacle(s) checked, none sent to a simulator (no rosbridge_url)",
            "Dry run:".yellow(),
            report.spawned.len()
        );
    } else {
        println!(
            "  Spawned {} obstacle(s) in the simulator",
            report.spawned.len().to_string().green()
        );
    }
    for e in report.errors() {
        println!("    {} {e}", "✗".red().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawning_without_rosbridge_is_a_dry_run() {
        let (_, dry_run) = spawn_service(None);
        assert!(dry_run);

        let (_, dry_run) = spawn_service(Some("ws://localhost:9090"));
        assert!(!dry_run);
    }
}
