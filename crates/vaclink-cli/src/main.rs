//! `vaclink` – robot-vacuum proxy bridge.
//!
//! Connects to the local TCP proxy from `~/.vaclink/config.toml` (created
//! with defaults on first run), keeps the device-state snapshot fresh, and
//! prints connectivity and telemetry changes until Ctrl-C.

mod config;

use colored::Colorize;
use vaclink_bridge::VacBridge;
use vaclink_types::BridgeEventKind;

#[tokio::main]
async fn main() {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "info"); VACLINK_LOG_FORMAT=json
    // emits newline-delimited JSON for log aggregators. User-facing output
    // still uses println! for UX consistency.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("VACLINK_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    // ── Configuration vault ───────────────────────────────────────────────
    let cfg = match config::load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            let cfg = config::Config::default();
            if let Err(e) = config::save(&cfg) {
                eprintln!("{} {}", "warning:".yellow().bold(), e);
            } else {
                println!(
                    "Wrote default config to {}",
                    config::config_path().display()
                );
            }
            cfg
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "{} proxy at {}",
        "vaclink".bold(),
        cfg.proxy_addr().cyan()
    );

    // ── Bridge + Ctrl-C handler ───────────────────────────────────────────
    let bridge = VacBridge::connect(cfg.proxy_addr());
    tracing::info!(addr = %cfg.proxy_addr(), "bridge supervisor started");

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = stop_tx.send(true);
    }) {
        eprintln!("{} failed to install Ctrl-C handler: {}", "error:".red().bold(), e);
    }

    // ── Event loop ────────────────────────────────────────────────────────
    let mut sub = bridge.subscribe();
    loop {
        tokio::select! {
            _ = stop_rx.changed() => break,
            event = sub.recv() => {
                let Some(event) = event else { break };
                match event.kind {
                    BridgeEventKind::LinkChanged { robot, cloud } => {
                        let robot = if robot { "up".green() } else { "down".red() };
                        let cloud = if cloud { "up".green() } else { "down".red() };
                        println!("link: robot {robot}, cloud {cloud}");
                    }
                    BridgeEventKind::StateUpdated => {
                        let snapshot = bridge.snapshot();
                        let battery = snapshot
                            .get("elec")
                            .and_then(serde_json::Value::as_i64)
                            .unwrap_or(0);
                        let mode = snapshot
                            .get("mode")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("unknown");
                        println!(
                            "state: mode={} battery={}% ({} fields)",
                            mode.cyan(),
                            battery,
                            snapshot.len()
                        );
                    }
                }
            }
        }
    }

    println!("{}", "shutting down".yellow());
    bridge.shutdown().await;
}
