// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! fanctl-daemon: owns hwmon PWM writes, runs fan curves on a fixed
//! interval, and publishes read-only status over a Unix domain socket.

use anyhow::Context;
use clap::Parser;
use linux_fan_control::config::{self, Config};
use linux_fan_control::hwmon::{self, Hwmon};
use linux_fan_control::status::{self, Request, Response, Snapshot};
use linux_fan_control::Engine;
use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "fanctl-daemon", about = "Linux fan curve daemon")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the status socket path.
    #[arg(short, long)]
    socket: Option<String>,

    /// Log a status line for every fan on every tick.
    #[arg(short, long)]
    debug: bool,

    /// hwmon class directory to resolve devices in.
    #[arg(long, default_value = hwmon::HWMON_ROOT)]
    hwmon_root: PathBuf,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("Could not load config {}", cli.config.display()))?;

    if !nix::unistd::Uid::effective().is_root() {
        log::warn!(
            "Not running as root; opening root-only PWM attributes will fail during initialization"
        );
    }

    // Set by signal delivery, polled once per tick.
    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM, SIGHUP] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))
            .with_context(|| format!("Could not register handler for signal {signal}"))?;
    }

    let mut engine = Engine::initialize(&cfg, &Hwmon::new(&cli.hwmon_root))
        .context("Failed to initialize fan control")?;

    // Bind before any fan leaves automatic mode.
    let socket_path = cli
        .socket
        .clone()
        .or_else(|| cfg.daemon.status_socket().map(str::to_string));
    let listener = match &socket_path {
        Some(path) => Some(bind_status_socket(Path::new(path))?),
        None => None,
    };

    engine.start().context("Failed to take manual control of fans")?;

    let (status_tx, status_rx) = watch::channel(engine.snapshot());
    if let Some(listener) = listener {
        tokio::spawn(serve_status(listener, status_rx));
    }

    run(&mut engine, &cfg, &shutdown, &status_tx).await;

    log::info!("Daemon shutting down");
    let errors = engine.shutdown();

    if let Some(path) = &socket_path {
        let _ = std::fs::remove_file(path);
    }

    if errors.is_empty() {
        log::info!("Restored all fans");
        Ok(())
    } else {
        anyhow::bail!("Failed to restore {} fan(s)", errors.len())
    }
}

/// Tick until the shutdown flag is observed at a tick boundary.
async fn run(
    engine: &mut Engine,
    cfg: &Config,
    shutdown: &AtomicBool,
    status_tx: &watch::Sender<Snapshot>,
) {
    let mut interval = time::interval(cfg.daemon.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::info!("Running every {} ms", cfg.daemon.interval_ms);

    loop {
        interval.tick().await;
        if shutdown.load(Ordering::SeqCst) {
            log::info!("Received shutdown signal");
            break;
        }
        if let Err(e) = engine.tick() {
            log::error!("Tick failed: {e}");
            break;
        }
        status_tx.send_replace(engine.snapshot());
    }
}

// ---------------------------------------------------------------------------
// Status socket
// ---------------------------------------------------------------------------

fn bind_status_socket(path: &Path) -> anyhow::Result<UnixListener> {
    // Clean up old socket file
    let _ = std::fs::remove_file(path);
    let listener = UnixListener::bind(path)
        .with_context(|| format!("Could not bind status socket {}", path.display()))?;

    // Status is read-only, let any user query it
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o666);
        std::fs::set_permissions(path, perms)?;
    }

    log::info!("Status socket listening on {}", path.display());
    Ok(listener)
}

async fn serve_status(listener: UnixListener, status: watch::Receiver<Snapshot>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::spawn(handle_client(stream, status.clone()));
            }
            Err(e) => {
                log::error!("Failed to accept connection: {e}");
            }
        }
    }
}

async fn handle_client(stream: UnixStream, status: watch::Receiver<Snapshot>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let response = match status::decode::<Request>(&line) {
            Ok(Request::GetStatus) => Response::Status(status.borrow().clone()),
            Err(e) => Response::Error {
                message: format!("Invalid request: {e}"),
            },
        };

        let encoded = match status::encode(&response) {
            Ok(s) => s,
            Err(e) => {
                log::error!("Failed to encode response: {e}");
                continue;
            }
        };

        if writer.write_all(encoded.as_bytes()).await.is_err() {
            break; // Client disconnected
        }
    }
}
