// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! fanctl-status: print the daemon's latest sensor and fan state.

use anyhow::{Context, Result};
use clap::Parser;
use linux_fan_control::config;
use linux_fan_control::status::{self, Request, Response, Snapshot};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "fanctl-status", about = "Show fan daemon status")]
struct Cli {
    /// Daemon status socket.
    #[arg(short, long, default_value = config::DEFAULT_SOCKET_PATH)]
    socket: String,

    /// Print the raw snapshot as JSON.
    #[arg(long)]
    json: bool,
}

// ---------------------------------------------------------------------------
// Daemon connection
// ---------------------------------------------------------------------------

struct Connection {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Connection {
    fn connect(path: &str) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .with_context(|| format!("Is fanctl-daemon running? Could not connect to {path}"))?;
        stream.set_read_timeout(Some(Duration::from_secs(2)))?;
        let writer = stream.try_clone()?;
        let reader = BufReader::new(stream);
        Ok(Self { reader, writer })
    }

    fn send_request(&mut self, req: &Request) -> Result<Response> {
        let encoded = status::encode(req)?;
        self.writer.write_all(encoded.as_bytes())?;
        self.writer.flush()?;

        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        if line.is_empty() {
            anyhow::bail!("Daemon closed the connection");
        }
        Ok(status::decode(&line)?)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn fmt_opt<T: std::fmt::Display>(value: Option<T>, suffix: &str) -> String {
    match value {
        Some(v) => format!("{v}{suffix}"),
        None => "-".to_string(),
    }
}

fn print_snapshot(snapshot: &Snapshot) {
    println!("tick {}", snapshot.tick);
    println!();
    println!("{:<24} {:<6} {:>10}  {}", "SENSOR", "KIND", "TEMP", "STATE");
    for s in &snapshot.sensors {
        let mut state = if s.ok { "ok" } else { "stale" }.to_string();
        if let Some(hottest) = &s.hottest {
            state.push_str(&format!(" (max: {hottest})"));
        }
        println!(
            "{:<24} {:<6} {:>10}  {}",
            s.name,
            s.kind,
            fmt_opt(s.value.map(|v| format!("{v:.1}")), "°C"),
            state
        );
    }

    println!();
    println!(
        "{:<16} {:<20} {:<12} {:>10} {:>7} {:>5}",
        "FAN", "SENSOR", "CURVE", "TEMP", "SPEED", "PWM"
    );
    for f in &snapshot.fans {
        let pending = if f.pending { " *" } else { "" };
        println!(
            "{:<16} {:<20} {:<12} {:>10} {:>7} {:>5}{}",
            f.name,
            f.sensor,
            f.curve,
            fmt_opt(f.temperature.map(|v| format!("{v:.1}")), "°C"),
            fmt_opt(f.fan_percent.map(|v| format!("{v:.0}")), "%"),
            fmt_opt(f.pwm, ""),
            pending
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let mut conn = Connection::connect(&cli.socket)?;
    log::debug!("Connected to {}", cli.socket);

    match conn.send_request(&Request::GetStatus)? {
        Response::Status(snapshot) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
            Ok(())
        }
        Response::Error { message } => anyhow::bail!("Daemon error: {message}"),
    }
}
