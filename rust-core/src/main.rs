//! Safewatch command-line host.
//!
//! Drives the monitor without a device: boot reconciliation runs at start,
//! the heartbeat runs in the background, and events are read line by line
//! from stdin. Notifications and UI events are written to the log.
//!
//! ```text
//! accel <x> <y> <z>   accelerometer sample in m/s²
//! say <text>          speech transcript
//! key up|down|power   key-down event
//! shutdown            orderly shutdown signal
//! status              forced-shutdown status
//! ack                 acknowledge a forced shutdown
//! log                 print the activation log
//! quit
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use smol::io::{AsyncBufReadExt, BufReader};
use smol::stream::StreamExt;
use tracing::{info, warn};

use safewatch::location::FixedLocationProvider;
use safewatch::notify::{LogNotifier, LogSink};
use safewatch::{
    Clock, Collaborators, FileStore, KeyCode, KeyEvent, KeyValueStore, LocationProvider,
    MemoryStore, MonitorConfig, NoLocationProvider, SafetyMonitor, SensorSample, SystemClock,
};

#[derive(Parser, Debug)]
#[command(name = "safewatch")]
#[command(about = "Personal-safety monitor driven from stdin", long_about = None)]
struct Args {
    /// State file; in-memory state if omitted
    #[arg(long, value_name = "PATH")]
    state: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Calibrated preset, used when no config file is given
    #[arg(long, default_value = "strict")]
    preset: String,

    /// Fixed latitude reported as the device location
    #[arg(long, requires = "lon", allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Fixed longitude reported as the device location
    #[arg(long, requires = "lat", allow_negative_numbers = true)]
    lon: Option<f64>,
}

/// One parsed stdin line.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    Accel([f32; 3]),
    Say(String),
    Key(KeyCode),
    Shutdown,
    Status,
    Ack,
    Log,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let command = match word {
            "accel" => {
                let values = rest
                    .split_whitespace()
                    .map(str::parse::<f32>)
                    .collect::<Result<Vec<_>, _>>()
                    .context("accel expects three numbers")?;
                let [x, y, z] = values[..] else {
                    bail!("accel expects three numbers, got {}", values.len());
                };
                Command::Accel([x, y, z])
            }
            "say" => Command::Say(rest.to_string()),
            "key" => Command::Key(match rest {
                "up" => KeyCode::VolumeUp,
                "down" => KeyCode::VolumeDown,
                "power" => KeyCode::Power,
                other => bail!("unknown key {other:?}"),
            }),
            "shutdown" => Command::Shutdown,
            "status" => Command::Status,
            "ack" => Command::Ack,
            "log" => Command::Log,
            "quit" | "exit" => Command::Quit,
            other => bail!("unknown command {other:?}"),
        };
        Ok(Some(command))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => MonitorConfig::preset(&args.preset)
            .with_context(|| format!("unknown preset {:?}", args.preset))?,
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn KeyValueStore> = match &args.state {
        Some(path) => Arc::new(FileStore::open(path)),
        None => Arc::new(MemoryStore::new()),
    };
    let locations: Arc<dyn LocationProvider> = match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => {
            Arc::new(FixedLocationProvider::new(lat, lon, Arc::clone(&clock)))
        }
        _ => Arc::new(NoLocationProvider),
    };

    let monitor = SafetyMonitor::new(
        config,
        Collaborators {
            store,
            notifier: Arc::new(LogNotifier),
            locations,
            sink: Arc::new(LogSink),
            clock: Arc::clone(&clock),
        },
    );

    smol::block_on(async {
        let report = monitor.on_boot().await;
        info!(verdict = ?report.verdict, "boot reconciled");
        let heartbeat = monitor.start_heartbeat();

        let stdin = BufReader::new(smol::Unblock::new(std::io::stdin()));
        let mut lines = stdin.lines();
        while let Some(line) = lines.next().await {
            let line = line.context("reading stdin")?;
            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    warn!("{e:#}");
                    continue;
                }
            };
            if !run(&monitor, clock.as_ref(), command)? {
                break;
            }
        }

        heartbeat.stop().await;
        monitor.flush().await;
        Ok::<(), anyhow::Error>(())
    })
}

/// Execute one command. Returns `false` on quit.
fn run(monitor: &SafetyMonitor, clock: &dyn Clock, command: Command) -> Result<bool> {
    match command {
        Command::Accel(accel) => {
            monitor.on_sensor_sample(&SensorSample::new(clock.now_ms(), accel));
        }
        Command::Say(text) => {
            monitor.on_transcript(&text);
        }
        Command::Key(code) => {
            monitor.on_key_event(KeyEvent::new(code, clock.now_ms()));
        }
        Command::Shutdown => {
            monitor.on_shutdown_signal();
        }
        Command::Status => {
            let status = monitor.forced_shutdown_status();
            println!("forced_shutdown_detected: {}", status.detected);
            if let Some(message) = status.message {
                println!("{message}");
            }
        }
        Command::Ack => {
            monitor.acknowledge_forced_shutdown();
        }
        Command::Log => {
            for event in monitor.activation_log() {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Command::Quit => return Ok(false),
    }
    Ok(true)
}
