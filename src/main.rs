use std::env;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rssi_positioning::core::{DEFAULT_MAX_READING_AGE_MS, DEFAULT_RELOAD_INTERVAL_MS};
use rssi_positioning::utils::logging::init_logging;
use rssi_positioning::{now_ms, ConfigReloader, PositionEngine, SignalTable, SnapshotHandle};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_CONFIG_PATH: &str = "config.json";
const DEFAULT_REPORT_INTERVAL_MS: u64 = 1_000;

/// Runtime settings read from the environment
#[derive(Debug, Clone)]
struct Settings {
    config_path: PathBuf,
    reload_interval: Duration,
    report_interval: Duration,
    max_reading_age_ms: u64,
    retention_ms: Option<u64>,
}

impl Settings {
    fn from_env() -> Result<Self, BoxError> {
        let config_path = env::var("RSSI_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        Ok(Self {
            config_path,
            reload_interval: Duration::from_millis(
                env_u64("RSSI_RELOAD_MS")?.unwrap_or(DEFAULT_RELOAD_INTERVAL_MS),
            ),
            report_interval: Duration::from_millis(
                env_u64("RSSI_REPORT_MS")?.unwrap_or(DEFAULT_REPORT_INTERVAL_MS),
            ),
            max_reading_age_ms: env_u64("RSSI_MAX_AGE_MS")?.unwrap_or(DEFAULT_MAX_READING_AGE_MS),
            retention_ms: env_u64("RSSI_RETENTION_MS")?,
        })
    }
}

fn env_u64(name: &str) -> Result<Option<u64>, BoxError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{} must be a non-negative integer: {}", name, e).into()),
        Err(_) => Ok(None),
    }
}

fn usage(program: &str) {
    eprintln!("Usage: {}                 read anchor reports from stdin, print positions", program);
    eprintln!("   or: {} --once <file>   compute positions once for a file of reports", program);
    eprintln!();
    eprintln!("Environment: RSSI_CONFIG_PATH, RSSI_RELOAD_MS, RSSI_REPORT_MS, RSSI_MAX_AGE_MS, RSSI_RETENTION_MS");
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    init_logging()?;

    let args: Vec<String> = env::args().collect();
    let program = args.first().map_or("rssi-positioning", |s| s.as_str());
    let settings = Settings::from_env()?;

    let handle = Arc::new(SnapshotHandle::load_or_default(&settings.config_path));
    let engine = PositionEngine::new(Arc::new(SignalTable::new()), Arc::clone(&handle))
        .with_max_reading_age(settings.max_reading_age_ms)
        .with_retention(settings.retention_ms);

    match args.get(1).map(String::as_str) {
        None => serve(engine, handle, &settings).await,
        Some("--once") if args.len() == 3 => run_once(&engine, &args[2]),
        _ => {
            usage(program);
            Err("invalid arguments".into())
        }
    }
}

/// Ingest every line of `path` as a report received now and print the result
fn run_once(engine: &PositionEngine, path: &str) -> Result<(), BoxError> {
    let content = fs::read_to_string(path)?;
    let now = now_ms();
    let accepted = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| engine.ingest_text(line, now).is_ok())
        .count();
    info!(accepted, devices = engine.table().len(), "Reports ingested");

    let positions = engine.compute_all(now);
    println!("{}", serde_json::to_string_pretty(&positions)?);
    Ok(())
}

/// Stream reports from stdin until interrupted, printing positions periodically
async fn serve(
    engine: PositionEngine,
    handle: Arc<SnapshotHandle>,
    settings: &Settings,
) -> Result<(), BoxError> {
    let shutdown = CancellationToken::new();
    let reloader = ConfigReloader::new(handle, &settings.config_path)
        .with_interval(settings.reload_interval);
    let reload_task = tokio::spawn(reloader.run(shutdown.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_open = true;
    let mut report_tick = tokio::time::interval(settings.report_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        report_interval_ms = settings.report_interval.as_millis() as u64,
        "Reading anchor reports from stdin"
    );

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupt received, shutting down");
                break;
            }

            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    // Malformed reports are logged inside and dropped
                    let _ = engine.ingest_text(&line, now_ms());
                }
                Ok(None) => {
                    info!("Report input closed");
                    input_open = false;
                }
                Err(err) => {
                    warn!(error = %err, "Failed to read report input");
                    input_open = false;
                }
            },

            _ = report_tick.tick() => {
                let now = now_ms();
                engine.sweep_inactive(now);
                println!("{}", engine.positions_json(now)?);
            }
        }
    }

    shutdown.cancel();
    reload_task.await?;
    Ok(())
}
