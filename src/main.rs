use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use serde_json::Value;

use tower_jumps::pipeline::DEFAULT_STREAM_CAPACITY;
use tower_jumps::{init_logging, AnalysisConfig, EventType, RawRow, StopReason, StreamController};

const USAGE: &str = "usage: tower-jumps <rows.json> [config.json]";

fn load_rows(path: &Path) -> Result<Vec<RawRow>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read rows from {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse rows in {}", path.display()))?;
    let Value::Array(items) = value else {
        bail!("{} must contain a JSON array of row objects", path.display());
    };

    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match item.as_object() {
            Some(object) => rows.push(RawRow::from_json_object(object)),
            None => warn!("skipping row {i}: not a JSON object"),
        }
    }
    Ok(rows)
}

async fn run(rows_path: PathBuf, config_path: Option<PathBuf>) -> Result<ExitCode> {
    let config = match config_path {
        Some(path) => AnalysisConfig::load(&path)?,
        None => AnalysisConfig::default(),
    };
    let rows = load_rows(&rows_path)?;
    info!("loaded {} rows from {}", rows.len(), rows_path.display());

    let mut controller = StreamController::new();
    controller.start(rows, config, DEFAULT_STREAM_CAPACITY)?;

    let stdout = std::io::stdout();
    let mut failed = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            event = controller.next_event() => {
                let Some(event) = event else { break };
                if event.kind == EventType::Error {
                    error!("{}", event.message);
                    failed = true;
                }
                let line = event.to_json().context("Failed to serialize event")?;
                let mut out = stdout.lock();
                writeln!(out, "{line}").context("Failed to write event")?;
                out.flush().context("Failed to flush stdout")?;
            }
            _ = &mut ctrl_c => {
                warn!("interrupted, cancelling analysis");
                controller.cancel();
                break;
            }
        }
    }

    let outcome = controller.join().await?;
    info!(
        "analysis stream ended ({:?}): {} events, {} intervals",
        outcome.reason, outcome.events_sent, outcome.intervals_analyzed
    );

    Ok(match outcome.reason {
        _ if failed => ExitCode::FAILURE,
        StopReason::Cancelled => ExitCode::from(130),
        _ => ExitCode::SUCCESS,
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let mut args = std::env::args_os().skip(1);
    let Some(rows_path) = args.next().map(PathBuf::from) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    let config_path = args.next().map(PathBuf::from);

    match run(rows_path, config_path).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
