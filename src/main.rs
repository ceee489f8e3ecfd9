/// CLI front end: starts monitoring and prints one JSON snapshot line per
/// second until Ctrl-C.
///
/// Environment:
///   AOC_METER_CONFIG   directory holding config.toml (default ".")
///   AOC_METER_LOG_DIR  if set, tracing output goes to a daily-rolling file
///                      there instead of stderr
///   RUST_LOG           standard env-filter directives
///
/// An optional first argument overrides the configured log file path.
use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

use aoc_dps_meter::{config, Monitor};

fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("aoc_dps_meter=info".parse().expect("static directive"));

    if let Some(log_dir) = std::env::var_os("AOC_METER_LOG_DIR").map(PathBuf::from) {
        let _ = std::fs::create_dir_all(&log_dir);
        let file_appender = tracing_appender::rolling::daily(&log_dir, "meter.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // The guard flushes on drop; it must live as long as the process.
        std::mem::forget(guard);

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .with_ansi(false) // log files should not contain ANSI colour codes
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    // Route panics through tracing so they land in the log file too.
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config_dir = std::env::var_os("AOC_METER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut cfg = config::load_or_default(&config_dir)?;

    if let Some(path) = std::env::args().nth(1) {
        cfg.log_path = PathBuf::from(path);
    }

    let mut monitor = Monitor::new(cfg);
    let path = monitor.start()?;
    tracing::info!(path = %path.display(), "meter running — Ctrl-C to stop");

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                let snap = monitor.stats();
                println!("{}", serde_json::to_string(&snap)?);
            }
        }
    }

    monitor.stop().await;
    tracing::info!("meter stopped");
    Ok(())
}
