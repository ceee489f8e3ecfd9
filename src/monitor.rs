/// Wires the pipeline together: tailer -> parser -> aggregator.
///
/// The parse-and-aggregate path runs synchronously inside the tailer's
/// background task, one batch at a time; snapshot queries go through the
/// shared aggregator's lock and can race only with that single writer.
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::aggregator::SharedAggregator;
use crate::config::AppConfig;
use crate::parser::EventParser;
use crate::snapshot::{AbilityRow, SessionSnapshot, TargetRow};
use crate::tailer::{BatchHandler, Tailer, TailerError};

#[derive(Debug, Error)]
pub enum MeterError {
    #[error("log file not found in any known location")]
    LogFileNotFound,
    #[error("monitoring already running")]
    AlreadyMonitoring,
    #[error(transparent)]
    Tailer(#[from] TailerError),
}

pub struct Monitor {
    config:     AppConfig,
    aggregator: SharedAggregator,
    tailer:     Option<Tailer>,
    log_path:   Option<PathBuf>,
}

impl Monitor {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            aggregator: SharedAggregator::new(),
            tailer:     None,
            log_path:   None,
        }
    }

    /// Discover the log file and start tailing it. A fresh tailer is built
    /// per start; must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<PathBuf, MeterError> {
        if self.tailer.is_some() {
            return Err(MeterError::AlreadyMonitoring);
        }

        let path = self.config.find_log_file().ok_or(MeterError::LogFileNotFound)?;

        let parser = EventParser::new(self.config.player_label.clone());
        let aggregator = self.aggregator.clone();
        let handler: BatchHandler = Box::new(move |batch: Vec<String>| {
            for line in &batch {
                if let Some(event) = parser.parse(line) {
                    aggregator.apply(event);
                }
            }
        });

        let mut tailer = Tailer::new(path.clone(), self.config.poll_interval(), handler);
        tailer.start()?;

        tracing::info!(path = %path.display(), "monitoring started");
        self.tailer = Some(tailer);
        self.log_path = Some(path.clone());
        Ok(path)
    }

    /// Stop tailing and mark the session inactive. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(mut tailer) = self.tailer.take() {
            tailer.stop().await;
            self.aggregator.end_session();
            tracing::info!("monitoring stopped");
        }
    }

    /// Discard the session and start a zeroed one; any combat in progress is
    /// simply abandoned. Independent of whether monitoring is running.
    pub fn reset(&self) {
        self.aggregator.reset();
    }

    pub fn is_monitoring(&self) -> bool {
        self.tailer.as_ref().is_some_and(Tailer::is_running)
    }

    /// Path of the file being (or last) monitored.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    pub fn stats(&self) -> SessionSnapshot {
        self.aggregator.stats()
    }

    pub fn abilities(&self) -> Vec<AbilityRow> {
        self.aggregator.abilities()
    }

    pub fn targets(&self) -> Vec<TargetRow> {
        self.aggregator.targets()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::COMBAT_LOG_CATEGORY;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn log_line(message: &str) -> String {
        serde_json::json!({
            "timestamp": "2024-06-15T18:30:01.123Z",
            "frame": 1,
            "category": COMBAT_LOG_CATEGORY,
            "message": message,
        })
        .to_string()
    }

    fn config_for(path: &Path) -> AppConfig {
        AppConfig {
            log_path: path.to_path_buf(),
            poll_interval_ms: 50,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn fails_when_no_log_file_exists() {
        let cfg = config_for(Path::new("/nonexistent/aoc.log"));
        let mut monitor = Monitor::new(cfg);
        assert!(matches!(monitor.start(), Err(MeterError::LogFileNotFound)));
        assert!(!monitor.is_monitoring());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn historical_lines_are_aggregated_at_start() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "{}", log_line("83 damage(Crit) dealt to Foo - Bar")).unwrap();
        writeln!(f, "{}", log_line("20 healing received from Foo - Baz")).unwrap();
        writeln!(
            f,
            "{}",
            log_line("10 damage dealt to Foo - Bar [&Kill][KILL]Killed Foo")
        )
        .unwrap();
        f.flush().unwrap();

        let mut monitor = Monitor::new(config_for(f.path()));
        monitor.start().unwrap();

        // The bulk batch is applied synchronously during start
        let snap = monitor.stats();
        assert_eq!(snap.total_damage, 83); // kill line excluded from damage
        assert_eq!(snap.total_healing, 20);
        assert_eq!(snap.kills, 1);
        assert_eq!(snap.crit_hits, 1);

        monitor.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn picks_up_appended_lines() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "{}", log_line("10 damage dealt to Foo - Bar")).unwrap();
        f.flush().unwrap();

        let mut monitor = Monitor::new(config_for(f.path()));
        monitor.start().unwrap();
        assert_eq!(monitor.stats().total_damage, 10);

        writeln!(f, "{}", log_line("1,234 damage dealt to Foo - Bar")).unwrap();
        f.flush().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(monitor.stats().total_damage, 1244);
        let targets = monitor.targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].damage, 1244);

        monitor.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_twice_fails_and_reset_zeroes() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "{}", log_line("10 damage dealt to Foo - Bar")).unwrap();
        f.flush().unwrap();

        let mut monitor = Monitor::new(config_for(f.path()));
        monitor.start().unwrap();
        assert!(matches!(monitor.start(), Err(MeterError::AlreadyMonitoring)));

        let before = monitor.stats().session_id;
        monitor.reset();
        let snap = monitor.stats();
        assert_eq!(snap.total_damage, 0);
        assert_ne!(snap.session_id, before);

        monitor.stop().await;
        monitor.stop().await; // idempotent
        assert!(!monitor.is_monitoring());
    }
}
