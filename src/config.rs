/// Application configuration — persisted as TOML (`config.toml`) in a
/// caller-chosen directory.
///
/// First run: no file means defaults; `log_path` empty means the log file is
/// auto-detected from the game client's standard install locations.
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::parser::DEFAULT_PLAYER_LABEL;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Explicit log file path. Empty = scan the standard locations.
    #[serde(default)]
    pub log_path: PathBuf,

    /// Tailer fallback poll period in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Label substituted for the local player in parsed events.
    #[serde(default = "default_player_label")]
    pub player_label: String,
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_player_label() -> String {
    DEFAULT_PLAYER_LABEL.to_owned()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_path:         PathBuf::new(),
            poll_interval_ms: default_poll_interval_ms(),
            player_label:     default_player_label(),
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Resolve the log file to monitor: the explicit path when it points at
    /// an existing file, otherwise the first standard location that does.
    pub fn find_log_file(&self) -> Option<PathBuf> {
        if !self.log_path.as_os_str().is_empty() {
            if self.log_path.is_file() {
                return Some(self.log_path.clone());
            }
            tracing::warn!(
                path = %self.log_path.display(),
                "configured log path does not exist — falling back to standard locations"
            );
        }

        let found = candidate_log_paths().into_iter().find(|p| p.is_file());
        match &found {
            Some(p) => tracing::info!(path = %p.display(), "auto-detected log file"),
            None => tracing::info!("log file not found in any standard location"),
        }
        found
    }
}

/// Standard locations of the AOC client log, most likely first. The last
/// entry is a local `AOC.log` for testing against a copied file.
fn candidate_log_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    let home = std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from);

    if let Some(home) = home {
        candidates.push(
            home.join("AppData").join("Local").join("AOC").join("Saved").join("Logs").join("AOC.log"),
        );
        candidates.push(home.join("Documents").join("AOC").join("Logs").join("AOC.log"));
        candidates.push(home.join("AppData").join("Roaming").join("AOC").join("Logs").join("AOC.log"));
    }

    candidates.push(PathBuf::from("AOC.log"));
    candidates
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn load_or_default(config_dir: &Path) -> Result<AppConfig> {
    let path = config_dir.join("config.toml");
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let cfg: AppConfig =
            toml::from_str(&raw).map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        Ok(cfg)
    } else {
        Ok(AppConfig::default())
    }
}

pub fn save(config: &AppConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join("config.toml"), raw)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    #[test]
    fn round_trips_config() {
        let dir = tempdir().unwrap();
        let cfg = AppConfig {
            log_path:         PathBuf::from("/tmp/some/AOC.log"),
            poll_interval_ms: 250,
            player_label:     "Stonebraid".to_owned(),
        };

        save(&cfg, dir.path()).unwrap();

        let loaded = load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.log_path, PathBuf::from("/tmp/some/AOC.log"));
        assert_eq!(loaded.poll_interval_ms, 250);
        assert_eq!(loaded.player_label, "Stonebraid");
    }

    #[test]
    fn returns_default_when_missing() {
        let dir = tempdir().unwrap();
        let cfg = load_or_default(dir.path()).unwrap();
        assert!(cfg.log_path.as_os_str().is_empty());
        assert_eq!(cfg.poll_interval_ms, 100);
        assert_eq!(cfg.player_label, "You");
    }

    #[test]
    fn explicit_log_path_wins_when_present() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "x").unwrap();
        f.flush().unwrap();

        let cfg = AppConfig { log_path: f.path().to_path_buf(), ..Default::default() };
        assert_eq!(cfg.find_log_file().unwrap(), f.path());
    }

    #[test]
    fn poll_interval_converts_to_duration() {
        let cfg = AppConfig { poll_interval_ms: 250, ..Default::default() };
        assert_eq!(cfg.poll_interval(), Duration::from_millis(250));
    }
}
