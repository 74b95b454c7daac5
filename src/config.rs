use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::sensing::CapsenseLayout;
use crate::session::DateRollover;

const DEFAULT_CONFIG_FILE: &str = "picologger.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub log_dir: PathBuf,
    /// Yield between accept attempts.
    pub accept_tick_ms: u64,
    /// Pause after an unexpected accept failure.
    pub accept_backoff_ms: u64,
    pub read_timeout_secs: u64,
    pub max_consecutive_errors: u32,
    pub batch_runs: u32,
    pub batch_gap_secs: u64,
    pub date_rollover: DateRollover,
    /// `null` runs without a capsense board.
    pub capsense: Option<CapsenseLayout>,
    /// Probability (0..1) that a simulated environmental read fails.
    pub simulate_env_faults: f64,
    pub verbose: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".into(),
            log_dir: PathBuf::from("logs"),
            accept_tick_ms: 10,
            accept_backoff_ms: 100,
            read_timeout_secs: 5,
            max_consecutive_errors: 5,
            batch_runs: 4,
            batch_gap_secs: 2,
            date_rollover: DateRollover::default(),
            capsense: Some(CapsenseLayout::default()),
            simulate_env_faults: 0.0,
            verbose: false,
        }
    }
}

impl AppConfig {
    /// Loads `PICOLOGGER_CONFIG` (or `picologger.json` when present), then
    /// applies environment overrides.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var_os("PICOLOGGER_CONFIG").map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::from_json(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    fn apply_env(&mut self) {
        if let Ok(bind) = std::env::var("PICOLOGGER_BIND") {
            self.bind_addr = bind;
        }
        if let Some(dir) = std::env::var_os("PICOLOGGER_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        let debug_mode = std::env::var("PICOLOGGER_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        self.verbose |= debug_mode;
    }

    pub fn accept_tick(&self) -> Duration {
        Duration::from_millis(self.accept_tick_ms)
    }

    pub fn accept_backoff(&self) -> Duration {
        Duration::from_millis(self.accept_backoff_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
