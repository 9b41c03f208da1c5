//! Configuration loading for the review services
//!
//! Resolution priority for every setting:
//! 1. Environment variable (`ROADWATCH_*`)
//! 2. TOML config file (`ROADWATCH_CONFIG` path, or `roadwatch.toml` in the
//!    working directory)
//! 3. Compiled default
//!
//! Settings are read once at startup and are read-only afterwards; there is
//! no hot-reload.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Process-wide settings consumed by the consensus engine and the leveling
/// scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Port for the HTTP surface
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Quorum size `k`: ratings required to resolve a case at one tier
    #[serde(default = "default_quorum_size")]
    pub quorum_size: i64,

    /// Minimum ranking sample `j`: resolved ratings a specialist needs in a
    /// reporting window to be eligible for promotion/demotion
    #[serde(default = "default_min_ranking_sample")]
    pub min_ranking_sample: i64,

    /// Reporting period in days between level reconciliations
    #[serde(default = "default_reporting_period_days")]
    pub reporting_period_days: i64,

    /// Per-call deadline on storage operations, in seconds
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,

    /// Webhook URL for violation notices; notices are skipped when unset
    #[serde(default)]
    pub notify_url: Option<String>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("roadwatch.db")
}

fn default_http_port() -> u16 {
    5740
}

fn default_quorum_size() -> i64 {
    3
}

fn default_min_ranking_sample() -> i64 {
    10
}

fn default_reporting_period_days() -> i64 {
    30
}

fn default_storage_timeout_secs() -> u64 {
    5
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_path: default_database_path(),
            http_port: default_http_port(),
            quorum_size: default_quorum_size(),
            min_ranking_sample: default_min_ranking_sample(),
            reporting_period_days: default_reporting_period_days(),
            storage_timeout_secs: default_storage_timeout_secs(),
            notify_url: None,
        }
    }
}

impl Settings {
    /// Load settings using the documented resolution priority.
    pub fn load() -> Result<Settings> {
        let mut settings = match config_file_path() {
            Some(path) if path.exists() => Settings::from_file(&path)?,
            _ => Settings::default(),
        };
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn from_file(path: &Path) -> Result<Settings> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(path) = std::env::var("ROADWATCH_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var("ROADWATCH_HTTP_PORT") {
            self.http_port = parse_env("ROADWATCH_HTTP_PORT", &port)?;
        }
        if let Ok(k) = std::env::var("ROADWATCH_QUORUM_SIZE") {
            self.quorum_size = parse_env("ROADWATCH_QUORUM_SIZE", &k)?;
        }
        if let Ok(j) = std::env::var("ROADWATCH_MIN_RANKING_SAMPLE") {
            self.min_ranking_sample = parse_env("ROADWATCH_MIN_RANKING_SAMPLE", &j)?;
        }
        if let Ok(days) = std::env::var("ROADWATCH_REPORTING_PERIOD_DAYS") {
            self.reporting_period_days = parse_env("ROADWATCH_REPORTING_PERIOD_DAYS", &days)?;
        }
        if let Ok(secs) = std::env::var("ROADWATCH_STORAGE_TIMEOUT_SECS") {
            self.storage_timeout_secs = parse_env("ROADWATCH_STORAGE_TIMEOUT_SECS", &secs)?;
        }
        if let Ok(url) = std::env::var("ROADWATCH_NOTIFY_URL") {
            self.notify_url = if url.is_empty() { None } else { Some(url) };
        }
        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.quorum_size < 1 {
            return Err(Error::Config(format!(
                "quorum_size must be >= 1, got {}",
                self.quorum_size
            )));
        }
        if self.min_ranking_sample < 1 {
            return Err(Error::Config(format!(
                "min_ranking_sample must be >= 1, got {}",
                self.min_ranking_sample
            )));
        }
        if self.reporting_period_days < 1 {
            return Err(Error::Config(format!(
                "reporting_period_days must be >= 1, got {}",
                self.reporting_period_days
            )));
        }
        if self.storage_timeout_secs == 0 {
            return Err(Error::Config(
                "storage_timeout_secs must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Storage deadline as a std Duration.
    pub fn storage_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.storage_timeout_secs)
    }
}

fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("ROADWATCH_CONFIG") {
        return Some(PathBuf::from(path));
    }
    Some(PathBuf::from("roadwatch.toml"))
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("invalid value for {}: {:?}", name, raw)))
}
