//! Application settings loaded from `config.toml`.
//!
//! Every section is optional; a missing file yields the defaults so a fresh
//! install can run without any configuration.

use crate::core::cycle::CurrentCyclePolicy;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "SALON_LEDGER_CONFIG";

/// Default refusal threshold for a cycle migration run.
pub const DEFAULT_MAX_ERROR_RATE: f64 = 0.10;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Known stylists and their display names
    pub stylists: Vec<StylistConfig>,
    /// Cycle migration settings
    pub migration: MigrationSettings,
    /// Cycle resolution settings
    pub cycles: CycleSettings,
}

/// A stylist entry in config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct StylistConfig {
    /// User id supplied by the identity provider
    pub id: String,
    /// Name shown in statistics
    pub name: String,
}

/// `[migration]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Fraction of unassignable or malformed records above which a run aborts
    pub max_error_rate: f64,
    /// Where pre-run snapshots are written; no snapshot when unset
    pub backup_dir: Option<PathBuf>,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            max_error_rate: DEFAULT_MAX_ERROR_RATE,
            backup_dir: Some(PathBuf::from("backups")),
        }
    }
}

/// `[cycles]` section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// How "the current cycle" is chosen when several contain today
    pub current_policy: CurrentCyclePolicy,
}

/// Parses settings from TOML text.
///
/// # Errors
/// Returns [`Error::Config`] on invalid TOML or an out-of-range error rate.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;

    let rate = settings.migration.max_error_rate;
    if !(0.0..=1.0).contains(&rate) {
        return Err(Error::Config {
            message: format!("migration.max_error_rate must be between 0 and 1, got {rate}"),
        });
    }

    Ok(settings)
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or does not parse.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;
    parse_settings(&contents)
}

/// Loads settings from `$SALON_LEDGER_CONFIG` or `./config.toml`.
///
/// A missing file is not an error: defaults are returned instead.
pub fn load_default_settings() -> Result<Settings> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string());
    if Path::new(&path).exists() {
        load_settings(&path)
    } else {
        info!("No configuration file at {path}, using defaults");
        Ok(Settings::default())
    }
}
