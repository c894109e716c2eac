//! TOML configuration loader with validation.
//!
//! Thin layer over [`AsservConfig`]: parse, validate, log a summary.

use std::path::{Path, PathBuf};

use asserv_common::config::{ConfigError, ConfigLoader};
use asserv_common::motion::config::AsservConfig;
use tracing::info;

/// Validated configuration, ready for runtime use.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub asserv: AsservConfig,
    /// File the configuration came from, if any.
    pub source: Option<PathBuf>,
}

impl LoadedConfig {
    /// One-line description for the startup log.
    pub fn summary(&self) -> String {
        let c = &self.asserv;
        format!(
            "{} Hz, position every {} cycles, wheelbase {} mm, {:.5} mm/tick, estimator {:?}",
            c.cycle.frequency_hz,
            c.cycle.position_divisor,
            c.robot.wheelbase_mm,
            c.robot.mm_per_tick(),
            c.estimator.kind,
        )
    }
}

/// Load and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    let asserv = AsservConfig::load(path).map_err(|e| match e {
        ConfigError::FileNotFound => ConfigError::IoError(format!("{} not found", path.display())),
        other => other,
    })?;
    asserv.validate()?;
    info!(path = %path.display(), service = %asserv.shared.service_name, "configuration loaded");
    Ok(LoadedConfig {
        asserv,
        source: Some(path.to_path_buf()),
    })
}

/// Parse and validate a configuration held in memory.
pub fn load_config_from_str(content: &str) -> Result<LoadedConfig, ConfigError> {
    let asserv = AsservConfig::from_toml(content)?;
    asserv.validate()?;
    Ok(LoadedConfig {
        asserv,
        source: None,
    })
}

// ─── Tests ──────────────────────────────────────────────────────────
