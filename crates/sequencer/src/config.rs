//! Configuration file handling
//!
//! The file is optional and read-only; every setting has a default matching
//! the tool's built-in behaviour.

use crate::command::{ParseMode, TransferSettings};
use crate::session::SessionSettings;
use anyhow::{Context, Result, anyhow};
use common::{DeviceIds, Verbosity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeqConfig {
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub commands: CommandConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Endpoint number (1-15) used for both directions
    ///
    /// Transfers always use endpoint 1 unless the file opts into another one.
    #[serde(default = "TransferConfig::default_endpoint")]
    pub endpoint: u8,
    /// Timeout for each single-byte transfer
    #[serde(default = "TransferConfig::default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            endpoint: Self::default_endpoint(),
            timeout_ms: Self::default_timeout_ms(),
        }
    }
}

impl TransferConfig {
    fn default_endpoint() -> u8 {
        crate::command::DEFAULT_ENDPOINT
    }

    fn default_timeout_ms() -> u64 {
        100
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "debug".to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Reject command tokens that are not clean hex numbers
    #[serde(default)]
    pub strict: bool,
}

/// Values given on the command line, which win over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub quiet: bool,
    pub log_level: Option<String>,
    pub strict: bool,
}

impl SeqConfig {
    /// Load and validate configuration from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: SeqConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        if !(1..=15).contains(&self.transfer.endpoint) {
            return Err(anyhow!(
                "Invalid endpoint {}, must be between 1 and 15",
                self.transfer.endpoint
            ));
        }

        if self.transfer.timeout_ms == 0 {
            return Err(anyhow!("Transfer timeout must be greater than 0"));
        }

        Ok(())
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            endpoint: self.transfer.endpoint,
            timeout: Duration::from_millis(self.transfer.timeout_ms),
        }
    }

    /// Combine the file with command-line overrides into run settings
    pub fn session_settings(&self, target: DeviceIds, overrides: &Overrides) -> SessionSettings {
        let verbosity = if overrides.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Level(
                overrides
                    .log_level
                    .clone()
                    .unwrap_or_else(|| self.logging.level.clone()),
            )
        };

        let parse_mode = if overrides.strict || self.commands.strict {
            ParseMode::Strict
        } else {
            ParseMode::Permissive
        };

        SessionSettings {
            target,
            transfer: self.transfer_settings(),
            parse_mode,
            verbosity,
        }
    }
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SeqConfig::default();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.transfer_settings(), TransferSettings::default());
        assert!(!config.commands.strict);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = SeqConfig::from_toml("").unwrap();
        assert_eq!(config.transfer.endpoint, 1);
        assert_eq!(config.transfer.timeout_ms, 100);
    }

    #[test]
    fn test_endpoint_override_is_opt_in() {
        let config = SeqConfig::from_toml("[transfer]\ntimeout_ms = 250").unwrap();
        assert_eq!(config.transfer_settings().out_address(), 0x01);
        assert_eq!(config.transfer_settings().in_address(), 0x81);

        let config = SeqConfig::from_toml("[transfer]\nendpoint = 2").unwrap();
        assert_eq!(config.transfer_settings().out_address(), 0x02);
        assert_eq!(config.transfer_settings().in_address(), 0x82);
    }

    #[test]
    fn test_validate_log_level() {
        assert!(SeqConfig::from_toml("[logging]\nlevel = \"info\"").is_ok());
        assert!(SeqConfig::from_toml("[logging]\nlevel = \"loud\"").is_err());
    }

    #[test]
    fn test_validate_transfer() {
        assert!(SeqConfig::from_toml("[transfer]\nendpoint = 0").is_err());
        assert!(SeqConfig::from_toml("[transfer]\nendpoint = 16").is_err());
        assert!(SeqConfig::from_toml("[transfer]\ntimeout_ms = 0").is_err());
        assert!(SeqConfig::from_toml("[transfer]\nendpoint = 2\ntimeout_ms = 250").is_ok());
    }

    #[test]
    fn test_quiet_overrides_level() {
        let config = SeqConfig::default();
        let overrides = Overrides {
            quiet: true,
            log_level: Some("trace".to_string()),
            strict: false,
        };
        let settings = config.session_settings(DeviceIds::new(1, 2), &overrides);
        assert_eq!(settings.verbosity, Verbosity::Quiet);
        assert_eq!(settings.parse_mode, ParseMode::Permissive);
    }

    #[test]
    fn test_cli_level_wins_over_file() {
        let config = SeqConfig::from_toml("[logging]\nlevel = \"warn\"\n[commands]\nstrict = true")
            .unwrap();
        let overrides = Overrides {
            log_level: Some("error".to_string()),
            ..Default::default()
        };
        let settings = config.session_settings(DeviceIds::new(1, 2), &overrides);
        assert_eq!(settings.verbosity, Verbosity::Level("error".to_string()));
        assert_eq!(settings.parse_mode, ParseMode::Strict);
    }
}
