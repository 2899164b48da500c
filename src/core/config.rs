//! Application configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::message_parser::MessageProgressParser;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Main progress configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Message phases, each mapped onto a slice of the overall bar
    pub phases: Vec<PhaseConfig>,
    /// Default step names for multi-step channel downloads
    pub steps: Vec<String>,
    pub log_level: String, // "error", "warn", "info", "debug", "trace"
    /// How often a polling controller drains pending progress
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub label: String,
    pub low: f64,
    pub high: f64,
}

impl PhaseConfig {
    pub fn new(label: impl Into<String>, low: f64, high: f64) -> Self {
        Self {
            label: label.into(),
            low,
            high,
        }
    }
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            // Transcripts fill the first half of the bar, thumbnails the second.
            // Each step's slice of the bar matches its phase range.
            phases: vec![
                PhaseConfig::new("Transcript download:", 0.0, 50.0),
                PhaseConfig::new("Thumbnail download:", 50.0, 100.0),
            ],
            steps: vec![
                "Download transcripts".to_string(),
                "Download thumbnails".to_string(),
            ],
            log_level: "info".to_string(),
            poll_interval_ms: 50,
        }
    }
}

impl ProgressConfig {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, creating a default file if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;

            let config: ProgressConfig =
                serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;

            config
                .validate()
                .with_context(|| format!("Invalid configuration in {:?}", path))?;

            tracing::info!("Loaded configuration from: {:?}", path);
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!("Created default configuration at: {:?}", path);
            Ok(config)
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = self.export()?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Saved configuration to: {:?}", path);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "channelprogress", "channel-progress")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    /// Export configuration as JSON string
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "Failed to export configuration")
    }

    /// Parse and validate configuration from a JSON string
    pub fn import(json: &str) -> Result<Self> {
        let config: ProgressConfig =
            serde_json::from_str(json).with_context(|| "Failed to parse imported configuration")?;

        config
            .validate()
            .with_context(|| "Imported configuration is invalid")?;

        Ok(config)
    }

    /// Build a message parser from the configured phases
    pub fn build_parser(&self) -> Result<MessageProgressParser> {
        let mut parser = MessageProgressParser::new();
        for phase in &self.phases {
            parser
                .register_pattern(phase.label.clone(), (phase.low, phase.high))
                .with_context(|| format!("Invalid phase '{}'", phase.label))?;
        }
        Ok(parser)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let mut labels = HashSet::new();
        for phase in &self.phases {
            if phase.label.trim().is_empty() {
                anyhow::bail!("Phase labels must not be empty");
            }
            if !labels.insert(phase.label.as_str()) {
                anyhow::bail!("Duplicate phase label: {}", phase.label);
            }
            if !(0.0..=100.0).contains(&phase.low) || !(0.0..=100.0).contains(&phase.high) {
                anyhow::bail!("Phase '{}' must lie within 0-100", phase.label);
            }
            if phase.low > phase.high {
                anyhow::bail!(
                    "Phase '{}' has low bound {} above high bound {}",
                    phase.label,
                    phase.low,
                    phase.high
                );
            }
        }

        if self.steps.iter().any(|s| s.trim().is_empty()) {
            anyhow::bail!("Step names must not be empty");
        }

        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level: must be 'error', 'warn', 'info', 'debug', or 'trace'"
            );
        }

        if self.poll_interval_ms == 0 || self.poll_interval_ms > 10_000 {
            anyhow::bail!("Poll interval should be between 1 and 10000 ms");
        }

        Ok(())
    }
}
