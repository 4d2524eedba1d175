//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Placard configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub scheduler: SchedulerConfig,
    pub organization: OrganizationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Database file; falls back to the platform data directory when unset
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Local time of day the daily transition fires, `HH:MM`
    pub run_at: String,
    /// Civil calendar offset from UTC, `+HH:MM` or `-HH:MM`
    pub utc_offset: String,
    /// Run one catch-up transition as soon as the scheduler starts
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrganizationConfig {
    /// Department whose members may create display sessions
    pub creator_department: String,
    /// Department the inspector pool is drawn from
    pub inspector_department: String,
    /// Department told when a dispatch resource is unavailable
    pub dispatch_department: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            run_at: "06:00".to_string(),
            utc_offset: "+00:00".to_string(),
            run_on_startup: true,
        }
    }
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            creator_department: "notices".to_string(),
            inspector_department: "control".to_string(),
            dispatch_department: "dispatch".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            scheduler: SchedulerConfig::default(),
            organization: OrganizationConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Parse `run_at` into a time of day
    pub fn run_time(&self) -> anyhow::Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at, "%H:%M")
            .with_context(|| format!("Invalid run_at value: {} (expected HH:MM)", self.run_at))
    }

    /// Parse `utc_offset` into a fixed offset
    pub fn offset(&self) -> anyhow::Result<FixedOffset> {
        parse_utc_offset(&self.utc_offset)
    }
}

/// Parse `+HH:MM` / `-HH:MM` (or `Z`) into a [`FixedOffset`]
pub fn parse_utc_offset(value: &str) -> anyhow::Result<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| anyhow!("Invalid UTC offset"));
    }

    let (sign, rest) = match value.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(anyhow!("Invalid utc_offset value: {} (expected ±HH:MM)", value)),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .ok_or_else(|| anyhow!("Invalid utc_offset value: {} (expected ±HH:MM)", value))?;
    let hours: i32 = hours
        .parse()
        .with_context(|| format!("Invalid utc_offset hours: {}", value))?;
    let minutes: i32 = minutes
        .parse()
        .with_context(|| format!("Invalid utc_offset minutes: {}", value))?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(anyhow!("utc_offset out of range: {}", value));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow!("utc_offset out of range: {}", value))
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("PLACARD_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("placard")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or use defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.scheduler.run_time()?;
        self.scheduler.offset()?;
        if self.database.max_connections == 0 {
            return Err(anyhow!("database.max_connections must be at least 1"));
        }
        for (key, value) in [
            ("organization.creator_department", &self.organization.creator_department),
            ("organization.inspector_department", &self.organization.inspector_department),
            ("organization.dispatch_department", &self.organization.dispatch_department),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{} must not be empty", key));
            }
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self
                .database
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(default)".to_string())),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),

            "scheduler.enabled" => Ok(self.scheduler.enabled.to_string()),
            "scheduler.run_at" => Ok(self.scheduler.run_at.clone()),
            "scheduler.utc_offset" => Ok(self.scheduler.utc_offset.clone()),
            "scheduler.run_on_startup" => Ok(self.scheduler.run_on_startup.to_string()),

            "organization.creator_department" => Ok(self.organization.creator_department.clone()),
            "organization.inspector_department" => {
                Ok(self.organization.inspector_department.clone())
            }
            "organization.dispatch_department" => Ok(self.organization.dispatch_department.clone()),

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `placard config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "database.max_connections" => {
                let max: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid max_connections value: {}", value))?;
                if max == 0 {
                    return Err(anyhow!("max_connections must be at least 1"));
                }
                self.database.max_connections = max;
            }

            "scheduler.enabled" => {
                self.scheduler.enabled = value
                    .parse()
                    .with_context(|| format!("Invalid enabled value: {}", value))?;
            }
            "scheduler.run_at" => {
                NaiveTime::parse_from_str(value, "%H:%M")
                    .with_context(|| format!("Invalid run_at value: {} (expected HH:MM)", value))?;
                self.scheduler.run_at = value.to_string();
            }
            "scheduler.utc_offset" => {
                parse_utc_offset(value)?;
                self.scheduler.utc_offset = value.to_string();
            }
            "scheduler.run_on_startup" => {
                self.scheduler.run_on_startup = value
                    .parse()
                    .with_context(|| format!("Invalid run_on_startup value: {}", value))?;
            }

            "organization.creator_department"
            | "organization.inspector_department"
            | "organization.dispatch_department" => {
                let value = value.trim();
                if value.is_empty() {
                    return Err(anyhow!("{} must not be empty", key));
                }
                let slot = match key {
                    "organization.creator_department" => &mut self.organization.creator_department,
                    "organization.inspector_department" => {
                        &mut self.organization.inspector_department
                    }
                    _ => &mut self.organization.dispatch_department,
                };
                *slot = value.to_string();
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `placard config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "database.path",
            "database.max_connections",
            "scheduler.enabled",
            "scheduler.run_at",
            "scheduler.utc_offset",
            "scheduler.run_on_startup",
            "organization.creator_department",
            "organization.inspector_department",
            "organization.dispatch_department",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
