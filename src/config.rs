//! Configuration file handling.
//!
//! Settings come from `church-analytics.toml` in the working directory, or
//! the file passed with `--config`. Every key is optional.

use std::path::Path;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ChurchId;

pub const DEFAULT_CONFIG_FILE: &str = "church-analytics.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tenant: TenantConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Church used when a command is run without `--church`.
    #[serde(default = "default_fallback_church_id")]
    pub fallback_church_id: Uuid,
}

impl Default for TenantConfig {
    fn default() -> Self {
        Self {
            fallback_church_id: default_fallback_church_id(),
        }
    }
}

fn default_fallback_church_id() -> Uuid {
    Uuid::nil()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// IANA zone that month and year boundaries are drawn in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // Surface a bad zone at startup rather than on first use.
        config.timezone()?;
        Ok(config)
    }

    /// Loads `path` if given, else the default file if it exists, else
    /// built-in defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn timezone(&self) -> Result<Tz> {
        self.calendar
            .timezone
            .parse::<Tz>()
            .map_err(|e| {
                anyhow::anyhow!("invalid calendar.timezone {:?}: {e}", self.calendar.timezone)
            })
    }

    pub fn church_or_fallback(&self, church: Option<Uuid>) -> ChurchId {
        ChurchId(church.unwrap_or(self.tenant.fallback_church_id))
    }
}
