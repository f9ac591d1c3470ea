//! Service configuration.
//!
//! Read from an optional YAML file named by `AGENT_FINANCE_CONFIG`, then
//! overridden field by field from the environment. Every field has a default,
//! so running with no file and no variables is valid.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use shared::Balance;

use crate::domain::{LedgerSettings, DEFAULT_MAX_BACKUPS};

/// Names the YAML config file
pub const CONFIG_PATH_ENV: &str = "AGENT_FINANCE_CONFIG";
/// Overrides `database_url`
pub const DATABASE_URL_ENV: &str = "AGENT_FINANCE_DATABASE_URL";
/// Overrides `bind_address`
pub const BIND_ADDR_ENV: &str = "AGENT_FINANCE_BIND_ADDR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite connection string, e.g. `sqlite:agent_finance.db` or `sqlite::memory:`
    pub database_url: String,

    /// Address the HTTP server listens on
    pub bind_address: String,

    /// Initial balance for a fresh or cleared ledger
    pub initial_balance: Balance,

    /// Number of backups kept in the history
    pub max_backups: usize,

    /// Origin allowed to call the API from a browser
    pub allowed_origin: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:agent_finance.db".to_string(),
            bind_address: "127.0.0.1:3000".to_string(),
            initial_balance: Balance::seed(),
            max_backups: DEFAULT_MAX_BACKUPS,
            allowed_origin: "http://localhost:8080".to_string(),
        }
    }
}

impl AppConfig {
    /// Load from the file named by `AGENT_FINANCE_CONFIG` (if set) and apply
    /// environment overrides
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        let mut config = match path {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let config: AppConfig =
            serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Replace fields with values from `lookup`, keyed by variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.database_url = url;
        }
        if let Some(addr) = lookup(BIND_ADDR_ENV).filter(|v| !v.trim().is_empty()) {
            self.bind_address = addr;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(anyhow!("database_url must not be empty"));
        }
        if self.max_backups == 0 {
            return Err(anyhow!("max_backups must be > 0"));
        }
        if self.initial_balance.is_negative_in_any() {
            return Err(anyhow!("initial_balance amounts must not be negative"));
        }
        Ok(())
    }

    pub fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            default_initial_balance: self.initial_balance,
            max_backups: self.max_backups,
        }
    }
}
