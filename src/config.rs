// src/config.rs

//! --- AML Market Configuration ---
//! This module defines the configuration structure for the market backend.
//! It uses serde for deserialization from a TOML file and validates the
//! participant roster, ledger endpoint and weighting strategy before any
//! service is built from it.

use crate::reputation::{ReputationRecord, ReputationTable};
use crate::types::{Participant, Role};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Overrides `ledger.api_url` when set.
pub const LEDGER_URL_ENV: &str = "CANTON_API_URL";

const MAX_PARTICIPANTS: usize = 64;
const MAX_TIMEOUT_MS: u64 = 60_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from '{path}': {source}")]
    Load {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Failed to save configuration to '{path}': {source}")]
    Save {
        path: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Validation failed: {0}")]
    Validation(String),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub api_address: String,
    /// Starting value of the process-lifetime market counter.
    pub initial_market_count: u64,
    /// Reject unknown scenario ids instead of substituting the default.
    pub strict_scenarios: bool,
    /// Seeds vote synthesis; entropy-seeded when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,

    pub logging: LoggingConfig,
    pub ledger: LedgerConfig,
    pub weights: WeightsConfig,
    pub participants: Vec<ParticipantConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LedgerConfig {
    pub enabled: bool,
    pub api_url: String,
    /// Namespace appended to participant ids to form ledger party ids.
    pub party_suffix: String,
    pub package: String,
    pub user_id: String,
    /// Participant id of the observing regulator.
    pub observer_party: String,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub list_timeout_ms: u64,
    /// Block the run on market creation instead of firing and forgetting.
    pub await_market_creation: bool,
    pub demo_users: Vec<String>,
}

impl LedgerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn list_timeout(&self) -> Duration {
        Duration::from_millis(self.list_timeout_ms)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "http://127.0.0.1:7575".to_string(),
            party_suffix:
                "::122031dacd1d842e4499cf58bc1391ec402816ebc0edf2a240b0ff9322f7e7b97a3a"
                    .to_string(),
            package: "aml-network".to_string(),
            user_id: "banka".to_string(),
            observer_party: "Regulator".to_string(),
            read_timeout_ms: 5_000,
            write_timeout_ms: 8_000,
            list_timeout_ms: 10_000,
            await_market_creation: false,
            demo_users: ["banka", "bankb", "bankc", "bankd", "regulator"]
                .iter()
                .map(|u| u.to_string())
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeightStrategy {
    Stake,
    Reputation,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WeightsConfig {
    pub strategy: WeightStrategy,
    pub cache_ttl_secs: u64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            strategy: WeightStrategy::Reputation,
            cache_ttl_secs: 60,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ParticipantConfig {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    /// Dollar stake used by the `stake` strategy.
    #[serde(default)]
    pub stake: f64,
    /// Score used when the reputation source is unreachable.
    #[serde(default = "default_fallback_reputation")]
    pub fallback_reputation: f64,
    #[serde(default = "default_fallback_accuracy")]
    pub fallback_accuracy: f64,
}

fn default_fallback_reputation() -> f64 {
    crate::reputation::DEFAULT_REPUTATION_SCORE
}

fn default_fallback_accuracy() -> f64 {
    crate::reputation::DEFAULT_ACCURACY
}

impl ParticipantConfig {
    fn institution(
        id: &str,
        display_name: &str,
        stake: f64,
        reputation: f64,
        accuracy: f64,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            role: Role::Institution,
            stake,
            fallback_reputation: reputation,
            fallback_accuracy: accuracy,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_address: "127.0.0.1:3001".to_string(),
            initial_market_count: 47,
            strict_scenarios: false,
            rng_seed: None,
            logging: LoggingConfig {
                level: "info".to_string(),
            },
            ledger: LedgerConfig::default(),
            weights: WeightsConfig::default(),
            participants: vec![
                ParticipantConfig::institution("Bank_A", "Bank A", 200.0, 92.0, 0.91),
                ParticipantConfig::institution("Bank_B", "Bank B", 150.0, 85.0, 0.86),
                ParticipantConfig::institution("Bank_C", "Bank C", 120.0, 78.0, 0.83),
                ParticipantConfig::institution("Bank_D", "Bank D", 250.0, 74.0, 0.79),
                ParticipantConfig {
                    id: "Regulator".to_string(),
                    display_name: "Regulator".to_string(),
                    role: Role::Observer,
                    stake: 0.0,
                    fallback_reputation: default_fallback_reputation(),
                    fallback_accuracy: default_fallback_accuracy(),
                },
            ],
        }
    }
}

impl Config {
    #[instrument]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        Self::load_with_ledger_url(path, env::var(LEDGER_URL_ENV).ok())
    }

    fn load_with_ledger_url(path: &str, ledger_url: Option<String>) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            let mut default_config = Config::default();
            default_config
                .save(path)
                .context("Failed to create a default configuration file.")
                .map_err(|source| ConfigError::Save {
                    path: path.to_string(),
                    source,
                })?;
            default_config.override_ledger_url(ledger_url);
            default_config.validate()?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .context("Failed to read configuration file.")
            .map_err(|source| ConfigError::Load {
                path: path.to_string(),
                source,
            })?;
        let mut config: Config = toml::from_str(&content)
            .context("Failed to parse TOML from configuration file.")
            .map_err(|source| ConfigError::Load {
                path: path.to_string(),
                source,
            })?;
        config.override_ledger_url(ledger_url);
        config.validate()?;
        Ok(config)
    }

    #[instrument(skip(self))]
    pub fn save(&self, path: &str) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)
            .context("Failed to serialize configuration to TOML.")
            .map_err(|source| ConfigError::Save {
                path: path.to_string(),
                source,
            })?;
        fs::write(path, toml_string)
            .context("Failed to write configuration to file.")
            .map_err(|source| ConfigError::Save {
                path: path.to_string(),
                source,
            })?;
        Ok(())
    }

    /// Blank values are ignored.
    pub fn override_ledger_url(&mut self, url: Option<String>) {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.ledger.api_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_address.parse::<SocketAddr>().map_err(|_| {
            ConfigError::Validation(format!(
                "Invalid API address format: '{}'",
                self.api_address
            ))
        })?;

        if self.participants.len() > MAX_PARTICIPANTS {
            return Err(ConfigError::Validation(format!(
                "Number of participants cannot exceed {MAX_PARTICIPANTS}"
            )));
        }

        if !self
            .participants
            .iter()
            .any(|p| p.role == Role::Institution)
        {
            return Err(ConfigError::Validation(
                "At least one institution must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for p in &self.participants {
            if p.id.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "Participant id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(p.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Duplicate participant id: '{}'",
                    p.id
                )));
            }
            if !p.stake.is_finite() || p.stake < 0.0 {
                return Err(ConfigError::Validation(format!(
                    "Stake for '{}' must be a non-negative number",
                    p.id
                )));
            }
            if !(0.0..=100.0).contains(&p.fallback_reputation) {
                return Err(ConfigError::Validation(format!(
                    "fallback_reputation for '{}' must be between 0 and 100",
                    p.id
                )));
            }
            if !(0.0..=1.0).contains(&p.fallback_accuracy) {
                return Err(ConfigError::Validation(format!(
                    "fallback_accuracy for '{}' must be between 0 and 1",
                    p.id
                )));
            }
        }

        if self.weights.cache_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "weights.cache_ttl_secs must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("read_timeout_ms", self.ledger.read_timeout_ms),
            ("write_timeout_ms", self.ledger.write_timeout_ms),
            ("list_timeout_ms", self.ledger.list_timeout_ms),
        ] {
            if value == 0 || value > MAX_TIMEOUT_MS {
                return Err(ConfigError::Validation(format!(
                    "ledger.{name} must be between 1 and {MAX_TIMEOUT_MS}"
                )));
            }
        }

        if self.ledger.enabled && !self.ledger.api_url.starts_with("http") {
            return Err(ConfigError::Validation(format!(
                "Invalid ledger api_url: '{}'",
                self.ledger.api_url
            )));
        }

        Ok(())
    }

    /// The configured roster in voting order, weights not yet resolved.
    pub fn roster(&self) -> Vec<Participant> {
        self.participants
            .iter()
            .map(|p| match p.role {
                Role::Institution => Participant::institution(&p.id, &p.display_name, 0.0),
                Role::Observer => Participant::observer(&p.id, &p.display_name),
            })
            .collect()
    }

    pub fn stakes(&self) -> HashMap<String, f64> {
        self.participants
            .iter()
            .filter(|p| p.role == Role::Institution)
            .map(|p| (p.id.clone(), p.stake))
            .collect()
    }

    pub fn fallback_reputations(&self) -> ReputationTable {
        self.participants
            .iter()
            .filter(|p| p.role == Role::Institution)
            .map(|p| {
                (
                    p.id.clone(),
                    ReputationRecord {
                        score: p.fallback_reputation,
                        accuracy: p.fallback_accuracy,
                    },
                )
            })
            .collect()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.weights.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_default_and_save_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let default_config = Config::default();
        default_config.save(path).unwrap();

        let loaded_config = Config::load(path).unwrap();
        assert_eq!(loaded_config.api_address, default_config.api_address);
        assert_eq!(loaded_config.participants.len(), 5);
        assert_eq!(loaded_config.weights.strategy, WeightStrategy::Reputation);
    }

    #[test]
    fn test_first_run_still_validates_the_ledger_override() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let err = Config::load_with_ledger_url(path, Some("ftp://ledger".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let config = Config::load_with_ledger_url(path, Some("http://ledger:7575".to_string()));
        assert_eq!(config.unwrap().ledger.api_url, "http://ledger:7575");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.api_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
        config.api_address = "127.0.0.1:3001".to_string();

        config.weights.cache_ttl_secs = 0;
        assert!(config.validate().is_err());
        config.weights.cache_ttl_secs = 60;

        config.ledger.read_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.ledger.read_timeout_ms = 5_000;

        config.participants[0].stake = -5.0;
        assert!(config.validate().is_err());
        config.participants[0].stake = 200.0;

        config.participants[1].fallback_reputation = 120.0;
        assert!(config.validate().is_err());
        config.participants[1].fallback_reputation = 85.0;

        config.participants[2].id = "Bank_A".to_string();
        assert!(config.validate().is_err());
        config.participants[2].id = "Bank_C".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_observer_only_roster_is_rejected() {
        let mut config = Config::default();
        config.participants.retain(|p| p.role == Role::Observer);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_roster_tables() {
        let config = Config::default();
        let roster = config.roster();
        assert_eq!(roster.len(), 5);
        assert!(roster[4].is_observer());

        let stakes = config.stakes();
        assert_eq!(stakes["Bank_D"], 250.0);
        assert!(!stakes.contains_key("Regulator"));

        let fallback = config.fallback_reputations();
        assert_eq!(fallback["Bank_A"].score, 92.0);
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
    }
}
