//! Configuration management for the decision engine
//!
//! Loads tunables from environment variables (and a `.env` file if present)
//! with validation.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Decision engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How many times a lost round-creation race is retried before surfacing
    pub max_race_retries: u32,

    /// Longest ranking a single ballot may carry
    pub max_ranked_choices: usize,
}

impl EngineConfig {
    /// Load engine configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let max_race_retries = parse_env("DECISION_MAX_RACE_RETRIES", 5)?;
        let max_ranked_choices = parse_env("DECISION_MAX_RANKED_CHOICES", 64)?;

        let config = Self {
            max_race_retries,
            max_ranked_choices,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self {
            max_race_retries: 16, // Tests hammer round creation concurrently
            max_ranked_choices: 32,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_ranked_choices == 0 {
            return Err(Error::internal(
                "DECISION_MAX_RANKED_CHOICES must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_race_retries: 5,
            max_ranked_choices: 64,
        }
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Source identifier stamped on every audit record
    pub audit_source: String,

    /// Maximum records kept in memory; oldest are dropped first
    pub max_memory_records: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            audit_source: "decision_engine".to_string(),
            max_memory_records: 10_000,
        }
    }
}

impl AuditConfig {
    pub fn from_env() -> Result<Self> {
        let audit_source = std::env::var("DECISION_AUDIT_SOURCE")
            .unwrap_or_else(|_| "decision_engine".to_string());
        let max_memory_records = parse_env("DECISION_AUDIT_MAX_RECORDS", 10_000)?;

        Ok(Self {
            audit_source,
            max_memory_records,
        })
    }

    pub fn for_testing() -> Self {
        Self {
            audit_source: "decision_engine_test".to_string(),
            max_memory_records: 100,
        }
    }
}

/// Notification fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Buffered events per subscriber before lagging receivers skip ahead
    pub channel_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub audit: AuditConfig,
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let engine = EngineConfig::from_env()?;
        let audit = AuditConfig::from_env()?;

        let channel_capacity = parse_env("DECISION_NOTIFY_CHANNEL_CAPACITY", 256)?;
        if channel_capacity == 0 {
            return Err(Error::internal(
                "DECISION_NOTIFY_CHANNEL_CAPACITY must be at least 1",
            ));
        }

        let logging = LoggingConfig {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
        };

        Ok(Self {
            engine,
            audit,
            notify: NotifyConfig { channel_capacity },
            logging,
        })
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self {
            engine: EngineConfig::for_testing(),
            audit: AuditConfig::for_testing(),
            notify: NotifyConfig {
                channel_capacity: 16,
            },
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    parse_value(name, std::env::var(name).ok().as_deref(), default)
}

/// Parse an optional raw setting, falling back to `default` when unset
fn parse_value<T: std::str::FromStr>(name: &str, raw: Option<&str>, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::internal(format!("Invalid {name}: {raw:?}"))),
        None => Ok(default),
    }
}
