//! Config loader using TOML and serde.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! The defaults reproduce the observed deployment: a 0.000125 increment
//! every 10 seconds for 2 minutes. [`AccrualConfig::production`] is the
//! 12-hour window.
//!
//! Environment overrides (applied by [`Config::apply_env`]):
//! - `KSN_STORE_PATH`: ledger file path
//! - `KSN_LOG_LEVEL`: tracing level (`trace`, `debug`, `info`, `warn`, `error`)
//! - `KSN_ACCRUAL_PROFILE`: `observed` or `production`

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schedule::{BonusSchedule, MilestoneLadder};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tracing level for the binary.
    pub log_level: String,
    pub accrual: AccrualConfig,
    pub claims: ClaimConfig,
    pub referral: ReferralConfig,
    pub milestones: MilestoneLadder,
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            accrual: AccrualConfig::default(),
            claims: ClaimConfig::default(),
            referral: ReferralConfig::default(),
            milestones: MilestoneLadder::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Mining accrual parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccrualConfig {
    /// Amount added to the mined balance on each tick.
    pub increment: Decimal,
    pub tick_interval_secs: u64,
    /// Length of one accrual session.
    pub duration_secs: u64,
    /// Decimal places kept after each tick.
    pub precision: u32,
}

impl Default for AccrualConfig {
    fn default() -> Self {
        AccrualConfig {
            increment: Decimal::new(125, 6),
            tick_interval_secs: 10,
            duration_secs: 2 * 60,
            precision: 5,
        }
    }
}

impl AccrualConfig {
    /// One tick per minute over a 12-hour session.
    pub fn production() -> Self {
        AccrualConfig {
            tick_interval_secs: 60,
            duration_secs: 12 * 60 * 60,
            ..Self::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Ticks in a full session: `floor(duration / interval)`.
    pub fn total_ticks(&self) -> u32 {
        if self.tick_interval_secs == 0 {
            return 0;
        }
        u32::try_from(self.duration_secs / self.tick_interval_secs).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    /// Minimum balance for either claim track.
    pub min_claim: Decimal,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        ClaimConfig { min_claim: Decimal::from(5) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferralConfig {
    /// Traversal depth beyond which the graph is treated as malformed.
    pub max_depth: u32,
    /// Share of a direct referral's mined balance shown in the team table.
    pub direct_share_percent: Decimal,
    pub bonus: BonusSchedule,
}

impl Default for ReferralConfig {
    fn default() -> Self {
        ReferralConfig {
            max_depth: 1024,
            direct_share_percent: Decimal::from(10),
            bonus: BonusSchedule::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON ledger file.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig { path: PathBuf::from("./data/ledger.json") }
    }
}

impl Config {
    /// Apply `KSN_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("KSN_STORE_PATH") {
            self.store.path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("KSN_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Ok(profile) = std::env::var("KSN_ACCRUAL_PROFILE") {
            self.accrual = match profile.as_str() {
                "observed" => AccrualConfig::default(),
                "production" => AccrualConfig::production(),
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "KSN_ACCRUAL_PROFILE invalid: '{}'",
                        other
                    )))
                }
            };
        }
        Ok(())
    }

    /// Parsed tracing level.
    pub fn tracing_level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("log_level invalid: '{}'", self.log_level)))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        self.tracing_level()?;

        if self.accrual.tick_interval_secs == 0 {
            return invalid("accrual.tick_interval_secs must be positive");
        }
        if self.accrual.duration_secs < self.accrual.tick_interval_secs {
            return invalid("accrual.duration_secs must cover at least one tick");
        }
        if self.accrual.increment <= Decimal::ZERO {
            return invalid("accrual.increment must be positive");
        }
        if self.claims.min_claim < Decimal::ZERO {
            return invalid("claims.min_claim must not be negative");
        }
        if self.referral.max_depth == 0 {
            return invalid("referral.max_depth must be positive");
        }
        self.referral.bonus.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

/// Load config from a TOML file path.
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path.as_ref())?;
    let cfg: Config = toml::from_str(&s)?;
    Ok(cfg)
}
