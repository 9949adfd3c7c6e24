//! Engine configuration.
//!
//! Resolved once at startup and passed into the engine. Request handling
//! never reads process environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClinicError, ClinicResult};

pub const ENV_DB_PATH: &str = "CONSULT_DB_PATH";
pub const ENV_RESERVATION_TTL_SECS: &str = "CONSULT_RESERVATION_TTL_SECS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "CONSULT_SWEEP_INTERVAL_SECS";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CONSULT_BUSY_TIMEOUT_MS";

const DEFAULT_RESERVATION_TTL_SECS: u64 = 30 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// One week
pub const MAX_RESERVATION_TTL_SECS: u64 = 7 * 24 * 60 * 60;
pub const MAX_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;

fn default_reservation_ttl_secs() -> u64 {
    DEFAULT_RESERVATION_TTL_SECS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClinicConfig {
    /// SQLite file; `None` keeps everything in memory
    #[serde(default)]
    database_path: Option<PathBuf>,
    #[serde(default = "default_reservation_ttl_secs")]
    reservation_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,
    #[serde(default = "default_busy_timeout_ms")]
    busy_timeout_ms: u64,
}

impl Default for ClinicConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            reservation_ttl_secs: DEFAULT_RESERVATION_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl ClinicConfig {
    /// Create a validated configuration.
    pub fn new(
        database_path: Option<PathBuf>,
        reservation_ttl: Duration,
        sweep_interval: Duration,
        busy_timeout: Duration,
    ) -> ClinicResult<Self> {
        let config = Self {
            database_path,
            reservation_ttl_secs: reservation_ttl.as_secs(),
            sweep_interval_secs: sweep_interval.as_secs(),
            busy_timeout_ms: u64::try_from(busy_timeout.as_millis()).unwrap_or(u64::MAX),
        };
        config.validate()?;
        Ok(config)
    }

    /// Build from `CONSULT_*` environment variables, defaulting what is unset.
    pub fn from_env() -> ClinicResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> ClinicResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let number = |key: &str, default: u64| -> ClinicResult<u64> {
            match read(key) {
                Some(value) => value.parse::<u64>().map_err(|_| {
                    ClinicError::Validation(format!("{} must be a whole number, got {:?}", key, value))
                }),
                None => Ok(default),
            }
        };

        let config = Self {
            database_path: read(ENV_DB_PATH).map(PathBuf::from),
            reservation_ttl_secs: number(ENV_RESERVATION_TTL_SECS, DEFAULT_RESERVATION_TTL_SECS)?,
            sweep_interval_secs: number(ENV_SWEEP_INTERVAL_SECS, DEFAULT_SWEEP_INTERVAL_SECS)?,
            busy_timeout_ms: number(ENV_BUSY_TIMEOUT_MS, DEFAULT_BUSY_TIMEOUT_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject zero and out-of-range durations.
    pub fn validate(&self) -> ClinicResult<()> {
        if self.reservation_ttl_secs == 0 {
            return Err(ClinicError::Validation("reservation_ttl cannot be zero".into()));
        }
        if self.reservation_ttl_secs > MAX_RESERVATION_TTL_SECS {
            return Err(ClinicError::Validation(format!(
                "reservation_ttl cannot exceed {} seconds, got {}",
                MAX_RESERVATION_TTL_SECS, self.reservation_ttl_secs
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ClinicError::Validation("sweep_interval cannot be zero".into()));
        }
        if self.sweep_interval_secs > MAX_SWEEP_INTERVAL_SECS {
            return Err(ClinicError::Validation(format!(
                "sweep_interval cannot exceed {} seconds, got {}",
                MAX_SWEEP_INTERVAL_SECS, self.sweep_interval_secs
            )));
        }
        Ok(())
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn database_path(&self) -> Option<&Path> {
        self.database_path.as_deref()
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_secs(self.reservation_ttl_secs)
    }

    /// Reservation TTL for timestamp arithmetic.
    ///
    /// Fails for values `chrono` cannot represent, which only a config that
    /// skipped `validate` can hold.
    pub fn reservation_ttl_chrono(&self) -> ClinicResult<chrono::Duration> {
        i64::try_from(self.reservation_ttl_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .ok_or_else(|| {
                ClinicError::Validation(format!(
                    "reservation_ttl of {} seconds is out of range",
                    self.reservation_ttl_secs
                ))
            })
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
