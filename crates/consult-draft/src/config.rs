//! Draft sync configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_DEBOUNCE_MS: u64 = 10_000;

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DraftConfig {
    /// Idle time after the last edit before an automatic save
    #[serde(default = "default_debounce_ms")]
    debounce_ms: u64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl DraftConfig {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce_ms: u64::try_from(debounce.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
