//! Background-worker tuning.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{HistoryError, HistoryResult};

/// Batching and retry parameters for [`HistoryObserver`](crate::HistoryObserver).
///
/// Deserializes with defaults for every missing field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Records buffered before a write is forced.  Default: 256.
    pub batch_size:         usize,
    /// A non-empty buffer older than this is written.  Default: 500 ms.
    pub flush_interval_ms:  u64,
    /// Retries after the first failed attempt.  Default: 5.
    pub max_retries:        u32,
    /// Delay before the first retry, doubled on each further one.
    /// Default: 50 ms.
    pub initial_backoff_ms: u64,
    /// Ceiling on the retry delay.  Default: 2000 ms.
    pub max_backoff_ms:     u64,
    /// Commands the worker queue holds before new records are dropped.
    /// Default: 65 536.
    pub queue_capacity:     usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            batch_size:         256,
            flush_interval_ms:  500,
            max_retries:        5,
            initial_backoff_ms: 50,
            max_backoff_ms:     2_000,
            queue_capacity:     65_536,
        }
    }
}

impl HistoryConfig {
    pub fn from_json_str(json: &str) -> HistoryResult<Self> {
        let config: HistoryConfig =
            serde_json::from_str(json).map_err(|e| HistoryError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> HistoryResult<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> HistoryResult<()> {
        if self.batch_size == 0 {
            return Err(HistoryError::Config("batch_size must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(HistoryError::Config("queue_capacity must be at least 1".into()));
        }
        if self.flush_interval_ms == 0 {
            return Err(HistoryError::Config("flush_interval_ms must be positive".into()));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(HistoryError::Config(
                "initial_backoff_ms must not exceed max_backoff_ms".into(),
            ));
        }
        Ok(())
    }

    /// The delay before retry number `attempt` (1-based).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        self.initial_backoff_ms.saturating_mul(factor).min(self.max_backoff_ms)
    }
}
