//! Client configuration, persisted as YAML.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackviewError};

/// Largest hanging threshold `chrono::Duration` can hold at millisecond precision.
pub const MAX_HANGING_THRESHOLD_SECS: u64 = i64::MAX as u64 / 1000;

/// Tunables for the client state layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Metric polling interval in milliseconds (default: 10000)
    pub poll_interval_ms: u64,
    /// A running run whose latest metric is older than this is considered
    /// hanging and is no longer polled (default: 7 days)
    pub hanging_threshold_secs: u64,
    /// Window in which a second legend click counts as a double click (default: 300)
    pub legend_double_click_ms: u64,
    /// Page size for run searches (default: 100)
    pub runs_page_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10_000,
            hanging_threshold_secs: 7 * 24 * 60 * 60,
            legend_double_click_ms: 300,
            runs_page_size: 100,
        }
    }
}

impl ClientConfig {
    /// Intervals below one millisecond are raised to one millisecond.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis())
            .unwrap_or(u64::MAX)
            .max(1);
        self
    }

    /// Thresholds beyond [`MAX_HANGING_THRESHOLD_SECS`] are capped to it.
    pub fn with_hanging_threshold(mut self, threshold: Duration) -> Self {
        self.hanging_threshold_secs = threshold.as_secs().min(MAX_HANGING_THRESHOLD_SECS);
        self
    }

    /// Never shorter than one millisecond.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Saturates at `chrono::Duration::MAX` for out-of-range values.
    pub fn hanging_threshold(&self) -> chrono::Duration {
        i64::try_from(self.hanging_threshold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn legend_double_click_window(&self) -> Duration {
        Duration::from_millis(self.legend_double_click_ms)
    }

    /// Load from a YAML file. A missing file yields the defaults; missing
    /// keys fall back to their defaults individually.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the poller cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(TrackviewError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.hanging_threshold_secs > MAX_HANGING_THRESHOLD_SECS {
            return Err(TrackviewError::Config(format!(
                "hanging_threshold_secs must be at most {MAX_HANGING_THRESHOLD_SECS}"
            )));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}
