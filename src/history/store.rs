//! In-memory history store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::models::*;

/// Default spacing between two distinct samples.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(3600);

/// Thread-safe map of channel id to series.
///
/// Nothing here survives a restart.
pub struct HistoryStore {
    series: Mutex<HashMap<String, HistorySeries>>,
    interval: ChronoDuration,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_INTERVAL)
    }
}

impl HistoryStore {
    pub fn new(sample_interval: Duration) -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            interval: ChronoDuration::from_std(sample_interval).unwrap_or_else(|_| ChronoDuration::hours(1)),
        }
    }

    /// Record `value` for `channel_id` as observed at `now`.
    pub fn record(&self, channel_id: &str, value: u32, capacity: usize, now: DateTime<Utc>) {
        let mut series = self.lock();
        series
            .entry(channel_id.to_string())
            .or_default()
            .observe(now, value, capacity, self.interval);
    }

    /// Copy of the series for `channel_id`, empty if none was recorded.
    pub fn snapshot(&self, channel_id: &str) -> HistorySeries {
        self.lock().get(channel_id).cloned().unwrap_or_default()
    }

    /// Number of channels with at least one sample.
    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, HistorySeries>> {
        // A panic mid-update leaves at worst one stale sample.
        self.series.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
