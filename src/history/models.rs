//! History model types.

use std::collections::VecDeque;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

/// One observed value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HistorySample {
    pub time: DateTime<Utc>,
    pub value: u32,
}

/// Samples ordered by time, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySeries {
    samples: VecDeque<HistorySample>,
}

impl HistorySeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observation.
    ///
    /// A value observed less than `interval` after the latest sample replaces
    /// that sample's value; otherwise a new sample is appended and the oldest
    /// is evicted once `capacity` is exceeded.
    pub fn observe(&mut self, time: DateTime<Utc>, value: u32, capacity: usize, interval: ChronoDuration) {
        match self.samples.back_mut() {
            // Exactly one interval later counts as a new slot.
            Some(last) if time - last.time < interval => {
                last.value = value;
            }
            _ => {
                self.samples.push_back(HistorySample { time, value });
                while self.samples.len() > capacity.max(1) {
                    self.samples.pop_front();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last(&self) -> Option<&HistorySample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistorySample> {
        self.samples.iter()
    }

    pub fn values(&self) -> Vec<u32> {
        self.samples.iter().map(|s| s.value).collect()
    }

    pub fn max_value(&self) -> u32 {
        self.samples.iter().map(|s| s.value).max().unwrap_or(0)
    }
}

impl FromIterator<HistorySample> for HistorySeries {
    fn from_iter<I: IntoIterator<Item = HistorySample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hour() -> ChronoDuration {
        ChronoDuration::hours(1)
    }

    #[test]
    fn test_first_observation_appends() {
        let mut series = HistorySeries::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        series.observe(t0, 5, 24, hour());
        assert_eq!(series.len(), 1);
        assert_eq!(series.last().unwrap().time, t0);
    }

    #[test]
    fn test_coalesce_keeps_original_timestamp() {
        let mut series = HistorySeries::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        series.observe(t0, 5, 24, hour());
        series.observe(t0 + ChronoDuration::minutes(59), 9, 24, hour());

        let last = series.last().unwrap();
        assert_eq!(last.time, t0);
        assert_eq!(last.value, 9);
    }

    #[test]
    fn test_exact_interval_appends() {
        let mut series = HistorySeries::new();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        series.observe(t0, 5, 24, hour());
        series.observe(t0 + hour(), 6, 24, hour());
        assert_eq!(series.values(), vec![5, 6]);
    }

    #[test]
    fn test_max_value() {
        let series: HistorySeries = [3, 9, 4]
            .into_iter()
            .enumerate()
            .map(|(i, v)| HistorySample {
                time: Utc.with_ymd_and_hms(2024, 1, 1, i as u32, 0, 0).unwrap(),
                value: v,
            })
            .collect();
        assert_eq!(series.max_value(), 9);
        assert_eq!(HistorySeries::new().max_value(), 0);
    }
}
