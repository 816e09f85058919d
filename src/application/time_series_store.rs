// Time-series store - Bounded per-channel sample history with window queries
use crate::application::clock::{SharedClock, format_timestamp};
use crate::application::scheduler::{SharedScheduler, TaskControl, TaskId};
use crate::domain::channel::{Channel, ChannelTable};
use crate::domain::telemetry::{ChannelOverview, ExportSnapshot, Sample, Summary};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const MS_PER_MINUTE: i64 = 60_000;
const OVERVIEW_WINDOW_MINUTES: u32 = 60;

/// Count and age limits applied to every series
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RetentionPolicy {
    /// Hard cap; exceeding it triggers truncation
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Length a series is cut back to once it overflows
    #[serde(default = "default_truncate_to")]
    pub truncate_to: usize,
    #[serde(default = "default_max_age_minutes")]
    pub max_age_minutes: u32,
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u32,
}

fn default_max_samples() -> usize {
    10_000
}

fn default_truncate_to() -> usize {
    8_000
}

fn default_max_age_minutes() -> u32 {
    24 * 60
}

fn default_cleanup_interval_minutes() -> u32 {
    30
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_samples: default_max_samples(),
            truncate_to: default_truncate_to(),
            max_age_minutes: default_max_age_minutes(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

impl RetentionPolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.truncate_to == 0 || self.truncate_to >= self.max_samples {
            anyhow::bail!(
                "retention.truncate_to ({}) must be between 1 and max_samples ({})",
                self.truncate_to,
                self.max_samples
            );
        }
        if self.max_age_minutes == 0 || self.cleanup_interval_minutes == 0 {
            anyhow::bail!("retention ages and intervals must be non-zero");
        }
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.cleanup_interval_minutes) * 60)
    }

    fn max_age_ms(&self) -> i64 {
        i64::from(self.max_age_minutes) * MS_PER_MINUTE
    }
}

pub struct TimeSeriesStore {
    series: ChannelTable<VecDeque<Sample>>,
    policy: RetentionPolicy,
    clock: SharedClock,
}

impl TimeSeriesStore {
    pub fn new(policy: RetentionPolicy, clock: SharedClock) -> Self {
        Self {
            series: ChannelTable::default(),
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Store a reading. Non-finite values are dropped; a missing timestamp
    /// means "now". Returns whether the sample was kept.
    pub fn append(&mut self, channel: Channel, value: f64, timestamp: Option<i64>) -> bool {
        if !value.is_finite() {
            tracing::debug!("Dropping non-finite {} sample: {}", channel, value);
            return false;
        }

        let timestamp = timestamp.unwrap_or_else(|| self.clock.now_ms());
        let sample = Sample::new(timestamp, value);
        let series = &mut self.series[channel];

        if series.back().is_some_and(|last| last.timestamp > timestamp) {
            let pos = series.partition_point(|s| s.timestamp <= timestamp);
            series.insert(pos, sample);
        } else {
            series.push_back(sample);
        }

        if series.len() > self.policy.max_samples {
            let excess = series.len() - self.policy.truncate_to;
            series.drain(..excess);
            tracing::debug!("Truncated {} history by {} samples", channel, excess);
        }

        true
    }

    /// Samples with `timestamp >= now - window`, oldest first
    pub fn query(&self, channel: Channel, window_minutes: u32) -> Vec<Sample> {
        let cutoff = self.window_start(window_minutes);
        let series = &self.series[channel];
        let start = series.partition_point(|s| s.timestamp < cutoff);
        series.range(start..).copied().collect()
    }

    pub fn summarize(&self, channel: Channel, window_minutes: u32) -> Summary {
        Summary::from_samples(&self.query(channel, window_minutes))
    }

    pub fn latest(&self, channel: Channel) -> Option<Sample> {
        self.series[channel].back().copied()
    }

    pub fn len(&self, channel: Channel) -> usize {
        self.series[channel].len()
    }

    /// Drop every sample older than the retention age; returns how many went
    pub fn evict_expired(&mut self) -> usize {
        let cutoff = self.clock.now_ms() - self.policy.max_age_ms();
        let mut removed = 0;

        for (_, series) in self.series.iter_mut() {
            let stale = series.partition_point(|s| s.timestamp < cutoff);
            series.drain(..stale);
            removed += stale;
        }

        if removed > 0 {
            tracing::info!("Evicted {} expired samples", removed);
        }
        removed
    }

    pub fn clear(&mut self) {
        for (_, series) in self.series.iter_mut() {
            series.clear();
        }
        tracing::info!("Cleared all sample history");
    }

    /// Point totals plus the last hour's summary for every channel
    pub fn overview(&self) -> Vec<ChannelOverview> {
        Channel::ALL
            .into_iter()
            .map(|channel| ChannelOverview {
                channel,
                total_points: self.len(channel),
                latest: self.latest(channel),
                recent_stats: self.summarize(channel, OVERVIEW_WINDOW_MINUTES),
            })
            .collect()
    }

    pub fn export(&self, channel: Channel, window_minutes: u32) -> ExportSnapshot {
        let samples = self.query(channel, window_minutes);
        let summary = Summary::from_samples(&samples);
        ExportSnapshot {
            channel: channel.id().to_string(),
            window_minutes,
            samples,
            summary,
            export_timestamp: format_timestamp(self.clock.now_ms()),
        }
    }

    pub fn export_all(&self, window_minutes: u32) -> Vec<ExportSnapshot> {
        Channel::ALL
            .into_iter()
            .map(|channel| self.export(channel, window_minutes))
            .collect()
    }

    fn window_start(&self, window_minutes: u32) -> i64 {
        self.clock.now_ms() - i64::from(window_minutes) * MS_PER_MINUTE
    }
}

/// Store handle shared by the driver, the presenters and the HTTP handlers.
/// Locks are held for one synchronous operation and never across an await.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<TimeSeriesStore>>,
}

impl SharedStore {
    pub fn new(store: TimeSeriesStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, TimeSeriesStore> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn query(&self, channel: Channel, window_minutes: u32) -> Vec<Sample> {
        self.lock().query(channel, window_minutes)
    }

    pub fn summarize(&self, channel: Channel, window_minutes: u32) -> Summary {
        self.lock().summarize(channel, window_minutes)
    }

    pub fn evict_expired(&self) -> usize {
        self.lock().evict_expired()
    }

    /// Run age-based eviction on the cleanup interval, independent of queries
    pub fn schedule_eviction(&self, scheduler: &SharedScheduler, start_ms: i64) -> TaskId {
        let interval = self.lock().policy().cleanup_interval();
        let store = self.clone();
        scheduler.lock().every("history-cleanup", interval, start_ms, move |_| {
            store.evict_expired();
            TaskControl::Continue
        })
    }
}
