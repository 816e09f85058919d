// Telemetry data domain models
use super::channel::Channel;
use serde::{Deserialize, Serialize};

/// One timestamped reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Aggregates over a window of samples. Every aggregate is `None` when the
/// window holds no samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    pub count: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
    pub latest: Option<f64>,
}

impl Summary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Summarize samples already sorted by timestamp
    pub fn from_samples(samples: &[Sample]) -> Self {
        let Some(last) = samples.last() else {
            return Self::empty();
        };

        let (min, max, sum) = samples.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), s| (min.min(s.value), max.max(s.value), sum + s.value),
        );
        let n = samples.len() as f64;
        let avg = if sum.is_finite() {
            sum / n
        } else {
            samples.iter().map(|s| s.value / n).sum()
        };

        Self {
            count: samples.len(),
            min: Some(round2(min)),
            max: Some(round2(max)),
            avg: Some(round2(avg)),
            latest: Some(round2(last.value)),
        }
    }
}

/// Magnitude past which an f64 carries no fractional digits
const ROUNDING_LIMIT: f64 = 1e15;

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    if value.abs() >= ROUNDING_LIMIT {
        return value;
    }
    (value * 100.0).round() / 100.0
}

/// Trailing window choices offered by the chart view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeWindow {
    OneMinute,
    #[default]
    TenMinutes,
    OneHour,
    OneDay,
}

impl TimeWindow {
    pub const ALL: [TimeWindow; 4] = [
        TimeWindow::OneMinute,
        TimeWindow::TenMinutes,
        TimeWindow::OneHour,
        TimeWindow::OneDay,
    ];

    pub fn minutes(self) -> u32 {
        match self {
            TimeWindow::OneMinute => 1,
            TimeWindow::TenMinutes => 10,
            TimeWindow::OneHour => 60,
            TimeWindow::OneDay => 1440,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|w| w.minutes() == minutes)
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeWindow::OneMinute => "1 minute",
            TimeWindow::TenMinutes => "10 minutes",
            TimeWindow::OneHour => "1 hour",
            TimeWindow::OneDay => "24 hours",
        }
    }
}

impl Serialize for TimeWindow {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.minutes())
    }
}

/// Numeric readout for one channel
#[derive(Debug, Clone, Serialize)]
pub struct TileData {
    pub id: String,
    pub title: String,
    pub unit: String,
    pub value: f64,
    pub display: String,
    pub precision: u32,
    /// Fill level of the progress indicator, 0-100
    pub progress: f64,
}

impl TileData {
    pub fn new(channel: Channel, value: f64) -> Self {
        let info = channel.info();
        Self {
            id: channel.id().to_string(),
            title: info.name.to_string(),
            unit: info.unit.to_string(),
            value,
            display: format!("{:.*}", info.precision as usize, value),
            precision: info.precision,
            progress: info.display_range.percent_of(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChartKind {
    Line,
}

/// One chart point, x = timestamp (ms), y = value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    pub x: i64,
    pub y: f64,
}

impl From<Sample> for ChartPoint {
    fn from(sample: Sample) -> Self {
        Self {
            x: sample.timestamp,
            y: sample.value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesData {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub points: Vec<ChartPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub id: String,
    pub title: String,
    pub unit: Option<String>,
    pub kind: ChartKind,
    pub y_min: Option<f64>,
    pub y_max: Option<f64>,
    pub fraction_digits: Option<u32>,
    pub series: Vec<SeriesData>,
}

/// Everything a chart view shows: the line chart and its summary block
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartFrame {
    /// Channel id as requested
    pub channel: String,
    pub window_minutes: TimeWindow,
    pub chart: ChartData,
    pub summary: Summary,
    pub rendered_at: i64,
}

/// Export payload for one channel and window
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSnapshot {
    pub channel: String,
    pub window_minutes: u32,
    pub samples: Vec<Sample>,
    pub summary: Summary,
    pub export_timestamp: String,
}

impl ExportSnapshot {
    /// Snapshot for a channel name with no stored history
    pub fn empty(channel: &str, window_minutes: u32, export_timestamp: String) -> Self {
        Self {
            channel: channel.to_string(),
            window_minutes,
            samples: Vec::new(),
            summary: Summary::empty(),
            export_timestamp,
        }
    }
}

/// Per-channel entry of the store overview
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOverview {
    pub channel: Channel,
    pub total_points: usize,
    pub latest: Option<Sample>,
    pub recent_stats: Summary,
}
