// Chart presenter - Keeps one channel/window chart view rendered and fresh
use crate::application::time_series_store::{SharedStore, TimeSeriesStore};
use crate::domain::channel::Channel;
use crate::domain::telemetry::{
    ChartData, ChartFrame, ChartKind, ChartPoint, ExportSnapshot, Sample, SeriesData, Summary, TimeWindow,
};
use thiserror::Error;

const TOOLTIP_FRACTION_DIGITS: u32 = 2;

#[derive(Debug, Error, PartialEq)]
pub enum RenderError {
    #[error("{0}")]
    Unavailable(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum PresenterError {
    #[error("no chart view is open")]
    NotOpen,

    #[error("chart renderer unavailable: {0}")]
    RendererUnavailable(String),

    #[error("chart view {0} does not exist")]
    UnknownView(u64),
}

/// Drawing surface for chart frames
pub trait ChartRenderer: Send {
    fn render(&mut self, frame: &ChartFrame) -> Result<(), RenderError>;

    /// Free whatever the surface holds once the view closes
    fn release(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct OpenView {
    channel: Channel,
    window: TimeWindow,
}

pub struct ChartPresenter<R: ChartRenderer> {
    store: SharedStore,
    renderer: R,
    max_points: usize,
    view: Option<OpenView>,
}

impl<R: ChartRenderer> ChartPresenter<R> {
    pub fn new(store: SharedStore, renderer: R, max_points: usize) -> Self {
        Self {
            store,
            renderer,
            max_points,
            view: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.view.is_some()
    }

    pub fn selection(&self) -> Option<(Channel, TimeWindow)> {
        self.view.map(|v| (v.channel, v.window))
    }

    /// Show `channel` over `window` and render the first frame
    pub fn open(&mut self, channel: Channel, window: TimeWindow) -> Result<ChartFrame, PresenterError> {
        tracing::debug!("Opening {} chart over {}", channel, window.label());
        self.view = Some(OpenView { channel, window });
        self.render()
    }

    pub fn select_window(&mut self, window: TimeWindow) -> Result<ChartFrame, PresenterError> {
        let view = self.view.as_mut().ok_or(PresenterError::NotOpen)?;
        view.window = window;
        self.render()
    }

    pub fn refresh(&mut self) -> Result<ChartFrame, PresenterError> {
        self.render()
    }

    /// Tear the view down and release renderer resources
    pub fn close(&mut self) {
        if let Some(view) = self.view.take() {
            self.renderer.release();
            tracing::debug!("Closed {} chart", view.channel);
        }
    }

    pub fn export(&self) -> Option<ExportSnapshot> {
        let view = self.view?;
        Some(self.store.lock().export(view.channel, view.window.minutes()))
    }

    fn render(&mut self) -> Result<ChartFrame, PresenterError> {
        let view = self.view.ok_or(PresenterError::NotOpen)?;
        let frame = build_frame(&self.store.lock(), view.channel, view.window, self.max_points);

        if let Err(RenderError::Unavailable(reason)) = self.renderer.render(&frame) {
            tracing::warn!("Chart renderer unavailable, closing view: {}", reason);
            self.close();
            return Err(PresenterError::RendererUnavailable(reason));
        }
        Ok(frame)
    }
}

impl<R: ChartRenderer> Drop for ChartPresenter<R> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Query the store and lay out one chart frame
pub fn build_frame(store: &TimeSeriesStore, channel: Channel, window: TimeWindow, max_points: usize) -> ChartFrame {
    let info = channel.info();
    let samples = store.query(channel, window.minutes());
    let summary = Summary::from_samples(&samples);
    let points: Vec<ChartPoint> = downsample(samples, max_points)
        .into_iter()
        .map(ChartPoint::from)
        .collect();

    let series = SeriesData {
        id: channel.id().to_string(),
        name: format!("{} ({})", info.name, info.unit),
        color: Some(info.color.to_string()),
        points,
    };

    let chart = ChartData {
        id: channel.id().to_string(),
        title: format!("{} trend - last {}", info.name, window.label()),
        unit: Some(info.unit.to_string()),
        kind: ChartKind::Line,
        y_min: info.begin_at_zero.then_some(0.0),
        y_max: None,
        fraction_digits: Some(TOOLTIP_FRACTION_DIGITS),
        series: vec![series],
    };

    ChartFrame {
        channel: channel.id().to_string(),
        window_minutes: window,
        chart,
        summary,
        rendered_at: store.now_ms(),
    }
}

/// Frame for a channel name with no stored history
pub fn empty_frame(name: &str, window: TimeWindow, now_ms: i64) -> ChartFrame {
    ChartFrame {
        channel: name.to_string(),
        window_minutes: window,
        chart: ChartData {
            id: name.to_string(),
            title: format!("{} trend - last {}", name, window.label()),
            unit: None,
            kind: ChartKind::Line,
            y_min: None,
            y_max: None,
            fraction_digits: Some(TOOLTIP_FRACTION_DIGITS),
            series: Vec::new(),
        },
        summary: Summary::empty(),
        rendered_at: now_ms,
    }
}

/// Downsample samples using bucket averaging. Each bucket keeps its middle
/// timestamp and the mean value. `max_points == 0` disables downsampling.
pub fn downsample(samples: Vec<Sample>, max_points: usize) -> Vec<Sample> {
    if max_points == 0 || samples.len() <= max_points {
        return samples;
    }

    let bucket_size = samples.len().div_ceil(max_points);
    samples
        .chunks(bucket_size)
        .map(|chunk| {
            let avg = chunk.iter().map(|s| s.value).sum::<f64>() / chunk.len() as f64;
            Sample::new(chunk[chunk.len() / 2].timestamp, avg)
        })
        .collect()
}
