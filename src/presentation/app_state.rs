// Application state for HTTP handlers
use crate::application::chart_views::ChartViews;
use crate::application::clock::SharedClock;
use crate::application::feed::{FeedSink, FeedStatus};
use crate::application::live_update::{SharedDriver, UpdateLoop};
use crate::application::scheduler::SharedScheduler;
use crate::application::time_series_store::SharedStore;
use crate::domain::dashboard::Dashboard;
use crate::domain::telemetry::TimeWindow;
use crate::infrastructure::stream_renderer::StreamRenderer;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy)]
pub struct ChartOptions {
    pub refresh_interval: Duration,
    pub max_points: usize,
    pub default_window: TimeWindow,
}

pub struct AppState {
    pub clock: SharedClock,
    pub store: SharedStore,
    pub driver: SharedDriver,
    pub update_loop: UpdateLoop,
    pub scheduler: SharedScheduler,
    pub chart_views: ChartViews<StreamRenderer>,
    pub feed_sink: FeedSink,
    pub feed_status: watch::Receiver<FeedStatus>,
    pub dashboard: watch::Receiver<Dashboard>,
    pub chart: ChartOptions,
}
