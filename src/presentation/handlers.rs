// HTTP request handlers
use crate::application::chart_presenter::{ChartPresenter, build_frame, empty_frame};
use crate::application::chart_views::ViewId;
use crate::application::clock::format_timestamp;
use crate::application::dashboard_service::build_dashboard;
use crate::application::feed::FeedUpdate;
use crate::domain::channel::{Channel, ChannelInfo};
use crate::domain::dashboard::FeedMode;
use crate::domain::telemetry::{ExportSnapshot, Summary, TimeWindow};
use crate::infrastructure::chunked_stream::{stream_from_receiver, stream_from_watch};
use crate::infrastructure::http_response::{accepts_brotli, json_response};
use crate::infrastructure::stream_renderer::StreamRenderer;
use crate::presentation::app_state::AppState;
use crate::presentation::error::{ApiError, ApiResult};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const STREAM_BUFFER_FRAMES: usize = 8;

/// Response header carrying the id of a freshly opened chart view
pub const CHART_VIEW_HEADER: &str = "x-chart-view";

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    pub minutes: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DriverState {
    running: bool,
    changed: bool,
    interval_secs: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceStatus {
    mode: FeedMode,
    driver_running: bool,
    scheduled_tasks: usize,
    open_views: usize,
}

impl AppState {
    fn window(&self, query: &WindowQuery) -> ApiResult<TimeWindow> {
        match query.minutes {
            None => Ok(self.chart.default_window),
            Some(minutes) => TimeWindow::from_minutes(minutes).ok_or_else(|| {
                ApiError::Validation(format!("minutes must be one of 1, 10, 60, 1440 (got {})", minutes))
            }),
        }
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn service_status(State(state): State<Arc<AppState>>) -> Response {
    let status = ServiceStatus {
        mode: state.driver.lock().mode(),
        driver_running: state.update_loop.is_running(),
        scheduled_tasks: state.scheduler.lock().len(),
        open_views: state.chart_views.len(),
    };
    json_response(&status, StatusCode::OK, false).await
}

pub async fn list_channels(headers: HeaderMap) -> Response {
    let channels: Vec<&ChannelInfo> = Channel::ALL.iter().map(|c| c.info()).collect();
    json_response(&channels, StatusCode::OK, accepts_brotli(&headers)).await
}

/// Current numeric readouts
pub async fn get_readings(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let dashboard = state.dashboard.borrow().clone();
    json_response(&dashboard, StatusCode::OK, accepts_brotli(&headers)).await
}

/// Readouts pushed after every update
pub async fn stream_readings(headers: HeaderMap, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    stream_from_watch(state.dashboard.clone(), accepts_brotli(&headers))
}

pub async fn get_overview(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let overview = state.store.lock().overview();
    json_response(&overview, StatusCode::OK, accepts_brotli(&headers)).await
}

/// Raw samples for one channel
pub async fn get_history(
    Path(name): Path<String>,
    Query(query): Query<WindowQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let window = state.window(&query)?;
    let compress = accepts_brotli(&headers);
    let Some(channel) = Channel::parse(&name) else {
        return Ok(json_response(&Vec::<()>::new(), StatusCode::OK, compress).await);
    };

    let samples = state.store.query(channel, window.minutes());
    Ok(json_response(&samples, StatusCode::OK, compress).await)
}

pub async fn get_summary(
    Path(name): Path<String>,
    Query(query): Query<WindowQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let window = state.window(&query)?;
    let summary = Channel::parse(&name)
        .map(|channel| state.store.summarize(channel, window.minutes()))
        .unwrap_or_else(Summary::empty);
    Ok(json_response(&summary, StatusCode::OK, accepts_brotli(&headers)).await)
}

/// One chart frame for a channel and window
pub async fn get_chart(
    Path(name): Path<String>,
    Query(query): Query<WindowQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let window = state.window(&query)?;
    let compress = accepts_brotli(&headers);
    let Some(channel) = Channel::parse(&name) else {
        tracing::debug!("Chart requested for unknown channel {}", name);
        let frame = empty_frame(&name, window, state.clock.now_ms());
        return Ok(json_response(&frame, StatusCode::OK, compress).await);
    };

    let frame = build_frame(&state.store.lock(), channel, window, state.chart.max_points);
    Ok(json_response(&frame, StatusCode::OK, compress).await)
}

/// Live chart view: one frame on open, then one per refresh period until
/// the client goes away or the view is closed. The view id comes back in
/// the `x-chart-view` header.
pub async fn stream_chart(
    Path(name): Path<String>,
    Query(query): Query<WindowQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let window = state.window(&query)?;
    let channel = Channel::parse(&name).ok_or_else(|| ApiError::NotFound(format!("channel {}", name)))?;

    let (renderer, rx) = StreamRenderer::channel(STREAM_BUFFER_FRAMES);
    let mut presenter = ChartPresenter::new(state.store.clone(), renderer, state.chart.max_points);
    presenter.open(channel, window)?;
    let id = state.chart_views.register(
        presenter,
        &state.scheduler,
        state.chart.refresh_interval,
        state.clock.now_ms(),
    );

    tracing::info!("Streaming {} chart over {} as view {}", channel, window.label(), id);
    let mut response = stream_from_receiver(rx, accepts_brotli(&headers)).into_response();
    response
        .headers_mut()
        .insert(HeaderName::from_static(CHART_VIEW_HEADER), HeaderValue::from(id));
    Ok(response)
}

pub async fn list_views(State(state): State<Arc<AppState>>) -> Response {
    json_response(&state.chart_views.list(), StatusCode::OK, false).await
}

/// Switch an open view to another window; the new frame also goes out on
/// the view's stream
pub async fn select_view_window(
    Path(id): Path<ViewId>,
    Query(query): Query<WindowQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let window = state.window(&query)?;
    let frame = state.chart_views.select_window(id, window)?;
    Ok(json_response(&frame, StatusCode::OK, accepts_brotli(&headers)).await)
}

/// Export what an open view currently shows
pub async fn export_view(
    Path(id): Path<ViewId>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let snapshot = state.chart_views.export(id)?;
    Ok(json_response(&snapshot, StatusCode::OK, accepts_brotli(&headers)).await)
}

pub async fn close_view(Path(id): Path<ViewId>, State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    if !state.chart_views.close(id) {
        return Err(ApiError::NotFound(format!("chart view {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Export snapshot for one channel
pub async fn export_channel(
    Path(name): Path<String>,
    Query(query): Query<WindowQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let window = state.window(&query)?;
    let compress = accepts_brotli(&headers);
    let Some(channel) = Channel::parse(&name) else {
        tracing::debug!("Export requested for unknown channel {}", name);
        let snapshot = ExportSnapshot::empty(&name, window.minutes(), format_timestamp(state.clock.now_ms()));
        return Ok(json_response(&snapshot, StatusCode::OK, compress).await);
    };

    let snapshot = state.store.lock().export(channel, window.minutes());
    Ok(json_response(&snapshot, StatusCode::OK, compress).await)
}

pub async fn export_all(
    Query(query): Query<WindowQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Response> {
    let window = state.window(&query)?;
    let snapshots = state.store.lock().export_all(window.minutes());
    Ok(json_response(&snapshots, StatusCode::OK, accepts_brotli(&headers)).await)
}

pub async fn feed_status(State(state): State<Arc<AppState>>) -> Response {
    let status = state.feed_status.borrow().clone();
    json_response(&status, StatusCode::OK, false).await
}

/// External push of `{channel: value}` readings
pub async fn push_feed(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<HashMap<String, Option<f64>>>,
) -> ApiResult<Response> {
    let update = FeedUpdate::from_named(&payload);
    if update.is_empty() {
        return Err(ApiError::Validation("payload holds no known channel values".to_string()));
    }

    let accepted = update.values.len();
    if !state.feed_sink.update(update).await {
        return Err(ApiError::ServiceUnavailable("feed pump stopped".to_string()));
    }
    Ok(json_response(&serde_json::json!({ "accepted": accepted }), StatusCode::ACCEPTED, false).await)
}

pub async fn reset_feed(State(state): State<Arc<AppState>>) -> Response {
    let dashboard = {
        let mut driver = state.driver.lock();
        driver.reset_feed();
        build_dashboard(driver.readings(), driver.mode(), driver.last_update())
    };
    json_response(&dashboard, StatusCode::OK, false).await
}

/// Record a fresh reading now, outside the tick schedule
pub async fn manual_update(State(state): State<Arc<AppState>>) -> Response {
    let update = state.driver.lock().manual_update();
    let dashboard = build_dashboard(&update.readings, update.mode, Some(update.timestamp));
    json_response(&dashboard, StatusCode::OK, false).await
}

pub async fn start_driver(State(state): State<Arc<AppState>>) -> Response {
    let changed = state.update_loop.start();
    let body = DriverState {
        running: state.update_loop.is_running(),
        changed,
        interval_secs: state.update_loop.period().as_secs(),
    };
    json_response(&body, StatusCode::OK, false).await
}

pub async fn stop_driver(State(state): State<Arc<AppState>>) -> Response {
    let changed = state.update_loop.stop();
    let body = DriverState {
        running: state.update_loop.is_running(),
        changed,
        interval_secs: state.update_loop.period().as_secs(),
    };
    json_response(&body, StatusCode::OK, false).await
}

pub async fn clear_history(State(state): State<Arc<AppState>>) -> StatusCode {
    state.store.lock().clear();
    StatusCode::NO_CONTENT
}
