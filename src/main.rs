// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::future::IntoFuture;
use std::time::Duration;
use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Router,
    routing::{delete, get, post, put},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::chart_views::ChartViews;
use crate::application::clock::{SharedClock, SystemClock};
use crate::application::dashboard_service::{DashboardPublisher, build_dashboard};
use crate::application::feed::{FeedAdapter, FeedSink, FeedStatus, pump_feed_events, run_feed};
use crate::application::live_update::{LiveUpdateDriver, SharedDriver, UpdateLoop};
use crate::application::scheduler::SharedScheduler;
use crate::application::time_series_store::{SharedStore, TimeSeriesStore};
use crate::infrastructure::config::load_config;
use crate::infrastructure::influx_feed::InfluxFeed;
use crate::presentation::app_state::{AppState, ChartOptions};
use crate::presentation::handlers;

const FEED_BUFFER: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_config().context("loading dashboard configuration")?;
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", config.server.bind))?;

    // Store and driver (application layer)
    let clock: SharedClock = Arc::new(SystemClock);
    let store = SharedStore::new(TimeSeriesStore::new(config.retention.clone(), clock.clone()));

    let mut driver = LiveUpdateDriver::new(store.clone(), clock.clone(), Box::new(StdRng::from_entropy()));
    if config.driver.seed_demo_history {
        driver.seed_demo_history();
    }
    let (publisher, dashboard) =
        DashboardPublisher::new(build_dashboard(driver.readings(), driver.mode(), driver.last_update()));
    driver.add_listener(Box::new(publisher));
    let driver = SharedDriver::new(driver);

    // Timers
    let scheduler = SharedScheduler::new();
    store.schedule_eviction(&scheduler, clock.now_ms());
    let update_loop = UpdateLoop::new(
        driver.clone(),
        scheduler.clone(),
        clock.clone(),
        config.driver.update_interval(),
    );
    update_loop.start();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let scheduler_task = tokio::spawn(scheduler.clone().run(
        clock.clone(),
        config.driver.scheduler_resolution(),
        shutdown_rx,
    ));

    // External feeds (infrastructure layer)
    let (feed_sink, feed_rx) = FeedSink::channel(FEED_BUFFER);
    let (status_tx, feed_status) = watch::channel(FeedStatus::Idle);
    tokio::spawn(pump_feed_events(feed_rx, driver.clone(), status_tx));

    if let Some(influx) = &config.feed.influx {
        let adapter: Arc<dyn FeedAdapter> = Arc::new(InfluxFeed::new(influx));
        tokio::spawn(run_feed(adapter, feed_sink.clone()));
    }

    // Create application state
    let state = Arc::new(AppState {
        clock,
        store,
        driver,
        update_loop,
        scheduler,
        chart_views: ChartViews::new(),
        feed_sink,
        feed_status,
        dashboard,
        chart: ChartOptions {
            refresh_interval: config.chart_refresh_interval(),
            max_points: config.chart.max_points,
            default_window: config.default_window(),
        },
    });

    // Build router (presentation layer)
    // Responses are Brotli-compressed by the handlers themselves, so no
    // CompressionLayer here
    let router = Router::new()
        .route("/healthz", get(handlers::health_check))
        .route("/status", get(handlers::service_status))
        .route("/channels", get(handlers::list_channels))
        .route("/readings", get(handlers::get_readings))
        .route("/readings/stream", get(handlers::stream_readings))
        .route("/overview", get(handlers::get_overview))
        .route("/history/:channel", get(handlers::get_history))
        .route("/summary/:channel", get(handlers::get_summary))
        .route("/charts/:channel", get(handlers::get_chart))
        .route("/charts/:channel/stream", get(handlers::stream_chart))
        .route("/views", get(handlers::list_views))
        .route("/views/:id", delete(handlers::close_view))
        .route("/views/:id/window", put(handlers::select_view_window))
        .route("/views/:id/export", get(handlers::export_view))
        .route("/export", get(handlers::export_all))
        .route("/export/:channel", get(handlers::export_channel))
        .route("/feed", post(handlers::push_feed))
        .route("/feed/status", get(handlers::feed_status))
        .route("/feed/reset", post(handlers::reset_feed))
        .route("/update", post(handlers::manual_update))
        .route("/driver/start", post(handlers::start_driver))
        .route("/driver/stop", post(handlers::stop_driver))
        .route("/history", delete(handlers::clear_history))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // Start server
    tracing::info!("Starting sensor-dashboard service on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
        .into_future();

    // Live streams only end once their producers go away, so give open
    // connections a grace period and then exit regardless
    let mut stopping = shutdown_tx.subscribe();
    tokio::select! {
        result = server => result?,
        _ = async {
            let _ = stopping.wait_for(|stop| *stop).await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => tracing::warn!("Streaming clients still connected after {:?}, exiting", SHUTDOWN_GRACE),
    }

    state.update_loop.stop();
    scheduler_task.await?;
    Ok(())
}

/// Resolves on Ctrl-C after telling the scheduler to stop
async fn shutdown_signal(shutdown_tx: Arc<watch::Sender<bool>>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(true);
}
