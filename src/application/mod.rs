// Application layer - Store, driver, presenter and the timers that connect them
pub mod chart_presenter;
pub mod chart_views;
pub mod clock;
pub mod dashboard_service;
pub mod feed;
pub mod live_update;
pub mod scheduler;
pub mod simulator;
pub mod time_series_store;
