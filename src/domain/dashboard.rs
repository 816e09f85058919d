// Dashboard domain model
use super::telemetry::TileData;
use serde::Serialize;

/// Where the current readings come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedMode {
    #[default]
    Simulated,
    LiveFed,
}

/// Live readouts shown above the charts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub title: String,
    pub tiles: Vec<TileData>,
    pub mode: FeedMode,
    pub last_update: Option<String>,
}

impl Dashboard {
    pub fn new(title: String, tiles: Vec<TileData>, mode: FeedMode, last_update: Option<String>) -> Self {
        Self {
            title,
            tiles,
            mode,
            last_update,
        }
    }
}
