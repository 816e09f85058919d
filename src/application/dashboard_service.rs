// Dashboard service - Numeric readouts for the live widgets
use crate::application::clock::format_timestamp;
use crate::application::live_update::{ReadingsUpdate, UpdateListener};
use crate::domain::channel::ChannelTable;
use crate::domain::dashboard::{Dashboard, FeedMode};
use crate::domain::telemetry::TileData;
use tokio::sync::watch;

const DASHBOARD_TITLE: &str = "Sensor Monitor";

pub fn build_dashboard(readings: &ChannelTable<f64>, mode: FeedMode, last_update: Option<i64>) -> Dashboard {
    let tiles = readings
        .iter()
        .map(|(channel, value)| TileData::new(channel, *value))
        .collect();

    Dashboard::new(
        DASHBOARD_TITLE.to_string(),
        tiles,
        mode,
        last_update.map(format_timestamp),
    )
}

/// Publishes the latest readouts to anyone watching
pub struct DashboardPublisher {
    tx: watch::Sender<Dashboard>,
}

impl DashboardPublisher {
    pub fn new(initial: Dashboard) -> (Self, watch::Receiver<Dashboard>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }
}

impl UpdateListener for DashboardPublisher {
    fn on_update(&self, update: &ReadingsUpdate) {
        let dashboard = build_dashboard(&update.readings, update.mode, Some(update.timestamp));
        self.tx.send_replace(dashboard);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::channel::Channel;

    #[test]
    fn test_tiles_follow_channel_order() {
        let readings = ChannelTable::from_fn(|c| c.info().simulation.initial);
        let dashboard = build_dashboard(&readings, FeedMode::Simulated, None);

        let ids: Vec<&str> = dashboard.tiles.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["temperature", "humidity", "light", "duty_cycle"]);
        assert_eq!(dashboard.tiles[0].display, "25.6");
        assert_eq!(dashboard.tiles[3].display, "85");
        assert!(dashboard.last_update.is_none());
    }

    #[test]
    fn test_publisher_replaces_latest() {
        let readings = ChannelTable::from_fn(|_| 1.0);
        let (publisher, rx) = DashboardPublisher::new(build_dashboard(&readings, FeedMode::Simulated, None));

        let mut updated = readings.clone();
        updated[Channel::Light] = 640.0;
        publisher.on_update(&ReadingsUpdate {
            timestamp: 0,
            readings: updated,
            mode: FeedMode::LiveFed,
            stored: Channel::COUNT,
        });

        let latest = rx.borrow();
        assert_eq!(latest.mode, FeedMode::LiveFed);
        assert_eq!(latest.tiles[2].value, 640.0);
        assert_eq!(latest.last_update.as_deref(), Some("1970-01-01T00:00:00+00:00"));
    }
}
