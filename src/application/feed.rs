// External feed seam - Adapters push channel values into the live driver
use crate::application::live_update::SharedDriver;
use crate::domain::channel::Channel;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// A partial set of channel readings from an external source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedUpdate {
    pub values: Vec<(Channel, f64)>,
}

impl FeedUpdate {
    pub fn new(values: Vec<(Channel, f64)>) -> Self {
        Self { values }
    }

    /// Build an update from a `{channel: value}` payload. Null values are
    /// skipped, unknown channel names are logged and ignored.
    pub fn from_named(payload: &HashMap<String, Option<f64>>) -> Self {
        let mut values = Vec::new();
        for (name, value) in payload {
            match (Channel::parse(name), value) {
                (Some(channel), Some(value)) => values.push((channel, *value)),
                (Some(_), None) => {}
                (None, _) => tracing::warn!("Ignoring feed value for unknown channel: {}", name),
            }
        }
        values.sort_by_key(|(channel, _)| channel.index());
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum FeedStatus {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Update(FeedUpdate),
    Status(FeedStatus),
}

/// Where adapters deliver updates and status changes
#[derive(Debug, Clone)]
pub struct FeedSink {
    tx: mpsc::Sender<FeedEvent>,
}

impl FeedSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FeedEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Returns false once the pump is gone
    pub async fn update(&self, update: FeedUpdate) -> bool {
        self.tx.send(FeedEvent::Update(update)).await.is_ok()
    }

    pub async fn status(&self, status: FeedStatus) -> bool {
        self.tx.send(FeedEvent::Status(status)).await.is_ok()
    }
}

#[async_trait]
pub trait FeedAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver updates into `sink` until the sink closes or the adapter gives up
    async fn run(&self, sink: FeedSink) -> anyhow::Result<()>;
}

/// Run `adapter` until it returns, then report it gone so the driver falls
/// back to simulation
pub async fn run_feed(adapter: Arc<dyn FeedAdapter>, sink: FeedSink) {
    tracing::info!("Starting {} feed", adapter.name());
    let status = match adapter.run(sink.clone()).await {
        Ok(()) => FeedStatus::Disconnected,
        Err(e) => {
            tracing::error!("{} feed stopped: {:#}", adapter.name(), e);
            FeedStatus::Failed(format!("{:#}", e))
        }
    };
    if !sink.status(status).await {
        tracing::debug!("{} feed ended after the pump", adapter.name());
    }
}

/// Apply feed events to the driver until every sink is dropped
pub async fn pump_feed_events(
    mut rx: mpsc::Receiver<FeedEvent>,
    driver: SharedDriver,
    status_tx: watch::Sender<FeedStatus>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::Update(update) => {
                if update.is_empty() {
                    continue;
                }
                driver.lock().ingest_external(&update);
            }
            FeedEvent::Status(status) => {
                match &status {
                    FeedStatus::Failed(reason) => {
                        tracing::warn!("Feed failed, falling back to simulation: {}", reason);
                        driver.lock().reset_feed();
                    }
                    FeedStatus::Disconnected => {
                        tracing::info!("Feed disconnected, falling back to simulation");
                        driver.lock().reset_feed();
                    }
                    other => tracing::info!("Feed status: {:?}", other),
                }
                let _ = status_tx.send(status);
            }
        }
    }
    tracing::debug!("Feed pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::ManualClock;
    use crate::application::live_update::LiveUpdateDriver;
    use crate::application::time_series_store::{RetentionPolicy, SharedStore, TimeSeriesStore};
    use crate::domain::dashboard::FeedMode;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_from_named_skips_nulls_and_unknown_names() {
        let mut payload = HashMap::new();
        payload.insert("pwm".to_string(), Some(40.0));
        payload.insert("temperature".to_string(), Some(21.0));
        payload.insert("humidity".to_string(), None);
        payload.insert("pressure".to_string(), Some(1013.0));

        let update = FeedUpdate::from_named(&payload);
        assert_eq!(
            update.values,
            vec![(Channel::Temperature, 21.0), (Channel::DutyCycle, 40.0)]
        );
    }

    #[tokio::test]
    async fn test_pump_applies_updates_and_falls_back_on_failure() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = SharedStore::new(TimeSeriesStore::new(RetentionPolicy::default(), clock.clone()));
        let driver = SharedDriver::new(LiveUpdateDriver::new(
            store.clone(),
            clock,
            Box::new(StdRng::seed_from_u64(1)),
        ));
        let (sink, rx) = FeedSink::channel(8);
        let (status_tx, status_rx) = watch::channel(FeedStatus::Idle);
        let pump = tokio::spawn(pump_feed_events(rx, driver.clone(), status_tx));

        assert!(sink.status(FeedStatus::Connected).await);
        assert!(sink.update(FeedUpdate::new(vec![(Channel::Light, 321.0)])).await);
        assert!(sink.status(FeedStatus::Failed("timeout".into())).await);
        drop(sink);
        pump.await.unwrap();

        assert_eq!(*status_rx.borrow(), FeedStatus::Failed("timeout".into()));
        assert_eq!(driver.lock().mode(), FeedMode::Simulated);
        assert_eq!(store.lock().latest(Channel::Light).map(|s| s.value), Some(321.0));
    }

    struct OneShotFeed;

    #[async_trait]
    impl FeedAdapter for OneShotFeed {
        fn name(&self) -> &str {
            "one-shot"
        }

        async fn run(&self, sink: FeedSink) -> anyhow::Result<()> {
            sink.update(FeedUpdate::new(vec![(Channel::Temperature, 30.0)])).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_finished_feed_reports_disconnect() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = SharedStore::new(TimeSeriesStore::new(RetentionPolicy::default(), clock.clone()));
        let driver = SharedDriver::new(LiveUpdateDriver::new(store, clock, Box::new(StdRng::seed_from_u64(2))));
        let (sink, rx) = FeedSink::channel(8);
        let (status_tx, status_rx) = watch::channel(FeedStatus::Idle);
        let pump = tokio::spawn(pump_feed_events(rx, driver.clone(), status_tx));

        run_feed(Arc::new(OneShotFeed), sink).await;
        pump.await.unwrap();

        assert_eq!(*status_rx.borrow(), FeedStatus::Disconnected);
        assert_eq!(driver.lock().mode(), FeedMode::Simulated);
        assert_eq!(driver.lock().readings()[Channel::Temperature], 30.0);
    }
}
