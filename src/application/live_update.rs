// Live update driver - Produces one reading per channel per tick
use crate::application::clock::SharedClock;
use crate::application::feed::FeedUpdate;
use crate::application::scheduler::{SharedScheduler, TaskControl, TaskId};
use crate::application::simulator::{RandomWalkSimulator, jitter};
use crate::application::time_series_store::SharedStore;
use crate::domain::channel::{Channel, ChannelTable};
use crate::domain::dashboard::FeedMode;
use rand::RngCore;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Readings recorded by one tick or feed event
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingsUpdate {
    pub timestamp: i64,
    pub readings: ChannelTable<f64>,
    pub mode: FeedMode,
    pub stored: usize,
}

/// Notified after every recorded update
pub trait UpdateListener: Send {
    fn on_update(&self, update: &ReadingsUpdate);
}

/// Layers of demo history: (points, spacing in ms, per-channel base and spread)
const DEMO_LAYERS: [(i64, i64, [(f64, f64); Channel::COUNT]); 3] = [
    (144, 10 * 60_000, [(20.0, 15.0), (40.0, 40.0), (300.0, 500.0), (30.0, 40.0)]),
    (60, 60_000, [(22.0, 8.0), (50.0, 20.0), (400.0, 300.0), (40.0, 30.0)]),
    (60, 10_000, [(24.0, 4.0), (55.0, 10.0), (500.0, 200.0), (50.0, 20.0)]),
];

pub struct LiveUpdateDriver {
    store: SharedStore,
    clock: SharedClock,
    simulator: RandomWalkSimulator,
    rng: Box<dyn RngCore + Send>,
    readings: ChannelTable<f64>,
    mode: FeedMode,
    last_update: Option<i64>,
    listeners: Vec<Box<dyn UpdateListener>>,
}

impl LiveUpdateDriver {
    pub fn new(store: SharedStore, clock: SharedClock, rng: Box<dyn RngCore + Send>) -> Self {
        let simulator = RandomWalkSimulator::new();
        let readings = simulator.values().clone();
        Self {
            store,
            clock,
            simulator,
            rng,
            readings,
            mode: FeedMode::Simulated,
            last_update: None,
            listeners: Vec::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn UpdateListener>) {
        self.listeners.push(listener);
    }

    pub fn readings(&self) -> &ChannelTable<f64> {
        &self.readings
    }

    pub fn mode(&self) -> FeedMode {
        self.mode
    }

    pub fn last_update(&self) -> Option<i64> {
        self.last_update
    }

    /// Advance the simulator unless an external feed owns the readings,
    /// then record every channel.
    pub fn tick(&mut self) -> ReadingsUpdate {
        if self.mode == FeedMode::Simulated {
            self.readings = self.simulator.step(&mut *self.rng).clone();
            tracing::debug!("Simulated readings updated");
        }
        self.record()
    }

    /// On-demand update, identical to a scheduled tick
    pub fn manual_update(&mut self) -> ReadingsUpdate {
        self.tick()
    }

    /// Take values from an external feed. From here on ticks only re-record
    /// the latest external values until `reset_feed` is called.
    pub fn ingest_external(&mut self, update: &FeedUpdate) -> ReadingsUpdate {
        for &(channel, value) in &update.values {
            if value.is_finite() {
                self.readings[channel] = value;
            } else {
                tracing::debug!("Dropping non-finite feed value for {}", channel);
            }
        }
        self.simulator.resume_from(&self.readings);

        if self.mode != FeedMode::LiveFed {
            tracing::info!("External feed active, simulator suppressed");
            self.mode = FeedMode::LiveFed;
        }
        self.record()
    }

    pub fn reset_feed(&mut self) {
        if self.mode == FeedMode::LiveFed {
            tracing::info!("Switching back to simulated readings");
        }
        self.mode = FeedMode::Simulated;
    }

    /// Backfill a day of layered demo history ending at the current time
    pub fn seed_demo_history(&mut self) -> usize {
        let now = self.clock.now_ms();
        let mut store = self.store.lock();
        let mut stored = 0;

        for (points, spacing, profile) in DEMO_LAYERS {
            for i in 0..points {
                let timestamp = now - i * spacing;
                for channel in Channel::ALL {
                    let (base, spread) = profile[channel.index()];
                    let value = jitter(&mut *self.rng, base, spread);
                    if store.append(channel, value, Some(timestamp)) {
                        stored += 1;
                    }
                }
            }
        }

        tracing::info!("Seeded {} demo samples", stored);
        stored
    }

    fn record(&mut self) -> ReadingsUpdate {
        let timestamp = self.clock.now_ms();
        let stored = {
            let mut store = self.store.lock();
            self.readings
                .iter()
                .filter(|(channel, value)| store.append(*channel, **value, Some(timestamp)))
                .count()
        };
        self.last_update = Some(timestamp);

        let update = ReadingsUpdate {
            timestamp,
            readings: self.readings.clone(),
            mode: self.mode,
            stored,
        };
        for listener in &self.listeners {
            listener.on_update(&update);
        }
        update
    }
}

/// Driver handle shared by the update tick, the feed pump and HTTP handlers
#[derive(Clone)]
pub struct SharedDriver {
    inner: Arc<Mutex<LiveUpdateDriver>>,
}

impl SharedDriver {
    pub fn new(driver: LiveUpdateDriver) -> Self {
        Self {
            inner: Arc::new(Mutex::new(driver)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, LiveUpdateDriver> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Starts and stops the periodic update tick
pub struct UpdateLoop {
    driver: SharedDriver,
    scheduler: SharedScheduler,
    clock: SharedClock,
    period: Duration,
    task: Mutex<Option<TaskId>>,
}

impl UpdateLoop {
    pub fn new(driver: SharedDriver, scheduler: SharedScheduler, clock: SharedClock, period: Duration) -> Self {
        Self {
            driver,
            scheduler,
            clock,
            period,
            task: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_running(&self) -> bool {
        self.task_slot().is_some()
    }

    /// Record the current readings immediately, then tick every period.
    /// Returns false if the loop was already running.
    pub fn start(&self) -> bool {
        let mut slot = self.task_slot();
        if slot.is_some() {
            return false;
        }

        self.driver.lock().tick();

        let driver = self.driver.clone();
        let id = self.scheduler.lock().every("live-update", self.period, self.clock.now_ms(), move |_| {
            driver.lock().tick();
            TaskControl::Continue
        });
        *slot = Some(id);
        tracing::info!("Live updates started every {:?}", self.period);
        true
    }

    pub fn stop(&self) -> bool {
        let Some(id) = self.task_slot().take() else {
            return false;
        };
        self.scheduler.lock().cancel(id);
        tracing::info!("Live updates stopped");
        true
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<TaskId>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::{Clock, ManualClock};
    use crate::application::time_series_store::{RetentionPolicy, TimeSeriesStore};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fixture() -> (LiveUpdateDriver, SharedStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = SharedStore::new(TimeSeriesStore::new(RetentionPolicy::default(), clock.clone()));
        let driver = LiveUpdateDriver::new(store.clone(), clock.clone(), Box::new(StdRng::seed_from_u64(3)));
        (driver, store, clock)
    }

    struct CountingListener(Arc<AtomicUsize>);

    impl UpdateListener for CountingListener {
        fn on_update(&self, _update: &ReadingsUpdate) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_tick_records_one_sample_per_channel() {
        let (mut driver, store, clock) = fixture();
        let update = driver.tick();
        clock.advance(10_000);
        driver.tick();

        assert_eq!(update.stored, Channel::COUNT);
        assert_eq!(update.mode, FeedMode::Simulated);
        for channel in Channel::ALL {
            assert_eq!(store.lock().len(channel), 2);
        }
        assert_eq!(driver.last_update(), Some(1_010_000));
    }

    #[test]
    fn test_external_values_suppress_simulator() {
        let (mut driver, store, clock) = fixture();
        driver.ingest_external(&FeedUpdate::new(vec![
            (Channel::Temperature, 30.5),
            (Channel::Humidity, f64::NAN),
        ]));
        assert_eq!(driver.mode(), FeedMode::LiveFed);

        clock.advance(10_000);
        let update = driver.tick();
        assert_eq!(update.readings[Channel::Temperature], 30.5);
        assert_eq!(update.readings[Channel::Humidity], 65.2);

        let temps: Vec<f64> = store.query(Channel::Temperature, 1).iter().map(|s| s.value).collect();
        assert_eq!(temps, vec![30.5, 30.5]);

        driver.reset_feed();
        assert_eq!(driver.mode(), FeedMode::Simulated);
    }

    #[test]
    fn test_listeners_are_notified() {
        let (mut driver, _, _) = fixture();
        let count = Arc::new(AtomicUsize::new(0));
        driver.add_listener(Box::new(CountingListener(count.clone())));

        driver.tick();
        driver.manual_update();
        driver.ingest_external(&FeedUpdate::new(vec![(Channel::Light, 500.0)]));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_demo_history_covers_a_day() {
        let (mut driver, store, _) = fixture();
        let stored = driver.seed_demo_history();

        assert_eq!(stored, (144 + 60 + 60) * Channel::COUNT);
        let store = store.lock();
        assert_eq!(store.query(Channel::Light, 1440).len(), 264);
        assert!(store.query(Channel::Light, 10).len() >= 60);
    }

    #[test]
    fn test_update_loop_start_stop() {
        let (driver, store, clock) = fixture();
        let driver = SharedDriver::new(driver);
        let scheduler = SharedScheduler::new();
        let update_loop = UpdateLoop::new(driver, scheduler.clone(), clock.clone(), Duration::from_secs(10));

        assert!(update_loop.start());
        assert!(!update_loop.start());
        assert_eq!(store.lock().len(Channel::Temperature), 1);

        clock.advance(10_000);
        scheduler.lock().run_due(clock.now_ms());
        assert_eq!(store.lock().len(Channel::Temperature), 2);

        assert!(update_loop.stop());
        assert!(!update_loop.is_running());
        clock.advance(10_000);
        scheduler.lock().run_due(clock.now_ms());
        assert_eq!(store.lock().len(Channel::Temperature), 2);
    }
}
