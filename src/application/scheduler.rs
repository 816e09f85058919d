// Scheduler - Periodic tasks driven by an explicit tick source
use crate::application::clock::SharedClock;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// What a task wants after it ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

type Handler = Box<dyn FnMut(i64) -> TaskControl + Send>;

struct ScheduledTask {
    id: TaskId,
    name: String,
    period_ms: i64,
    next_due: i64,
    handler: Handler,
}

#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<ScheduledTask>,
    next_id: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` to run every `period`, first at `start_ms + period`
    pub fn every<F>(&mut self, name: impl Into<String>, period: Duration, start_ms: i64, handler: F) -> TaskId
    where
        F: FnMut(i64) -> TaskControl + Send + 'static,
    {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let period_ms = (period.as_millis() as i64).max(1);
        let name = name.into();
        tracing::debug!("Scheduling task {} every {}ms", name, period_ms);

        self.tasks.push(ScheduledTask {
            id,
            name,
            period_ms,
            next_due: start_ms + period_ms,
            handler: Box::new(handler),
        });
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        let removed = self.tasks.len() != before;
        if removed {
            tracing::debug!("Cancelled task {:?}", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task due at `now_ms` once, earliest first. Missed periods
    /// are skipped rather than replayed. Returns how many tasks ran.
    pub fn run_due(&mut self, now_ms: i64) -> usize {
        let mut due: Vec<usize> = (0..self.tasks.len())
            .filter(|&i| self.tasks[i].next_due <= now_ms)
            .collect();
        due.sort_by_key(|&i| self.tasks[i].next_due);

        let mut finished = Vec::new();
        for &i in &due {
            let task = &mut self.tasks[i];
            if (task.handler)(now_ms) == TaskControl::Stop {
                tracing::debug!("Task {} finished", task.name);
                finished.push(task.id);
            }
            let behind = (now_ms - task.next_due) / task.period_ms + 1;
            task.next_due += behind * task.period_ms;
        }

        if !finished.is_empty() {
            self.tasks.retain(|t| !finished.contains(&t.id));
        }
        due.len()
    }
}

/// Scheduler handle shared between the tick loop and whoever registers tasks
#[derive(Clone, Default)]
pub struct SharedScheduler {
    inner: Arc<Mutex<Scheduler>>,
}

impl SharedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, Scheduler> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive `run_due` from the clock every `resolution` until `shutdown`
    /// flips to true.
    pub async fn run(self, clock: SharedClock, resolution: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(resolution);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!("Scheduler running at {:?} resolution", resolution);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.lock().run_due(clock.now_ms());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        let scheduler = self.lock();
        if scheduler.is_empty() {
            tracing::info!("Scheduler stopped");
        } else {
            tracing::info!("Scheduler stopped with {} tasks registered", scheduler.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnMut(i64) -> TaskControl + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            TaskControl::Continue
        })
    }

    #[test]
    fn test_task_runs_once_per_period() {
        let mut scheduler = Scheduler::new();
        let (count, handler) = counter();
        scheduler.every("tick", Duration::from_secs(10), 0, handler);

        assert_eq!(scheduler.run_due(9_999), 0);
        assert_eq!(scheduler.run_due(10_000), 1);
        assert_eq!(scheduler.run_due(10_500), 0);
        assert_eq!(scheduler.run_due(20_000), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_missed_periods_are_not_replayed() {
        let mut scheduler = Scheduler::new();
        let (count, handler) = counter();
        scheduler.every("tick", Duration::from_secs(1), 0, handler);

        scheduler.run_due(5_500);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.run_due(5_999), 0);
        assert_eq!(scheduler.run_due(6_000), 1);
    }

    #[test]
    fn test_independent_tasks_interleave() {
        let mut scheduler = Scheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        scheduler.every("slow", Duration::from_millis(300), 0, move |_| {
            o.lock().unwrap().push("slow");
            TaskControl::Continue
        });
        let o = order.clone();
        scheduler.every("fast", Duration::from_millis(100), 0, move |_| {
            o.lock().unwrap().push("fast");
            TaskControl::Continue
        });

        for now in (100..=300).step_by(100) {
            scheduler.run_due(now);
        }
        assert_eq!(*order.lock().unwrap(), vec!["fast", "fast", "slow", "fast"]);
    }

    #[test]
    fn test_stop_and_cancel_remove_tasks() {
        let mut scheduler = Scheduler::new();
        scheduler.every("once", Duration::from_secs(1), 0, |_| TaskControl::Stop);
        let (count, handler) = counter();
        let other = scheduler.every("other", Duration::from_secs(1), 0, handler);

        assert_eq!(scheduler.run_due(1_000), 2);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.run_due(2_000), 1);
        assert_eq!(count.load(Ordering::SeqCst), 2);

        assert!(scheduler.cancel(other));
        assert!(!scheduler.cancel(other));
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        use crate::application::clock::ManualClock;

        let shared = SharedScheduler::new();
        let clock = Arc::new(ManualClock::new(0));
        let (count, handler) = counter();
        shared.lock().every("tick", Duration::from_millis(10), 0, handler);
        clock.set(10);

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(shared.clone().run(clock, Duration::from_millis(5), rx));
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
