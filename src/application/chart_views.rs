// Chart views - Open chart presenters addressable by id while they stream
use crate::application::chart_presenter::{ChartPresenter, ChartRenderer, PresenterError};
use crate::application::scheduler::{SharedScheduler, TaskControl};
use crate::domain::channel::Channel;
use crate::domain::telemetry::{ChartFrame, ExportSnapshot, TimeWindow};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub type ViewId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewInfo {
    pub id: ViewId,
    pub channel: Channel,
    pub window_minutes: TimeWindow,
}

type SharedPresenter<R> = Arc<Mutex<ChartPresenter<R>>>;

struct ViewRegistry<R: ChartRenderer> {
    views: HashMap<ViewId, SharedPresenter<R>>,
    next_id: ViewId,
}

/// Registry of open chart views. Each view is refreshed by its own
/// scheduler task and forgotten once its renderer goes away.
pub struct ChartViews<R: ChartRenderer> {
    inner: Arc<Mutex<ViewRegistry<R>>>,
}

impl<R: ChartRenderer> Clone for ChartViews<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: ChartRenderer> Default for ChartViews<R> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ViewRegistry {
                views: HashMap::new(),
                next_id: 1,
            })),
        }
    }
}

fn lock_presenter<R: ChartRenderer>(presenter: &SharedPresenter<R>) -> MutexGuard<'_, ChartPresenter<R>> {
    presenter.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R: ChartRenderer + 'static> ChartViews<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registry().views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry().views.is_empty()
    }

    /// Take ownership of an opened presenter and refresh it every `period`
    pub fn register(
        &self,
        presenter: ChartPresenter<R>,
        scheduler: &SharedScheduler,
        period: Duration,
        start_ms: i64,
    ) -> ViewId {
        let presenter = Arc::new(Mutex::new(presenter));
        let id = {
            let mut registry = self.registry();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.views.insert(id, presenter.clone());
            id
        };

        let views = self.clone();
        scheduler
            .lock()
            .every(format!("chart-refresh-{}", id), period, start_ms, move |_| {
                let refreshed = lock_presenter(&presenter).refresh();
                match refreshed {
                    Ok(_) => TaskControl::Continue,
                    Err(e) => {
                        tracing::debug!("Chart view {} stopped: {}", id, e);
                        views.forget(id);
                        TaskControl::Stop
                    }
                }
            });
        id
    }

    /// Re-query and re-render view `id` over a new window
    pub fn select_window(&self, id: ViewId, window: TimeWindow) -> Result<ChartFrame, PresenterError> {
        let presenter = self.get(id).ok_or(PresenterError::UnknownView(id))?;
        let selected = lock_presenter(&presenter).select_window(window);
        if selected.is_err() {
            self.forget(id);
        }
        selected
    }

    pub fn export(&self, id: ViewId) -> Result<ExportSnapshot, PresenterError> {
        let presenter = self.get(id).ok_or(PresenterError::UnknownView(id))?;
        let snapshot = lock_presenter(&presenter).export();
        snapshot.ok_or(PresenterError::NotOpen)
    }

    /// Close view `id`, ending its stream. Its refresh task stops on the
    /// next tick.
    pub fn close(&self, id: ViewId) -> bool {
        let Some(presenter) = self.forget(id) else {
            return false;
        };
        let mut presenter = lock_presenter(&presenter);
        let was_open = presenter.is_open();
        presenter.close();
        was_open
    }

    pub fn list(&self) -> Vec<ViewInfo> {
        let mut views: Vec<(ViewId, SharedPresenter<R>)> = self
            .registry()
            .views
            .iter()
            .map(|(id, presenter)| (*id, presenter.clone()))
            .collect();
        views.sort_by_key(|(id, _)| *id);

        views
            .into_iter()
            .filter_map(|(id, presenter)| {
                let (channel, window) = lock_presenter(&presenter).selection()?;
                Some(ViewInfo {
                    id,
                    channel,
                    window_minutes: window,
                })
            })
            .collect()
    }

    fn get(&self, id: ViewId) -> Option<SharedPresenter<R>> {
        self.registry().views.get(&id).cloned()
    }

    fn forget(&self, id: ViewId) -> Option<SharedPresenter<R>> {
        self.registry().views.remove(&id)
    }

    fn registry(&self) -> MutexGuard<'_, ViewRegistry<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::chart_presenter::RenderError;
    use crate::application::chart_presenter::tests::{RecordingRenderer, store_with_history};
    use crate::application::clock::{Clock, ManualClock};
    use std::sync::atomic::{AtomicBool, Ordering};

    const NOW: i64 = 119 * 60_000;

    fn open_view(
        views: &ChartViews<RecordingRenderer>,
        scheduler: &SharedScheduler,
        clock: Arc<ManualClock>,
        renderer: RecordingRenderer,
    ) -> ViewId {
        let mut presenter = ChartPresenter::new(store_with_history(clock.clone()), renderer, 0);
        presenter.open(Channel::Humidity, TimeWindow::TenMinutes).unwrap();
        views.register(presenter, scheduler, Duration::from_secs(10), clock.now_ms())
    }

    #[test]
    fn test_registered_view_refreshes_on_schedule() {
        let clock = Arc::new(ManualClock::new(NOW));
        let renderer = RecordingRenderer::default();
        let views = ChartViews::new();
        let scheduler = SharedScheduler::new();
        let id = open_view(&views, &scheduler, clock.clone(), renderer.clone());

        clock.advance(10_000);
        scheduler.lock().run_due(clock.now_ms());
        assert_eq!(renderer.frames.lock().unwrap().len(), 2);
        assert_eq!(
            views.list(),
            vec![ViewInfo {
                id,
                channel: Channel::Humidity,
                window_minutes: TimeWindow::TenMinutes,
            }]
        );
    }

    #[test]
    fn test_window_change_renders_new_frame() {
        let clock = Arc::new(ManualClock::new(NOW));
        let renderer = RecordingRenderer::default();
        let views = ChartViews::new();
        let scheduler = SharedScheduler::new();
        let id = open_view(&views, &scheduler, clock, renderer.clone());

        let frame = views.select_window(id, TimeWindow::OneHour).unwrap();
        assert_eq!(frame.summary.count, 61);
        assert_eq!(renderer.frames.lock().unwrap().last().map(|f| f.window_minutes), Some(TimeWindow::OneHour));

        let snapshot = views.export(id).unwrap();
        assert_eq!(snapshot.window_minutes, 60);
        assert_eq!(views.select_window(id + 1, TimeWindow::OneDay), Err(PresenterError::UnknownView(id + 1)));
    }

    #[test]
    fn test_close_releases_and_stops_refresh() {
        let clock = Arc::new(ManualClock::new(NOW));
        let renderer = RecordingRenderer::default();
        let views = ChartViews::new();
        let scheduler = SharedScheduler::new();
        let id = open_view(&views, &scheduler, clock.clone(), renderer.clone());

        assert!(views.close(id));
        assert!(!views.close(id));
        assert!(views.is_empty());
        assert_eq!(renderer.released.load(Ordering::SeqCst), 1);

        clock.advance(10_000);
        scheduler.lock().run_due(clock.now_ms());
        assert!(scheduler.lock().is_empty());
        assert_eq!(renderer.frames.lock().unwrap().len(), 1);
    }

    struct FlakyRenderer(Arc<AtomicBool>);

    impl ChartRenderer for FlakyRenderer {
        fn render(&mut self, _frame: &ChartFrame) -> Result<(), RenderError> {
            if self.0.load(Ordering::SeqCst) {
                return Err(RenderError::Unavailable("viewer gone".into()));
            }
            Ok(())
        }
    }

    #[test]
    fn test_failed_renderer_forgets_view() {
        let clock = Arc::new(ManualClock::new(NOW));
        let gone = Arc::new(AtomicBool::new(false));
        let views = ChartViews::new();
        let scheduler = SharedScheduler::new();

        let mut presenter = ChartPresenter::new(store_with_history(clock.clone()), FlakyRenderer(gone.clone()), 0);
        presenter.open(Channel::Light, TimeWindow::OneMinute).unwrap();
        let id = views.register(presenter, &scheduler, Duration::from_secs(10), clock.now_ms());
        assert!(views.export(id).is_ok());

        gone.store(true, Ordering::SeqCst);
        clock.advance(10_000);
        scheduler.lock().run_due(clock.now_ms());

        assert!(views.is_empty());
        assert!(scheduler.lock().is_empty());
        assert!(matches!(views.export(id), Err(PresenterError::UnknownView(_))));
    }
}
