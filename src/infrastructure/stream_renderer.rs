// Chart renderer that forwards frames to a streaming HTTP client
use crate::application::chart_presenter::{ChartRenderer, RenderError};
use crate::domain::telemetry::ChartFrame;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

pub struct StreamRenderer {
    tx: Option<mpsc::Sender<ChartFrame>>,
}

impl StreamRenderer {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChartFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }
}

impl ChartRenderer for StreamRenderer {
    fn render(&mut self, frame: &ChartFrame) -> Result<(), RenderError> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| RenderError::Unavailable("stream already released".into()))?;

        match tx.try_send(frame.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::debug!("Chart viewer is behind, skipping frame");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(RenderError::Unavailable("chart viewer disconnected".into())),
        }
    }

    /// Dropping the sender ends the HTTP stream
    fn release(&mut self) {
        self.tx = None;
    }
}
