use std::time::Duration;

use ibex_core::View;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::events::InternalEvent;

/// Single-shot round-change timer. Re-arming cancels the previous shot.
pub(crate) struct RoundChangeTimer {
    timeout: Duration,
    handle: Option<JoinHandle<()>>,
}

impl RoundChangeTimer {
    pub fn new(timeout: Duration) -> Self {
        RoundChangeTimer {
            timeout,
            handle: None,
        }
    }

    /// Fire `Timeout(view)` on `events` after the configured timeout
    pub fn reset(&mut self, view: View, events: &UnboundedSender<InternalEvent>) {
        self.stop();

        let timeout = self.timeout;
        let events = events.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            trace!(%view, "Round change timer fired");
            let _ = events.send(InternalEvent::Timeout(view));
        }));
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for RoundChangeTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
