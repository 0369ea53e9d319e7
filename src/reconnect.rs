//! Cancellable reconnect timer.
//!
//! At most one automatic reconnect is ever pending. Scheduling again replaces
//! the pending timer, and a manual connect or shutdown cancels it, so a close
//! event can never trigger two connection attempts.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::session::{EventSender, SessionEvent};

/// Delay between a close and the automatic reconnect.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, Default)]
pub struct ReconnectTimer {
    pending: Option<JoinHandle<()>>,
}

impl ReconnectTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post [`SessionEvent::ReconnectDue`] to `events` after `delay`,
    /// replacing any timer that is still pending.
    pub fn schedule(&mut self, delay: Duration, events: EventSender) {
        if self.cancel() {
            tracing::debug!("replaced pending reconnect timer");
        }
        tracing::info!(delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::ReconnectDue);
        }));
    }

    /// Cancel the pending timer. Returns whether one was still pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                true
            }
            _ => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Forget a timer that has already fired.
    pub fn fired(&mut self) {
        self.pending = None;
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
