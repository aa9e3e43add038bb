use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

/// A command we sent and whose acknowledgement we are still waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingEcho {
    pub note: u8,
    pub expected_velocity: u8,
    pub sent_at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    /// The controller acknowledging our own LED command.
    Echo,
    /// Someone actually pressed the button.
    Genuine,
}

/// Tells the controller's acknowledgements apart from real presses.
///
/// Every web-initiated LED-on registers a [`PendingEcho`]; the first note-on
/// for that note within `window` consumes it and is reported as an echo.
/// Unmatched entries expire on their own after `window`.
#[derive(Clone)]
pub struct EchoGuard {
    pending: Arc<DashMap<u8, PendingEcho>>,
    window: Duration,
}

impl EchoGuard {
    pub fn new(window: Duration) -> EchoGuard {
        EchoGuard {
            pending: Arc::new(DashMap::new()),
            window,
        }
    }

    pub fn expect(&self, note: u8, expected_velocity: u8) {
        let sent_at = Instant::now();
        self.pending.insert(
            note,
            PendingEcho {
                note,
                expected_velocity,
                sent_at,
            },
        );

        // sent_at doubles as the token: a newer expectation for the same note
        // is left alone by this timer.
        let pending = self.pending.clone();
        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            if pending
                .remove_if(&note, |_, echo| echo.sent_at == sent_at)
                .is_some()
            {
                trace!(note, "Pending echo expired unmatched.");
            }
        });
    }

    /// Consumes the pending echo for `note`, if any.
    pub fn classify(&self, note: u8) -> Classification {
        match self.pending.remove(&note) {
            Some((_, echo)) if echo.sent_at.elapsed() < self.window => {
                trace!(
                    note,
                    expected_velocity = echo.expected_velocity,
                    "Matched echo."
                );
                Classification::Echo
            }
            _ => Classification::Genuine,
        }
    }

    pub fn forget_all(&self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(500);

    #[tokio::test(start_paused = true)]
    async fn note_on_inside_window_is_an_echo_once() {
        let guard = EchoGuard::new(WINDOW);
        guard.expect(5, 21);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(guard.classify(5), Classification::Echo);
        assert_eq!(guard.classify(5), Classification::Genuine);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_note_is_genuine() {
        let guard = EchoGuard::new(WINDOW);
        guard.expect(5, 21);
        assert_eq!(guard.classify(6), Classification::Genuine);
        assert_eq!(guard.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_window() {
        let guard = EchoGuard::new(WINDOW);
        guard.expect(5, 21);

        sleep(Duration::from_millis(600)).await;
        assert!(guard.is_empty());
        assert_eq!(guard.classify(5), Classification::Genuine);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_keeps_newer_expectation() {
        let guard = EchoGuard::new(WINDOW);
        guard.expect(5, 21);
        sleep(Duration::from_millis(400)).await;
        guard.expect(5, 3);

        // First timer fires here and must not touch the second entry.
        sleep(Duration::from_millis(200)).await;
        assert_eq!(guard.len(), 1);
        assert_eq!(guard.classify(5), Classification::Echo);
    }
}
