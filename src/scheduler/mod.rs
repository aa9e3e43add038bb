use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::trace;

use crate::extensions::mutex::MutexExt;
use crate::midi::registry::model::PaletteColor;
use crate::pads::LedCommand;
use crate::queue::OutboundQueue;

/// Note to the token of the loop currently allowed to drive it.
type ActiveBlinks = Arc<Mutex<HashMap<u8, u64>>>;

/// Software blinking: one task per note, alternating on and off through
/// the outbound queue every half period.
///
/// Loops cancel themselves: before each transition they check that their
/// token is still the active one for the note.
#[derive(Clone)]
pub struct BlinkScheduler {
    active: ActiveBlinks,
    next_token: Arc<AtomicU64>,
    queue: OutboundQueue,
    half_period: Duration,
}

impl BlinkScheduler {
    pub fn new(queue: OutboundQueue, half_period: Duration) -> BlinkScheduler {
        BlinkScheduler {
            active: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(0)),
            queue,
            half_period,
        }
    }

    /// Returns false when the note was already blinking.
    pub fn start(&self, note: u8, color: PaletteColor) -> bool {
        let token = {
            let mut active = self.active.locked();
            if active.contains_key(&note) {
                return false;
            }
            let token = self.next_token.fetch_add(1, Ordering::Relaxed);
            active.insert(note, token);
            token
        };

        let scheduler = self.clone();
        let on = LedCommand::on(note, color);
        let off = LedCommand::off(note);
        tokio::spawn(async move {
            let mut lit = false;
            loop {
                lit = !lit;
                if !scheduler.transition(note, token, if lit { on } else { off }) {
                    break;
                }
                sleep(scheduler.half_period).await;
            }
            trace!(note, "Blink loop finished.");
        });
        true
    }

    // Membership check and enqueue happen under one lock, so a stop() can
    // never be followed by a late transition from the old loop.
    fn transition(&self, note: u8, token: u64, command: LedCommand) -> bool {
        let active = self.active.locked();
        if active.get(&note) != Some(&token) {
            return false;
        }
        self.queue.enqueue(command);
        true
    }

    /// Returns false when the note was not blinking.
    pub fn stop(&self, note: u8) -> bool {
        self.active.locked().remove(&note).is_some()
    }

    pub fn stop_all(&self) -> Vec<u8> {
        let mut stopped: Vec<u8> = self.active.locked().drain().map(|(note, _)| note).collect();
        stopped.sort_unstable();
        stopped
    }

    pub fn is_blinking(&self, note: u8) -> bool {
        self.active.locked().contains_key(&note)
    }

    pub fn blinking(&self) -> Vec<u8> {
        let mut notes: Vec<u8> = self.active.locked().keys().copied().collect();
        notes.sort_unstable();
        notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::controller::stubs::Recording;
    use crate::queue;

    const HALF: Duration = Duration::from_millis(500);

    fn scheduler() -> (Arc<Recording>, OutboundQueue, BlinkScheduler) {
        let recording = Arc::new(Recording::new());
        let queue = OutboundQueue::new(
            recording.clone(),
            queue::Config {
                burst_count: 1,
                ..queue::Config::default()
            },
        );
        let blinks = BlinkScheduler::new(queue.clone(), HALF);
        (recording, queue, blinks)
    }

    #[tokio::test(start_paused = true)]
    async fn alternates_until_stopped() {
        let (recording, queue, blinks) = scheduler();

        assert!(blinks.start(9, PaletteColor::Orange));
        sleep(HALF * 3 + Duration::from_millis(100)).await;
        assert!(blinks.stop(9));
        sleep(HALF * 4).await;
        queue.wait_idle().await;

        assert_eq!(
            recording.sent(),
            vec![[0x95, 9, 9], [0x95, 9, 0], [0x95, 9, 9], [0x95, 9, 0]]
        );
        assert!(!blinks.is_blinking(9));
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_is_ignored() {
        let (recording, queue, blinks) = scheduler();

        assert!(blinks.start(9, PaletteColor::Orange));
        assert!(!blinks.start(9, PaletteColor::Blue));
        sleep(HALF + Duration::from_millis(100)).await;
        blinks.stop_all();
        queue.wait_idle().await;

        assert_eq!(recording.sent(), vec![[0x95, 9, 9], [0x95, 9, 0]]);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_does_not_double_the_loop() {
        let (recording, queue, blinks) = scheduler();

        blinks.start(9, PaletteColor::Orange);
        sleep(HALF / 2).await;
        blinks.stop(9);
        blinks.start(9, PaletteColor::Orange);
        sleep(HALF * 2 + Duration::from_millis(100)).await;
        blinks.stop(9);
        queue.wait_idle().await;

        // Old loop: on at 0. New loop: on at 250, off at 750, on at 1250.
        assert_eq!(
            recording.sent(),
            vec![[0x95, 9, 9], [0x95, 9, 9], [0x95, 9, 0], [0x95, 9, 9]]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn auxiliary_buttons_blink_in_forced_color() {
        let (recording, queue, blinks) = scheduler();

        blinks.start(112, PaletteColor::Pink);
        assert_eq!(blinks.blinking(), vec![112]);
        sleep(Duration::from_millis(100)).await;
        blinks.stop(112);
        queue.wait_idle().await;

        assert_eq!(recording.sent(), vec![[0x90, 112, 21]]);
    }
}
