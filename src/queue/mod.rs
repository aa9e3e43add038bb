use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::extensions::mutex::MutexExt;
use crate::midi::model::{MidiMessage, MidiSendFailed, SharedMidiSender};
use crate::pads::LedCommand;

#[derive(Clone, Debug)]
pub struct Config {
    pub attempts: u8,
    pub retry_backoff: Duration,
    /// Pause after every delivered command. The controller drops input
    /// when flooded.
    pub inter_message_delay: Duration,
    /// Identical copies sent per delivery, for lossy links.
    pub burst_count: u8,
    pub burst_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            attempts: 3,
            retry_backoff: Duration::from_millis(20),
            inter_message_delay: Duration::from_millis(12),
            burst_count: 5,
            burst_interval: Duration::from_millis(2),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct QueuedCommand {
    pub command: LedCommand,
    pub enqueued_at: Instant,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub sent: u64,
    pub dropped: u64,
    pub coalesced: u64,
}

#[derive(Default)]
struct QueueState {
    commands: VecDeque<QueuedCommand>,
    draining: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    stats: Mutex<QueueStats>,
    idle: Notify,
    sender: SharedMidiSender,
    config: Config,
}

/// Single road to the device. Producers enqueue, one drain task sends.
///
/// At most one command per note waits in the queue: a newer command for the
/// same note takes the place of the older one instead of being appended.
#[derive(Clone)]
pub struct OutboundQueue(Arc<Inner>);

impl OutboundQueue {
    pub fn new(sender: SharedMidiSender, config: Config) -> OutboundQueue {
        OutboundQueue(Arc::new(Inner {
            state: Mutex::new(QueueState::default()),
            stats: Mutex::new(QueueStats::default()),
            idle: Notify::new(),
            sender,
            config,
        }))
    }

    /// Fire and forget. Must be called from within the runtime.
    pub fn enqueue(&self, command: LedCommand) {
        let start_drain = {
            let mut state = self.0.state.locked();
            let now = Instant::now();
            match state
                .commands
                .iter_mut()
                .find(|queued| queued.command.note == command.note)
            {
                Some(queued) => {
                    if queued.command != command {
                        trace!(note = command.note, "Replacing queued LED command.");
                    }
                    queued.command = command;
                    queued.enqueued_at = now;
                    self.0.stats.locked().coalesced += 1;
                }
                None => state.commands.push_back(QueuedCommand {
                    command,
                    enqueued_at: now,
                }),
            }
            !std::mem::replace(&mut state.draining, true)
        };

        if start_drain {
            let inner = self.0.clone();
            tokio::spawn(async move { inner.drain().await });
        }
    }

    pub fn len(&self) -> usize {
        self.0.state.locked().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        *self.0.stats.locked()
    }

    pub fn has_outputs(&self) -> bool {
        self.0.sender.has_outputs()
    }

    /// Resolves once no drain cycle is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.0.idle.notified();
            if !self.0.state.locked().draining {
                return;
            }
            notified.await;
        }
    }

    /// Drops everything not yet sent and waits for the in-flight command,
    /// so nothing stale lands after whatever the caller sends next.
    pub async fn clear(&self) -> usize {
        let dropped = {
            let mut state = self.0.state.locked();
            let dropped = state.commands.len();
            state.commands.clear();
            dropped
        };
        if dropped > 0 {
            debug!(dropped, "Cleared outbound queue.");
        }
        self.wait_idle().await;
        dropped
    }
}

impl Inner {
    async fn drain(&self) {
        loop {
            let next = {
                let mut state = self.state.locked();
                match state.commands.pop_front() {
                    Some(queued) => queued,
                    None => {
                        state.draining = false;
                        drop(state);
                        self.idle.notify_waiters();
                        return;
                    }
                }
            };

            if self.deliver(next).await {
                sleep(self.config.inter_message_delay).await;
            }
        }
    }

    async fn deliver(&self, queued: QueuedCommand) -> bool {
        let command = queued.command;
        let Some(msg) = command.message() else {
            error!(?command, "LED command does not fit into a MIDI message, dropping.");
            self.stats.locked().dropped += 1;
            return false;
        };

        let attempts = self.config.attempts.max(1);
        for attempt in 1..=attempts {
            match self.send_burst(&msg).await {
                Ok(()) => {
                    trace!(
                        note = command.note,
                        velocity = command.velocity,
                        waited = ?queued.enqueued_at.elapsed(),
                        "LED command delivered."
                    );
                    self.stats.locked().sent += 1;
                    return true;
                }
                Err(MidiSendFailed::NoOutputs) => {
                    info!(note = command.note, "No MIDI output devices available.");
                    self.stats.locked().dropped += 1;
                    return false;
                }
                Err(e) if attempt < attempts => {
                    warn!(note = command.note, attempt, "{e} Retrying.");
                    sleep(self.config.retry_backoff).await;
                }
                Err(e) => {
                    error!(
                        note = command.note,
                        "Giving up on LED command after {attempts} attempts. {e}"
                    );
                    self.stats.locked().dropped += 1;
                }
            }
        }
        false
    }

    async fn send_burst(&self, msg: &MidiMessage) -> Result<(), MidiSendFailed> {
        for repeat in 0..self.config.burst_count.max(1) {
            if repeat > 0 {
                sleep(self.config.burst_interval).await;
            }
            self.sender.send(msg)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::controller::stubs::Recording;
    use crate::midi::registry::model::PaletteColor;

    fn single_shot() -> Config {
        Config {
            burst_count: 1,
            ..Config::default()
        }
    }

    fn queue_with(recording: &Arc<Recording>, config: Config) -> OutboundQueue {
        OutboundQueue::new(recording.clone(), config)
    }

    #[tokio::test(start_paused = true)]
    async fn identical_commands_are_sent_once() {
        let recording = Arc::new(Recording::new());
        let queue = queue_with(&recording, single_shot());

        queue.enqueue(LedCommand::on(5, PaletteColor::Green));
        queue.enqueue(LedCommand::on(5, PaletteColor::Green));
        assert_eq!(queue.len(), 1);
        queue.wait_idle().await;

        assert_eq!(recording.sent(), vec![[0x95, 5, 21]]);
        assert_eq!(queue.stats().coalesced, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_command_for_same_note_replaces_queued_one() {
        let recording = Arc::new(Recording::new());
        let queue = queue_with(&recording, single_shot());

        for _ in 0..10 {
            queue.enqueue(LedCommand::on(5, PaletteColor::Green));
            queue.enqueue(LedCommand::off(5));
        }
        queue.enqueue(LedCommand::on(6, PaletteColor::Red));
        assert_eq!(queue.len(), 2);
        queue.wait_idle().await;

        assert_eq!(recording.sent(), vec![[0x95, 5, 0], [0x95, 6, 5]]);
    }

    #[tokio::test(start_paused = true)]
    async fn reliability_burst_repeats_each_message() {
        let recording = Arc::new(Recording::new());
        let queue = queue_with(&recording, Config::default());

        queue.enqueue(LedCommand::on(3, PaletteColor::Blue));
        queue.wait_idle().await;

        assert_eq!(recording.sent(), vec![[0x95, 3, 45]; 5]);
        assert_eq!(queue.stats().sent, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let recording = Arc::new(Recording::failing(2));
        let queue = queue_with(&recording, single_shot());

        queue.enqueue(LedCommand::on(3, PaletteColor::Blue));
        queue.wait_idle().await;

        assert_eq!(recording.attempts(), 3);
        assert_eq!(recording.sent(), vec![[0x95, 3, 45]]);
        assert_eq!(queue.stats().dropped, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn third_failure_drops_only_that_command() {
        let recording = Arc::new(Recording::failing(3));
        let queue = queue_with(&recording, single_shot());

        queue.enqueue(LedCommand::on(3, PaletteColor::Blue));
        queue.enqueue(LedCommand::on(4, PaletteColor::Blue));
        queue.wait_idle().await;

        assert_eq!(recording.sent(), vec![[0x95, 4, 45]]);
        assert_eq!(
            queue.stats(),
            QueueStats {
                sent: 1,
                dropped: 1,
                coalesced: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_outputs_are_not_retried() {
        let recording = Arc::new(Recording::disconnected());
        let queue = queue_with(&recording, single_shot());

        queue.enqueue(LedCommand::on(3, PaletteColor::Blue));
        queue.wait_idle().await;

        assert_eq!(recording.attempts(), 1);
        assert!(!queue.has_outputs());
        assert_eq!(queue.stats().dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spaces_out_deliveries() {
        let recording = Arc::new(Recording::new());
        let config = single_shot();
        let delay = config.inter_message_delay;
        let queue = queue_with(&recording, config);

        let started = Instant::now();
        for note in 0..4 {
            queue.enqueue(LedCommand::on(note, PaletteColor::Red));
        }
        queue.wait_idle().await;

        assert_eq!(recording.sent().len(), 4);
        assert!(started.elapsed() >= delay * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_drops_pending_commands_and_waits() {
        let recording = Arc::new(Recording::new());
        let queue = queue_with(&recording, single_shot());

        for note in 0..10 {
            queue.enqueue(LedCommand::on(note, PaletteColor::Red));
        }
        assert_eq!(queue.clear().await, 10);
        assert!(queue.is_empty());
        assert!(recording.sent().is_empty());

        queue.enqueue(LedCommand::off(1));
        queue.wait_idle().await;
        assert_eq!(recording.sent(), vec![[0x95, 1, 0]]);
    }
}
