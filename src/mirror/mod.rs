pub mod surface;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, trace};

use crate::echo::{Classification, EchoGuard};
use crate::extensions::mutex::MutexExt;
use crate::midi::model::{note_name, InboundMessage, SharedMidiSender};
use crate::midi::registry::model::{Behavior, ButtonClass, PaletteColor};
use crate::midi::registry::palette;
use crate::pads::{LedCommand, OffStyle, PadAssignment, PadStore, PressOutcome};
use crate::queue::{self, OutboundQueue, QueueStats};
use crate::scheduler::BlinkScheduler;
use crate::snapshot::{self, GridPadVisual, Snapshot, SnapshotError, SnapshotStore};
use surface::{Fader, FlashLevel, Selection, Surface};

pub type SharedSnapshotStore = Arc<dyn SnapshotStore + Send + Sync + 'static>;

#[derive(Clone, Debug)]
pub struct Config {
    pub queue: queue::Config,
    /// How long after an LED-on a note-on from the same pad counts as the
    /// controller's acknowledgement.
    pub echo_window: Duration,
    pub blink_half_period: Duration,
    pub off_style: OffStyle,
    /// Pause between wiping the device and replaying a restored snapshot.
    pub settle_delay: Duration,
    /// Extra delay per replayed command.
    pub stagger: Duration,
    /// Notes that load a snapshot file when pressed.
    pub presets: BTreeMap<u8, PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            queue: queue::Config::default(),
            echo_window: Duration::from_millis(500),
            blink_half_period: Duration::from_millis(500),
            off_style: OffStyle::default(),
            settle_delay: Duration::from_millis(100),
            stagger: Duration::from_millis(15),
            presets: BTreeMap::new(),
        }
    }
}

/// What became of one inbound message.
#[derive(Debug)]
pub enum InboundOutcome {
    Echo {
        note: u8,
        flash: FlashLevel,
    },
    Pressed {
        note: u8,
        flash: FlashLevel,
        outcome: PressOutcome,
    },
    /// The snapshot at `path` should be loaded.
    Preset {
        note: u8,
        path: PathBuf,
    },
    FaderMoved {
        label: String,
        fader: Fader,
    },
    Ignored,
}

/// State synchronization between the operator, the pad store and the
/// physical controller.
pub struct PadMirror {
    config: Config,
    pads: Mutex<PadStore>,
    surface: Mutex<Surface>,
    queue: OutboundQueue,
    echoes: EchoGuard,
    blinks: BlinkScheduler,
    snapshots: SharedSnapshotStore,
}

impl PadMirror {
    pub fn new(
        sender: SharedMidiSender,
        snapshots: SharedSnapshotStore,
        config: Config,
    ) -> PadMirror {
        let queue = OutboundQueue::new(sender, config.queue.clone());
        PadMirror {
            echoes: EchoGuard::new(config.echo_window),
            blinks: BlinkScheduler::new(queue.clone(), config.blink_half_period),
            pads: Mutex::new(PadStore::new()),
            surface: Mutex::new(Surface::new()),
            queue,
            snapshots,
            config,
        }
    }

    // Web-initiated commands: the controller acknowledges LED-ons with a
    // note-on of its own, which must not count as a press.
    fn send_expecting_echo(&self, command: LedCommand) {
        self.queue.enqueue(command);
        if command.is_on {
            self.echoes.expect(command.note, command.velocity);
        }
    }

    pub fn select_color(&self, color: PaletteColor) {
        self.surface.locked().selection.color = color;
        debug!(color = color.name(), "Selected color.");
    }

    pub fn select_behavior(&self, behavior: Behavior) {
        self.surface.locked().selection.behavior = behavior;
        debug!(%behavior, "Selected button behavior.");
    }

    pub fn selection(&self) -> Selection {
        self.surface.locked().selection
    }

    /// Returns false for notes the controller does not have.
    pub fn assign(&self, note: u8, color: PaletteColor, behavior: Behavior) -> bool {
        if !palette::is_known_note(note) {
            debug!(note, "Not a pad, ignoring assignment.");
            return false;
        }
        self.blinks.stop(note);
        let command = self.pads.locked().assign(note, color, behavior);
        self.send_expecting_echo(command);
        info!(
            note,
            color = color.name(),
            %behavior,
            "Assigned pad {}.",
            note_name(note)
        );
        true
    }

    pub fn unassign(&self, note: u8) {
        self.blinks.stop(note);
        let command = self.pads.locked().unassign(note);
        self.queue.enqueue(command);
        info!(note, "Removed assignment.");
    }

    /// A click on a grid pad with the current selection.
    pub fn click_pad(&self, note: u8) -> bool {
        let selection = self.selection();
        self.assign(note, selection.color, selection.behavior)
    }

    /// A click on a round track or scene button.
    pub fn click_button(&self, note: u8) -> bool {
        let command = self.surface.locked().click(note);
        match command {
            Some(command) => {
                self.send_expecting_echo(command);
                true
            }
            None => false,
        }
    }

    /// Applies a genuine press from the device.
    pub fn press(&self, note: u8) -> PressOutcome {
        let blinking = self.blinks.is_blinking(note);
        let outcome = self
            .pads
            .locked()
            .press(note, self.config.off_style, blinking);

        match outcome {
            PressOutcome::Unassigned => {
                debug!(note, "Pressed but no color assigned, ignoring.");
            }
            PressOutcome::Held => {
                debug!(note, "Solid pad pressed, staying on.");
            }
            PressOutcome::Switched(command) => {
                self.queue.enqueue(command);
                debug!(note, is_on = command.is_on, "Toggled pad.");
            }
            PressOutcome::StartBlink(color) => {
                self.blinks.start(note, color);
                debug!(note, "Started blinking.");
            }
            PressOutcome::StopBlink => {
                self.blinks.stop(note);
                let steady = self.steady_command(note);
                if let Some(command) = steady {
                    self.queue.enqueue(command);
                }
                debug!(note, "Stopped blinking.");
            }
        }
        outcome
    }

    fn steady_command(&self, note: u8) -> Option<LedCommand> {
        self.pads
            .locked()
            .get(note)
            .map(|assignment| assignment.led_command(note, self.config.off_style))
    }

    /// Classifies one inbound message and applies it. Preset notes are only
    /// reported; [`PadMirror::listen`] loads them.
    pub fn handle_inbound(&self, msg: InboundMessage) -> InboundOutcome {
        match msg {
            InboundMessage::NoteOn {
                note,
                velocity,
                channel,
            } => {
                let flash = FlashLevel::of(velocity);
                if self.echoes.classify(note) == Classification::Echo {
                    trace!(note, velocity, channel, "Echo of our own command.");
                    return InboundOutcome::Echo { note, flash };
                }

                let preset = self.config.presets.get(&note).cloned();
                match preset {
                    Some(path) => {
                        info!(note, path = %path.display(), "Preset button pressed.");
                        InboundOutcome::Preset { note, path }
                    }
                    None => InboundOutcome::Pressed {
                        note,
                        flash,
                        outcome: self.press(note),
                    },
                }
            }
            InboundMessage::NoteOff { note, .. } => {
                trace!(note, "Note off, nothing to do.");
                InboundOutcome::Ignored
            }
            InboundMessage::ControlChange {
                controller, value, ..
            } => {
                let moved = self.surface.locked().move_fader(controller, value);
                match moved {
                    Some((label, fader)) => {
                        trace!(%label, value, "Fader moved.");
                        InboundOutcome::FaderMoved { label, fader }
                    }
                    None => InboundOutcome::Ignored,
                }
            }
        }
    }

    /// Dispatches inbound messages until the channel closes. Preset loads
    /// run on their own task, so echoes of their replay keep being
    /// classified inside the echo window.
    pub fn listen(
        self: Arc<Self>,
        inbound: async_channel::Receiver<InboundMessage>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Ok(msg) = inbound.recv().await {
                match self.handle_inbound(msg) {
                    InboundOutcome::Preset { path, .. } => {
                        let mirror = self.clone();
                        // Failures are logged by load_snapshot.
                        tokio::spawn(async move { mirror.load_snapshot(&path).await });
                    }
                    outcome => trace!(?outcome, "Inbound handled."),
                }
            }
            debug!("Inbound channel closed.");
        })
    }

    // Every known LED dark, blinking stopped, queue emptied first so
    // nothing stale arrives after the off commands.
    async fn darken_device(&self) {
        self.queue.clear().await;
        self.blinks.stop_all();
        self.echoes.forget_all();
        palette::grid_notes()
            .chain(palette::auxiliary_notes())
            .for_each(|note| self.queue.enqueue(LedCommand::off(note)));
    }

    /// Turns every LED off and marks assignments off without removing them.
    pub async fn clear_grid(&self) {
        self.darken_device().await;
        self.pads.locked().switch_all_off();
        self.surface.locked().reset_visuals();
        info!("Grid cleared.");
    }

    /// Turns every LED off and forgets all assignments.
    pub async fn reset_all(&self) {
        self.darken_device().await;
        self.pads.locked().clear();
        self.surface.locked().reset_visuals();
        info!("All pads reset, LEDs turned off and button states cleared.");
    }

    pub fn snapshot(&self, name: &str) -> Snapshot {
        let pads = self.pads.locked().clone();
        let surface = self.surface.locked().clone();

        let grid_pads = pads
            .iter()
            .filter(|(note, _)| ButtonClass::of(*note) == Some(ButtonClass::GridPad))
            .map(|(note, assignment)| {
                (
                    note,
                    GridPadVisual {
                        clicked: assignment.is_on,
                        css: assignment.assigned_color.css().to_string(),
                    },
                )
            })
            .collect();

        Snapshot {
            name: name.to_string(),
            timestamp: snapshot::now_millis(),
            button_states: pads.iter().map(|(note, a)| (note, *a)).collect(),
            grid_pads,
            circular_buttons: surface.circular().clone(),
            faders: surface.faders().clone(),
            blinking_buttons: self.blinks.blinking(),
        }
    }

    /// Replaces the whole state with `snapshot` and replays it onto the
    /// device. Restoring the same snapshot twice ends in the same state.
    pub async fn restore(&self, snapshot: &Snapshot) {
        self.darken_device().await;
        // The device must have taken every off before the replay starts.
        self.queue.wait_idle().await;

        let replay = {
            let mut pads = self.pads.locked();
            let mut surface = self.surface.locked();
            pads.clear();
            surface.reset_visuals();

            snapshot
                .button_states
                .iter()
                .filter(|(note, _)| palette::is_known_note(**note))
                .for_each(|(note, assignment)| pads.insert(*note, *assignment));
            surface.restore(&snapshot.circular_buttons, &snapshot.faders);

            let mut replay: Vec<LedCommand> = pads
                .iter()
                .map(|(note, assignment)| assignment.led_command(note, self.config.off_style))
                .collect();
            replay.extend(surface.lit_buttons());
            replay
        };

        sleep(self.config.settle_delay).await;
        let started = Instant::now();
        for (index, command) in replay.iter().enumerate() {
            sleep_until(started + self.config.stagger * index as u32).await;
            // The echo window opens at enqueue, so each command has to go
            // out right away instead of waiting behind a backlog.
            self.queue.wait_idle().await;
            self.send_expecting_echo(*command);
        }

        let blinking: Vec<(u8, PaletteColor)> = {
            let pads = self.pads.locked();
            snapshot
                .blinking_buttons
                .iter()
                .filter_map(|note| {
                    pads.get(*note)
                        .map(|assignment| (*note, assignment.assigned_color))
                })
                .collect()
        };
        for (note, color) in blinking {
            self.blinks.start(note, color);
        }

        info!(
            name = %snapshot.name,
            restored = replay.len(),
            "Snapshot restored."
        );
    }

    /// Nothing is touched when the file cannot be read or parsed.
    pub async fn load_snapshot(&self, path: &Path) -> Result<String, SnapshotError> {
        match self.snapshots.load(path).await {
            Ok(snapshot) => {
                self.restore(&snapshot).await;
                Ok(snapshot.name)
            }
            Err(e) => {
                error!(path = %path.display(), "Couldn't load snapshot. {e}");
                Err(e)
            }
        }
    }

    pub async fn save_snapshot(&self, path: &Path, name: &str) -> Result<(), SnapshotError> {
        let snapshot = self.snapshot(name);
        self.snapshots.save(path, &snapshot).await?;
        info!(path = %path.display(), %name, "Snapshot saved.");
        Ok(())
    }

    pub fn pads(&self) -> PadStore {
        self.pads.locked().clone()
    }

    pub fn assignment(&self, note: u8) -> Option<PadAssignment> {
        self.pads.locked().get(note).copied()
    }

    pub fn surface(&self) -> Surface {
        self.surface.locked().clone()
    }

    pub fn is_blinking(&self, note: u8) -> bool {
        self.blinks.is_blinking(note)
    }

    /// Resolves once everything enqueued so far has been sent or dropped.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await;
    }

    pub fn debug_report(&self) -> DebugReport {
        DebugReport {
            selection: self.selection(),
            outputs_available: self.queue.has_outputs(),
            assignments: self.pads.locked().iter().map(|(n, a)| (n, *a)).collect(),
            blinking: self.blinks.blinking(),
            queued: self.queue.len(),
            pending_echoes: self.echoes.len(),
            stats: self.queue.stats(),
        }
    }
}

pub struct DebugReport {
    pub selection: Selection,
    pub outputs_available: bool,
    pub assignments: Vec<(u8, PadAssignment)>,
    pub blinking: Vec<u8>,
    pub queued: usize,
    pub pending_echoes: usize,
    pub stats: QueueStats,
}

impl fmt::Display for DebugReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== DEBUG INFO ===")?;
        writeln!(f, "Selected color: {}", self.selection.color.name())?;
        writeln!(f, "Selected button behavior: {}", self.selection.behavior)?;
        writeln!(f, "MIDI outputs available: {}", self.outputs_available)?;
        writeln!(f, "Button states: {}", self.assignments.len())?;
        for (note, assignment) in &self.assignments {
            writeln!(
                f,
                "  Note {}: {} - {} ({})",
                note,
                assignment.assigned_color.name(),
                if assignment.is_on { "ON" } else { "OFF" },
                assignment.behavior
            )?;
        }
        writeln!(f, "Blinking: {:?}", self.blinking)?;
        writeln!(
            f,
            "Queue: {} waiting, {} sent, {} dropped, {} coalesced",
            self.queued, self.stats.sent, self.stats.dropped, self.stats.coalesced
        )?;
        writeln!(f, "Pending echoes: {}", self.pending_echoes)?;
        write!(f, "=== END DEBUG ===")
    }
}
