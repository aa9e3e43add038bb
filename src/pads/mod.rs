use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::midi::model::MidiMessage;
use crate::midi::registry::model::{Behavior, ButtonClass, PaletteColor};
use crate::midi::registry::palette;

/// What a toggle pad shows once it has been switched off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffStyle {
    /// Real LED off (velocity 0).
    #[default]
    Dark,
    /// Neutral white, so the pad stays visibly assigned.
    White,
}

/// An LED update derived from pad state. Becomes a queued command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LedCommand {
    pub note: u8,
    pub is_on: bool,
    pub velocity: u8,
    pub channel: u8,
}

impl LedCommand {
    pub fn on(note: u8, color: PaletteColor) -> LedCommand {
        LedCommand {
            note,
            is_on: true,
            velocity: palette::effective_color(note, color).velocity(),
            channel: palette::channel_for(note),
        }
    }

    pub fn off(note: u8) -> LedCommand {
        LedCommand {
            note,
            is_on: false,
            velocity: 0,
            channel: palette::channel_for(note),
        }
    }

    /// Off state of a toggle pad. Single-color buttons cannot show white,
    /// so they always go dark.
    pub fn switched_off(note: u8, style: OffStyle) -> LedCommand {
        let rgb = ButtonClass::of(note).map_or(true, |class| !class.is_auxiliary());
        match style {
            OffStyle::White if rgb => LedCommand {
                is_on: false,
                ..LedCommand::on(note, PaletteColor::White)
            },
            _ => LedCommand::off(note),
        }
    }

    pub fn message(&self) -> Option<MidiMessage> {
        MidiMessage::note_on(self.channel, self.note, self.velocity)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PadAssignment {
    pub is_on: bool,
    pub assigned_color: PaletteColor,
    pub behavior: Behavior,
}

/// Result of a physical press on a pad.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PressOutcome {
    /// Nothing assigned, nothing to do.
    Unassigned,
    /// Solid pads stay lit.
    Held,
    Switched(LedCommand),
    StartBlink(PaletteColor),
    StopBlink,
}

impl PadAssignment {
    pub fn new(color: PaletteColor, behavior: Behavior) -> PadAssignment {
        PadAssignment {
            is_on: true,
            assigned_color: color,
            behavior,
        }
    }

    /// The single transition function for presses coming from the device.
    pub fn press(&mut self, note: u8, off_style: OffStyle, blinking: bool) -> PressOutcome {
        match self.behavior {
            Behavior::Solid => PressOutcome::Held,
            Behavior::Toggle => {
                self.is_on = !self.is_on;
                PressOutcome::Switched(self.led_command(note, off_style))
            }
            Behavior::Blink if blinking => PressOutcome::StopBlink,
            Behavior::Blink => {
                self.is_on = true;
                PressOutcome::StartBlink(self.assigned_color)
            }
        }
    }

    /// Steady LED state matching this assignment.
    pub fn led_command(&self, note: u8, off_style: OffStyle) -> LedCommand {
        if self.is_on {
            LedCommand::on(note, self.assigned_color)
        } else {
            LedCommand::switched_off(note, off_style)
        }
    }
}

/// Note number to assignment. The only place that knows what is on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PadStore {
    assignments: BTreeMap<u8, PadAssignment>,
}

impl PadStore {
    pub fn new() -> PadStore {
        PadStore::default()
    }

    /// Assigning `Off` removes the record.
    pub fn assign(&mut self, note: u8, color: PaletteColor, behavior: Behavior) -> LedCommand {
        if color == PaletteColor::Off {
            return self.unassign(note);
        }
        self.assignments
            .insert(note, PadAssignment::new(color, behavior));
        LedCommand::on(note, color)
    }

    pub fn unassign(&mut self, note: u8) -> LedCommand {
        self.assignments.remove(&note);
        LedCommand::off(note)
    }

    pub fn press(&mut self, note: u8, off_style: OffStyle, blinking: bool) -> PressOutcome {
        match self.assignments.get_mut(&note) {
            None => PressOutcome::Unassigned,
            Some(assignment) => assignment.press(note, off_style, blinking),
        }
    }

    pub fn get(&self, note: u8) -> Option<&PadAssignment> {
        self.assignments.get(&note)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &PadAssignment)> {
        self.assignments.iter().map(|(note, a)| (*note, a))
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Restores a record without deriving any LED command.
    pub fn insert(&mut self, note: u8, assignment: PadAssignment) {
        self.assignments.insert(note, assignment);
    }

    /// Keeps the assignments but marks them all off.
    pub fn switch_all_off(&mut self) {
        self.assignments
            .values_mut()
            .for_each(|assignment| assignment.is_on = false);
    }

    pub fn clear(&mut self) {
        self.assignments.clear();
    }
}
