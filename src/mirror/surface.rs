use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::midi::registry::model::{Behavior, ButtonClass, PaletteColor};
use crate::midi::registry::palette;
use crate::pads::LedCommand;

const FADER_CONTROLLERS: std::ops::RangeInclusive<u8> = 48..=56;
const FADER_CENTER: u8 = 64;

/// What the operator picked in the palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub color: PaletteColor,
    pub behavior: Behavior,
}

impl Default for Selection {
    fn default() -> Self {
        Selection {
            color: PaletteColor::White,
            behavior: Behavior::Toggle,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircularButton {
    pub note: u8,
    pub clicked: bool,
    #[serde(default)]
    pub color: Option<PaletteColor>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fader {
    pub value: u8,
    /// Percentage from the top of the fader track.
    pub knob_position: f32,
}

impl Fader {
    pub fn at(value: u8) -> Fader {
        let value = value.min(127);
        Fader {
            value,
            knob_position: f32::from(127 - value) * 100.0 / 127.0,
        }
    }
}

/// Velocity classes used for the short press flash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashLevel {
    Low,
    Medium,
    High,
}

impl FlashLevel {
    pub fn of(velocity: u8) -> FlashLevel {
        match velocity {
            0..=41 => FlashLevel::Low,
            42..=83 => FlashLevel::Medium,
            _ => FlashLevel::High,
        }
    }
}

/// `Track1`..`Track8`, `Scene1`..`Scene8`.
pub fn button_label(note: u8) -> Option<String> {
    let class = ButtonClass::of(note)?;
    let index = note - class.notes().start() + 1;
    match class {
        ButtonClass::TrackButton => Some(format!("Track{index}")),
        ButtonClass::SceneButton => Some(format!("Scene{index}")),
        ButtonClass::GridPad => None,
    }
}

/// `Fader1`..`Fader9` for control changes 48..=56.
pub fn fader_label(controller: u8) -> Option<String> {
    FADER_CONTROLLERS
        .contains(&controller)
        .then(|| format!("Fader{}", controller - FADER_CONTROLLERS.start() + 1))
}

/// Visual state outside the pad store: round buttons, faders and the
/// operator's palette selection.
#[derive(Clone, Debug, PartialEq)]
pub struct Surface {
    pub selection: Selection,
    circular: BTreeMap<String, CircularButton>,
    faders: BTreeMap<String, Fader>,
}

impl Default for Surface {
    fn default() -> Self {
        let mut surface = Surface {
            selection: Selection::default(),
            circular: BTreeMap::new(),
            faders: BTreeMap::new(),
        };
        surface.reset_visuals();
        surface
    }
}

impl Surface {
    pub fn new() -> Surface {
        Surface::default()
    }

    /// Toggles the clicked state of a round button with the selected color.
    /// Selecting "off" always unclicks. None for notes that are not round
    /// buttons.
    pub fn click(&mut self, note: u8) -> Option<LedCommand> {
        let label = button_label(note)?;
        let selected = self.selection.color;
        let button = self.circular.entry(label).or_insert(CircularButton {
            note,
            clicked: false,
            color: None,
        });

        if selected == PaletteColor::Off || button.clicked {
            button.clicked = false;
            button.color = None;
            Some(LedCommand::off(note))
        } else {
            button.clicked = true;
            button.color = Some(palette::effective_color(note, selected));
            Some(LedCommand::on(note, selected))
        }
    }

    pub fn move_fader(&mut self, controller: u8, value: u8) -> Option<(String, Fader)> {
        let label = fader_label(controller)?;
        let fader = Fader::at(value);
        self.faders.insert(label.clone(), fader);
        Some((label, fader))
    }

    /// Unclicks every round button and recentres the faders.
    pub fn reset_visuals(&mut self) {
        self.circular = palette::auxiliary_notes()
            .filter_map(|note| {
                button_label(note).map(|label| {
                    (
                        label,
                        CircularButton {
                            note,
                            clicked: false,
                            color: None,
                        },
                    )
                })
            })
            .collect();
        self.faders = FADER_CONTROLLERS
            .filter_map(|cc| fader_label(cc).map(|label| (label, Fader::at(FADER_CENTER))))
            .collect();
    }

    /// Takes over known entries; unknown labels are skipped.
    pub fn restore(
        &mut self,
        circular: &BTreeMap<String, CircularButton>,
        faders: &BTreeMap<String, Fader>,
    ) {
        for (label, button) in circular {
            if button_label(button.note).as_deref() == Some(label.as_str()) {
                self.circular.insert(label.clone(), *button);
            }
        }
        for (label, fader) in faders {
            if self.faders.contains_key(label) {
                self.faders.insert(label.clone(), Fader::at(fader.value));
            }
        }
    }

    /// LED commands that show the clicked round buttons.
    pub fn lit_buttons(&self) -> Vec<LedCommand> {
        self.circular
            .values()
            .filter(|button| button.clicked)
            .map(|button| {
                LedCommand::on(button.note, button.color.unwrap_or(PaletteColor::White))
            })
            .collect()
    }

    pub fn circular(&self) -> &BTreeMap<String, CircularButton> {
        &self.circular
    }

    pub fn faders(&self) -> &BTreeMap<String, Fader> {
        &self.faders
    }
}
