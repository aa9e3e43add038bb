use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteColor {
    White,
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
    Off,
}

/// One row of the fixed color table. `velocity` is what the grid pads
/// interpret as a color index.
#[derive(Debug)]
pub struct ColorEntry {
    pub name: &'static str,
    pub value: PaletteColor,
    pub css: &'static str,
    pub velocity: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    #[default]
    Toggle,
    Solid,
    Blink,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} {name:?}.")]
pub struct UnknownName {
    pub kind: &'static str,
    pub name: String,
}

impl FromStr for PaletteColor {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "white" => Ok(PaletteColor::White),
            "red" => Ok(PaletteColor::Red),
            "orange" => Ok(PaletteColor::Orange),
            "yellow" => Ok(PaletteColor::Yellow),
            "green" => Ok(PaletteColor::Green),
            "blue" => Ok(PaletteColor::Blue),
            "purple" => Ok(PaletteColor::Purple),
            "pink" => Ok(PaletteColor::Pink),
            "off" => Ok(PaletteColor::Off),
            other => Err(UnknownName {
                kind: "color",
                name: other.to_string(),
            }),
        }
    }
}

impl FromStr for Behavior {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "toggle" => Ok(Behavior::Toggle),
            "solid" => Ok(Behavior::Solid),
            "blink" => Ok(Behavior::Blink),
            other => Err(UnknownName {
                kind: "behavior",
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Behavior::Toggle => "toggle",
            Behavior::Solid => "solid",
            Behavior::Blink => "blink",
        };
        f.write_str(name)
    }
}

/// Which physical part of the controller a note addresses.
/// Derived from the note number only, never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonClass {
    GridPad,
    TrackButton,
    SceneButton,
}

const GRID_PADS: RangeInclusive<u8> = 0..=63;
const TRACK_BUTTONS: RangeInclusive<u8> = 100..=107;
const SCENE_BUTTONS: RangeInclusive<u8> = 112..=119;

const RGB_CHANNEL: u8 = 5;
const SINGLE_COLOR_CHANNEL: u8 = 0;

impl ButtonClass {
    pub const ALL: [ButtonClass; 3] = [
        ButtonClass::GridPad,
        ButtonClass::TrackButton,
        ButtonClass::SceneButton,
    ];

    pub fn of(note: u8) -> Option<ButtonClass> {
        ButtonClass::ALL
            .into_iter()
            .find(|class| class.notes().contains(&note))
    }

    pub fn notes(&self) -> RangeInclusive<u8> {
        match self {
            ButtonClass::GridPad => GRID_PADS,
            ButtonClass::TrackButton => TRACK_BUTTONS,
            ButtonClass::SceneButton => SCENE_BUTTONS,
        }
    }

    pub fn channel(&self) -> u8 {
        match self {
            ButtonClass::GridPad => RGB_CHANNEL,
            ButtonClass::TrackButton | ButtonClass::SceneButton => SINGLE_COLOR_CHANNEL,
        }
    }

    /// Single-color buttons ignore the operator's palette choice.
    pub fn forced_color(&self) -> Option<PaletteColor> {
        match self {
            ButtonClass::GridPad => None,
            ButtonClass::TrackButton => Some(PaletteColor::Red),
            ButtonClass::SceneButton => Some(PaletteColor::Green),
        }
    }

    pub fn is_auxiliary(&self) -> bool {
        self.forced_color().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_notes_by_range() {
        assert_eq!(ButtonClass::of(0), Some(ButtonClass::GridPad));
        assert_eq!(ButtonClass::of(63), Some(ButtonClass::GridPad));
        assert_eq!(ButtonClass::of(64), None);
        assert_eq!(ButtonClass::of(100), Some(ButtonClass::TrackButton));
        assert_eq!(ButtonClass::of(107), Some(ButtonClass::TrackButton));
        assert_eq!(ButtonClass::of(108), None);
        assert_eq!(ButtonClass::of(112), Some(ButtonClass::SceneButton));
        assert_eq!(ButtonClass::of(119), Some(ButtonClass::SceneButton));
        assert_eq!(ButtonClass::of(127), None);
    }

    #[test]
    fn parses_names_case_insensitively() {
        assert_eq!("Green".parse(), Ok(PaletteColor::Green));
        assert_eq!(" BLINK ".parse(), Ok(Behavior::Blink));
        assert!("teal".parse::<PaletteColor>().is_err());
    }
}
