use crate::midi::registry::model::{ButtonClass, ColorEntry, PaletteColor};

pub const PALETTE: [ColorEntry; 9] = [
    ColorEntry {
        name: "White",
        value: PaletteColor::White,
        css: "#FFFFFF",
        velocity: 3,
    },
    ColorEntry {
        name: "Red",
        value: PaletteColor::Red,
        css: "#FF0000",
        velocity: 5,
    },
    ColorEntry {
        name: "Orange",
        value: PaletteColor::Orange,
        css: "#FF5400",
        velocity: 9,
    },
    ColorEntry {
        name: "Yellow",
        value: PaletteColor::Yellow,
        css: "#FFFF00",
        velocity: 13,
    },
    ColorEntry {
        name: "Green",
        value: PaletteColor::Green,
        css: "#00FF00",
        velocity: 21,
    },
    ColorEntry {
        name: "Blue",
        value: PaletteColor::Blue,
        css: "#0000FF",
        velocity: 45,
    },
    ColorEntry {
        name: "Purple",
        value: PaletteColor::Purple,
        css: "#5400FF",
        velocity: 49,
    },
    ColorEntry {
        name: "Pink",
        value: PaletteColor::Pink,
        css: "#FF00FF",
        velocity: 53,
    },
    ColorEntry {
        name: "Off",
        value: PaletteColor::Off,
        css: "#000000",
        velocity: 0,
    },
];

impl PaletteColor {
    pub fn entry(&self) -> &'static ColorEntry {
        // The table holds one row per variant, in declaration order.
        &PALETTE[*self as usize]
    }

    pub fn velocity(&self) -> u8 {
        self.entry().velocity
    }

    pub fn css(&self) -> &'static str {
        self.entry().css
    }

    pub fn name(&self) -> &'static str {
        self.entry().name
    }
}

/// Color the LED of `note` will actually show for the requested color.
pub fn effective_color(note: u8, requested: PaletteColor) -> PaletteColor {
    if requested == PaletteColor::Off {
        return PaletteColor::Off;
    }
    ButtonClass::of(note)
        .and_then(|class| class.forced_color())
        .unwrap_or(requested)
}

/// Channel an LED command for `note` goes out on.
pub fn channel_for(note: u8) -> u8 {
    ButtonClass::of(note)
        .unwrap_or(ButtonClass::GridPad)
        .channel()
}

pub fn is_known_note(note: u8) -> bool {
    ButtonClass::of(note).is_some()
}

pub fn grid_notes() -> impl Iterator<Item = u8> {
    ButtonClass::GridPad.notes()
}

pub fn auxiliary_notes() -> impl Iterator<Item = u8> {
    ButtonClass::TrackButton
        .notes()
        .chain(ButtonClass::SceneButton.notes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_rows_follow_variant_order() {
        for entry in PALETTE.iter() {
            assert_eq!(entry.value.entry().name, entry.name);
        }
        assert_eq!(PaletteColor::Green.velocity(), 21);
        assert_eq!(PaletteColor::Off.velocity(), 0);
    }

    #[test]
    fn auxiliary_buttons_ignore_selected_color() {
        let colors = PALETTE
            .iter()
            .map(|entry| entry.value)
            .filter(|color| *color != PaletteColor::Off);
        for color in colors {
            for note in 100..=107 {
                assert_eq!(effective_color(note, color), PaletteColor::Red);
                assert_eq!(channel_for(note), 0);
            }
            for note in 112..=119 {
                assert_eq!(effective_color(note, color), PaletteColor::Green);
                assert_eq!(channel_for(note), 0);
            }
            assert_eq!(effective_color(12, color), color);
            assert_eq!(channel_for(12), 5);
        }
    }

    #[test]
    fn off_stays_off_everywhere() {
        assert_eq!(effective_color(100, PaletteColor::Off), PaletteColor::Off);
        assert_eq!(effective_color(3, PaletteColor::Off), PaletteColor::Off);
    }
}
