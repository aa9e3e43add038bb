use serde::de::{Error, Visitor};
use serde::{Deserialize, Deserializer};
use std::error;
use std::fmt::Formatter;
use std::sync::Arc;
use thiserror;

const U8_MSB_EXTRACTOR: u8 = 0x80;
const KIND_EXTRACTOR: u8 = 0xF0;
const CHANNEL_EXTRACTOR: u8 = 0x0F;

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;
const CONTROL_CHANGE: u8 = 0xB0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Status(u8);

impl Status {
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn from_u8(status: u8) -> Option<Status> {
        (status & U8_MSB_EXTRACTOR == U8_MSB_EXTRACTOR).then_some(Status(status))
    }

    /// Note-on status byte addressed to `channel` (0-15).
    pub fn note_on(channel: u8) -> Option<Status> {
        (channel <= CHANNEL_EXTRACTOR).then_some(Status(NOTE_ON | channel))
    }

    pub fn kind(&self) -> u8 {
        self.0 & KIND_EXTRACTOR
    }

    pub fn channel(&self) -> u8 {
        self.0 & CHANNEL_EXTRACTOR
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct DataByte(u8);

impl DataByte {
    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn from_u8(db: u8) -> Option<DataByte> {
        (db & U8_MSB_EXTRACTOR == 0).then_some(DataByte(db))
    }
}

struct DataByteVisitor;

impl<'de> Visitor<'de> for DataByteVisitor {
    type Value = DataByte;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("Expecting data byte to be u8 between 0x00 and 0x7F.")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: Error,
    {
        let parse_res = u8::try_from(v).ok().and_then(DataByte::from_u8);

        match parse_res {
            None => Err(E::custom(format!(
                "Expecting data byte to be u8 between 0x00 and 0x7F. Got: {}.",
                v
            ))),
            Some(db) => Ok(db),
        }
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: Error,
    {
        match u64::try_from(v) {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::custom(format!(
                "Expecting data byte to be u8 between 0x00 and 0x7F. Got: {}.",
                v
            ))),
        }
    }

    // YAML and JSON map keys arrive as strings.
    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        match v.trim().parse::<u64>() {
            Ok(v) => self.visit_u64(v),
            Err(_) => Err(E::custom(format!(
                "Expecting data byte to be u8 between 0x00 and 0x7F. Got: {:?}.",
                v
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for DataByte {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_u8(DataByteVisitor)
    }
}

/// Outbound 3-byte channel message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiMessage {
    pub status: Status,
    pub fst_data_byte: DataByte,
    pub snd_data_byte: DataByte,
}

impl MidiMessage {
    /// `[0x90 + channel, note, velocity]`. Velocity 0 is how the controller
    /// is told to switch an LED off, so no note-off is ever produced here.
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Option<MidiMessage> {
        Some(MidiMessage {
            status: Status::note_on(channel)?,
            fst_data_byte: DataByte::from_u8(note)?,
            snd_data_byte: DataByte::from_u8(velocity)?,
        })
    }

    pub fn as_bytes(&self) -> [u8; 3] {
        [
            self.status.as_u8(),
            self.fst_data_byte.as_u8(),
            self.snd_data_byte.as_u8(),
        ]
    }
}

/// Decoded form of what the controller sends back to us.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InboundMessage {
    NoteOn { note: u8, velocity: u8, channel: u8 },
    NoteOff { note: u8, channel: u8 },
    ControlChange { controller: u8, value: u8, channel: u8 },
}

impl InboundMessage {
    pub fn decode(bytes: &[u8]) -> Option<InboundMessage> {
        let (&status, data) = bytes.split_first()?;
        let status = Status::from_u8(status)?;
        let fst = data.first().copied().and_then(DataByte::from_u8)?.as_u8();
        let snd = data.get(1).copied().and_then(DataByte::from_u8)?.as_u8();
        let channel = status.channel();

        match status.kind() {
            NOTE_ON if snd > 0 => Some(InboundMessage::NoteOn {
                note: fst,
                velocity: snd,
                channel,
            }),
            NOTE_ON | NOTE_OFF => Some(InboundMessage::NoteOff { note: fst, channel }),
            CONTROL_CHANGE => Some(InboundMessage::ControlChange {
                controller: fst,
                value: snd,
                channel,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MidiSendFailed {
    #[error("No MIDI output device is connected.")]
    NoOutputs,
    #[error("Sending MIDI Message failed. Reason: {human_friendly_description}.")]
    Transport {
        human_friendly_description: String,
        #[source]
        underlying_error: Option<Box<dyn error::Error + Send + Sync>>,
    },
}

pub trait MidiSender {
    fn send(&self, msg: &MidiMessage) -> Result<(), MidiSendFailed>;

    fn has_outputs(&self) -> bool;
}

pub type SharedMidiSender = Arc<dyn MidiSender + Send + Sync + 'static>;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Human readable note name, e.g. `C4 (60)`.
pub fn note_name(note: u8) -> String {
    let octave = i32::from(note / 12) - 1;
    format!("{}{} ({})", NOTE_NAMES[usize::from(note % 12)], octave, note)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_on_builds_channel_status() {
        let msg = MidiMessage::note_on(5, 12, 21).unwrap();
        assert_eq!(msg.as_bytes(), [0x95, 12, 21]);
        assert!(MidiMessage::note_on(16, 12, 21).is_none());
        assert!(MidiMessage::note_on(0, 128, 21).is_none());
    }

    #[test]
    fn decodes_inbound_messages() {
        assert_eq!(
            InboundMessage::decode(&[0x96, 5, 127]),
            Some(InboundMessage::NoteOn {
                note: 5,
                velocity: 127,
                channel: 6
            })
        );
        assert_eq!(
            InboundMessage::decode(&[0x90, 5, 0]),
            Some(InboundMessage::NoteOff { note: 5, channel: 0 })
        );
        assert_eq!(
            InboundMessage::decode(&[0xB0, 48, 100]),
            Some(InboundMessage::ControlChange {
                controller: 48,
                value: 100,
                channel: 0
            })
        );
        assert_eq!(InboundMessage::decode(&[0xF8]), None);
        assert_eq!(InboundMessage::decode(&[0x90, 5]), None);
    }

    #[test]
    fn names_notes() {
        assert_eq!(note_name(60), "C4 (60)");
        assert_eq!(note_name(0), "C-1 (0)");
        assert_eq!(note_name(127), "G9 (127)");
    }

    #[test]
    fn data_byte_rejects_out_of_range_values() {
        let ok: DataByte = serde_yaml::from_str("100").unwrap();
        assert_eq!(ok.as_u8(), 100);
        assert!(serde_yaml::from_str::<DataByte>("200").is_err());
    }
}
