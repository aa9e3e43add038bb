use tracing::info;

use crate::midi::model::{MidiMessage, MidiSendFailed, MidiSender};

/// Dry-run sender: logs instead of touching hardware.
pub struct JustLog;

impl MidiSender for JustLog {
    fn send(&self, msg: &MidiMessage) -> Result<(), MidiSendFailed> {
        info!(bytes = ?msg.as_bytes(), "Dry run, not sent.");
        Ok(())
    }

    fn has_outputs(&self) -> bool {
        true
    }
}

#[cfg(test)]
pub use recording::Recording;
