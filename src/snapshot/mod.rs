use async_trait::async_trait;
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::mirror::surface::{CircularButton, Fader};
use crate::pads::PadAssignment;

/// Portable picture of the whole surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub name: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, deserialize_with = "notes_in_midi_range")]
    pub button_states: BTreeMap<u8, PadAssignment>,
    #[serde(default)]
    pub grid_pads: BTreeMap<u8, GridPadVisual>,
    #[serde(default)]
    pub circular_buttons: BTreeMap<String, CircularButton>,
    #[serde(default)]
    pub faders: BTreeMap<String, Fader>,
    #[serde(default, deserialize_with = "blinking_in_midi_range")]
    pub blinking_buttons: Vec<u8>,
}

// Entries for notes no controller can have are dropped, not rejected, so a
// snapshot from a wider surface still restores. Keys that are not numbers
// at all stay an error.
fn notes_in_midi_range<'de, D>(deserializer: D) -> Result<BTreeMap<u8, PadAssignment>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, PadAssignment>::deserialize(deserializer)?;
    let mut states = BTreeMap::new();
    for (key, assignment) in raw {
        let note: u64 = key
            .parse()
            .map_err(|_| de::Error::invalid_value(Unexpected::Str(key.as_str()), &"a note number"))?;
        match u8::try_from(note) {
            Ok(note) => {
                states.insert(note, assignment);
            }
            Err(_) => debug!(note, "Skipping snapshot entry for unknown note."),
        }
    }
    Ok(states)
}

fn blinking_in_midi_range<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<u64>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|note| u8::try_from(note).ok())
        .collect())
}

/// How a grid pad looked when the snapshot was taken. Informational only;
/// restores rebuild visuals from `button_states`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPadVisual {
    pub clicked: bool,
    pub css: String,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Couldn't access snapshot file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Snapshot is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn decode(text: &str) -> Result<Snapshot, SnapshotError> {
    Ok(serde_json::from_str(text)?)
}

pub fn encode(snapshot: &Snapshot) -> Result<String, SnapshotError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

#[async_trait]
pub trait SnapshotStore {
    async fn load(&self, path: &Path) -> Result<Snapshot, SnapshotError>;

    async fn save(&self, path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError>;
}

/// Pretty-printed JSON files on disk.
pub struct JsonFiles;

#[async_trait]
impl SnapshotStore for JsonFiles {
    async fn load(&self, path: &Path) -> Result<Snapshot, SnapshotError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        decode(&text)
    }

    async fn save(&self, path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let text = encode(snapshot)?;
        tokio::fs::write(path, text)
            .await
            .map_err(|source| SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
pub use in_memory::InMemory;

#[cfg(test)]
mod in_memory {
    use std::collections::HashMap;
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use super::*;

    /// Keeps encoded snapshots keyed by path.
    #[derive(Default)]
    pub struct InMemory(Mutex<HashMap<PathBuf, String>>);

    impl InMemory {
        pub fn put(&self, path: &str, text: &str) {
            self.0
                .lock()
                .unwrap()
                .insert(PathBuf::from(path), text.to_string());
        }

        pub fn get(&self, path: &str) -> Option<String> {
            self.0.lock().unwrap().get(Path::new(path)).cloned()
        }
    }

    #[async_trait]
    impl SnapshotStore for InMemory {
        async fn load(&self, path: &Path) -> Result<Snapshot, SnapshotError> {
            let text = self.0.lock().unwrap().get(path).cloned();
            match text {
                Some(text) => decode(&text),
                None => Err(SnapshotError::Io {
                    path: path.to_path_buf(),
                    source: io::Error::from(io::ErrorKind::NotFound),
                }),
            }
        }

        async fn save(&self, path: &Path, snapshot: &Snapshot) -> Result<(), SnapshotError> {
            let text = encode(snapshot)?;
            self.0.lock().unwrap().insert(path.to_path_buf(), text);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::registry::model::{Behavior, PaletteColor};

    #[test]
    fn reads_the_documented_layout() {
        let text = r##"{
            "name": "Evening set",
            "timestamp": 1700000000000,
            "buttonStates": {
                "5": {"isOn": true, "assignedColor": "green", "behavior": "toggle"},
                "12": {"isOn": false, "assignedColor": "pink", "behavior": "blink"}
            },
            "gridPads": {"5": {"clicked": true, "css": "#00FF00"}},
            "circularButtons": {"Track1": {"note": 100, "clicked": true, "color": "red"}},
            "faders": {"Fader1": {"value": 100, "knobPosition": 21.2}},
            "blinkingButtons": [12]
        }"##;
        let snapshot = decode(text).unwrap();

        assert_eq!(snapshot.name, "Evening set");
        assert_eq!(
            snapshot.button_states[&5],
            PadAssignment {
                is_on: true,
                assigned_color: PaletteColor::Green,
                behavior: Behavior::Toggle
            }
        );
        assert_eq!(snapshot.blinking_buttons, vec![12]);
        assert!(snapshot.circular_buttons["Track1"].clicked);
        assert_eq!(snapshot.faders["Fader1"].value, 100);
    }

    #[test]
    fn optional_sections_may_be_missing() {
        let snapshot = decode(r#"{"name": "bare", "timestamp": 0}"#).unwrap();
        assert!(snapshot.button_states.is_empty());
        assert!(snapshot.blinking_buttons.is_empty());
    }

    #[test]
    fn notes_beyond_a_byte_are_dropped() {
        let snapshot = decode(
            r#"{
                "name": "wide",
                "timestamp": 0,
                "buttonStates": {
                    "5": {"isOn": true, "assignedColor": "green", "behavior": "toggle"},
                    "300": {"isOn": true, "assignedColor": "red", "behavior": "solid"}
                },
                "blinkingButtons": [300, 5]
            }"#,
        )
        .unwrap();

        assert_eq!(snapshot.button_states.keys().copied().collect::<Vec<_>>(), vec![5]);
        assert_eq!(snapshot.blinking_buttons, vec![5]);
    }

    #[test]
    fn garbage_is_reported_as_malformed() {
        assert!(matches!(
            decode("{ not json"),
            Err(SnapshotError::Malformed(_))
        ));
        assert!(matches!(
            decode(r#"{"name": "x", "timestamp": 0, "buttonStates": {"5": {"isOn": true, "assignedColor": "teal", "behavior": "toggle"}}}"#),
            Err(SnapshotError::Malformed(_))
        ));
        assert!(matches!(
            decode(r#"{"name": "x", "timestamp": 0, "buttonStates": {"five": {"isOn": true, "assignedColor": "red", "behavior": "toggle"}}}"#),
            Err(SnapshotError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn json_files_round_trip() {
        let path = std::env::temp_dir().join(format!("pad_mirror_{}.json", now_millis()));
        let snapshot = Snapshot {
            name: "disk".to_string(),
            timestamp: 42,
            button_states: BTreeMap::from([(
                7,
                PadAssignment::new(PaletteColor::Blue, Behavior::Solid),
            )]),
            grid_pads: BTreeMap::new(),
            circular_buttons: BTreeMap::new(),
            faders: BTreeMap::new(),
            blinking_buttons: vec![],
        };

        JsonFiles.save(&path, &snapshot).await.unwrap();
        let loaded = JsonFiles.load(&path).await.unwrap();
        let _ = tokio::fs::remove_file(&path).await;

        assert_eq!(loaded, snapshot);
    }

    #[tokio::test]
    async fn missing_file_is_an_io_error() {
        let missing = std::env::temp_dir().join("pad_mirror_does_not_exist.json");
        assert!(matches!(
            JsonFiles.load(&missing).await,
            Err(SnapshotError::Io { .. })
        ));
    }
}
