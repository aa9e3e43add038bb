use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::midi::model::DataByte;
use crate::mirror;
use crate::pads::OffStyle;
use crate::queue;

// YAML specific configuration

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct Millis(pub u64);

impl Millis {
    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub attempts: u8,
    pub retry_backoff_ms: Millis,
    pub inter_message_delay_ms: Millis,
    /// How many identical copies of each message go out back to back.
    pub burst_count: u8,
    pub burst_interval_ms: Millis,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_backoff_ms: Millis(20),
            inter_message_delay_ms: Millis(12),
            burst_count: 5,
            burst_interval_ms: Millis(2),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RestoreSettings {
    pub settle_delay_ms: Millis,
    pub stagger_ms: Millis,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            settle_delay_ms: Millis(100),
            stagger_ms: Millis(15),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Substring of the MIDI port names to open. All ports when absent.
    pub controller_name: Option<String>,
    pub queue: QueueSettings,
    pub echo_window_ms: Millis,
    pub blink_half_period_ms: Millis,
    pub toggle_off: OffStyle,
    pub restore: RestoreSettings,
    /// Inbound notes that load a snapshot file instead of pressing a pad.
    pub presets: BTreeMap<DataByte, PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            controller_name: None,
            queue: QueueSettings::default(),
            echo_window_ms: Millis(500),
            blink_half_period_ms: Millis(500),
            toggle_off: OffStyle::default(),
            restore: RestoreSettings::default(),
            presets: BTreeMap::new(),
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("queue.attempts must be at least 1")]
    NoAttempts,
    #[error("queue.burst_count must be at least 1")]
    NoBurst,
    #[error("echo_window_ms must be greater than 0")]
    NoEchoWindow,
    #[error("blink_half_period_ms must be greater than 0")]
    NoBlinkPeriod,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.queue.burst_count == 0 {
            return Err(ConfigError::NoBurst);
        }
        if self.echo_window_ms.0 == 0 {
            return Err(ConfigError::NoEchoWindow);
        }
        if self.blink_half_period_ms.0 == 0 {
            return Err(ConfigError::NoBlinkPeriod);
        }
        Ok(())
    }
}

// Parsed part - from configuration to application specific

pub struct ParsedSettings {
    pub controller_name: Option<String>,
    pub mirror_config: mirror::Config,
}

pub fn parse(settings: Settings) -> ParsedSettings {
    let queue_config = queue::Config {
        attempts: settings.queue.attempts,
        retry_backoff: settings.queue.retry_backoff_ms.as_duration(),
        inter_message_delay: settings.queue.inter_message_delay_ms.as_duration(),
        burst_count: settings.queue.burst_count,
        burst_interval: settings.queue.burst_interval_ms.as_duration(),
    };

    ParsedSettings {
        controller_name: settings.controller_name,
        mirror_config: mirror::Config {
            queue: queue_config,
            echo_window: settings.echo_window_ms.as_duration(),
            blink_half_period: settings.blink_half_period_ms.as_duration(),
            off_style: settings.toggle_off,
            settle_delay: settings.restore.settle_delay_ms.as_duration(),
            stagger: settings.restore.stagger_ms.as_duration(),
            presets: settings
                .presets
                .into_iter()
                .map(|(note, path)| (note.as_u8(), path))
                .collect(),
        },
    }
}

pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> anyhow::Result<Settings> {
    let conf_file = std::fs::File::open(path)?;
    // Workaround for merge anchors.
    // https://github.com/dtolnay/serde-yaml/issues/317
    let mut yaml_value: serde_yaml::Value = serde_yaml::from_reader(conf_file)?;
    yaml_value.apply_merge()?;
    let settings: Settings = serde_yaml::from_value(yaml_value)?;
    settings.validate()?;
    Ok(settings)
}
