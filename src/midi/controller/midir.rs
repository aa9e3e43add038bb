use std::sync::Mutex;
use tracing::{debug, info, trace, warn};

use crate::extensions::mutex::MutexExt;
use crate::midi::model::{InboundMessage, MidiMessage, MidiSendFailed, MidiSender};

fn client_name(controller: Option<&str>) -> String {
    format!("{}-client", controller.unwrap_or("pad-mirror"))
}

fn port_matches(controller: Option<&str>, port_name: &str) -> bool {
    controller.map_or(true, |c| port_name.contains(c))
}

/// Sends every message to every output port whose name contains the
/// controller name (or to all outputs when no name is configured).
pub struct MidirBased {
    connections: Mutex<Vec<(String, midir::MidiOutputConnection)>>,
}

impl MidirBased {
    pub fn new(controller: Option<&str>) -> anyhow::Result<MidirBased> {
        let client_name = client_name(controller);
        let scanner = midir::MidiOutput::new(&client_name)?;
        let port_names: Vec<String> = scanner
            .ports()
            .iter()
            .filter_map(|p| scanner.port_name(p).ok())
            .filter(|pn| port_matches(controller, pn))
            .collect();

        let mut connections = Vec::with_capacity(port_names.len());
        for port_name in port_names {
            match Self::set_up_connection(&client_name, &port_name) {
                Ok(connection) => {
                    info!(port = %port_name, "Connected MIDI output.");
                    connections.push((port_name, connection));
                }
                Err(e) => warn!(port = %port_name, "Skipping MIDI output: {e}"),
            }
        }
        if connections.is_empty() {
            warn!(?controller, "No MIDI output devices available.");
        }

        Ok(MidirBased {
            connections: Mutex::new(connections),
        })
    }

    fn set_up_connection(
        client_name: &str,
        port_name: &str,
    ) -> anyhow::Result<midir::MidiOutputConnection> {
        let mo = midir::MidiOutput::new(client_name)?;
        let port = mo
            .ports()
            .into_iter()
            .find(|p| mo.port_name(p).ok().as_deref() == Some(port_name))
            .ok_or_else(|| anyhow::Error::msg(format!("{port_name} disappeared.")))?;
        mo.connect(&port, port_name).map_err(|e| {
            anyhow::Error::msg(format!("Couldn't set up connection with {port_name}: {e}"))
        })
    }
}

impl MidiSender for MidirBased {
    fn send(&self, msg: &MidiMessage) -> Result<(), MidiSendFailed> {
        let mut connections = self.connections.locked();
        if connections.is_empty() {
            return Err(MidiSendFailed::NoOutputs);
        }

        let bytes = msg.as_bytes();
        for (port_name, connection) in connections.iter_mut() {
            connection
                .send(&bytes)
                .map_err(|e| MidiSendFailed::Transport {
                    human_friendly_description: format!("{port_name} rejected {bytes:?}"),
                    underlying_error: Some(Box::new(e)),
                })?;
        }
        trace!(?bytes, "Sent.");
        Ok(())
    }

    fn has_outputs(&self) -> bool {
        !self.connections.locked().is_empty()
    }
}

/// Keeps the input connections open; decoded messages are pushed to the
/// channel handed to [`MidirListener::start`].
pub struct MidirListener {
    _connections: Vec<midir::MidiInputConnection<()>>,
}

impl MidirListener {
    pub fn start(
        controller: Option<&str>,
        inbound: async_channel::Sender<InboundMessage>,
    ) -> anyhow::Result<MidirListener> {
        let client_name = client_name(controller);
        let scanner = midir::MidiInput::new(&client_name)?;
        let port_names: Vec<String> = scanner
            .ports()
            .iter()
            .filter_map(|p| scanner.port_name(p).ok())
            .filter(|pn| port_matches(controller, pn))
            .collect();

        let mut connections = Vec::with_capacity(port_names.len());
        for port_name in port_names {
            let mut mi = midir::MidiInput::new(&client_name)?;
            mi.ignore(midir::Ignore::All);
            let Some(port) = mi
                .ports()
                .into_iter()
                .find(|p| mi.port_name(p).ok().as_deref() == Some(port_name.as_str()))
            else {
                continue;
            };

            let tx = inbound.clone();
            let connection = mi
                .connect(
                    &port,
                    &port_name,
                    move |_stamp, bytes, _| match InboundMessage::decode(bytes) {
                        // Unbounded, so this only fails once the receiver is gone.
                        Some(msg) => {
                            let _ = tx.try_send(msg);
                        }
                        None => trace!(?bytes, "Ignoring undecodable MIDI message."),
                    },
                    (),
                )
                .map_err(|e| {
                    anyhow::Error::msg(format!("Couldn't listen on {port_name}: {e}"))
                })?;
            info!(port = %port_name, "Listening to MIDI input.");
            connections.push(connection);
        }
        if connections.is_empty() {
            debug!(?controller, "No MIDI input devices matched.");
        }

        Ok(MidirListener {
            _connections: connections,
        })
    }
}
