mod configuration;
mod console;
mod echo;
mod extensions;
mod midi;
mod mirror;
mod pads;
mod queue;
mod scheduler;
mod snapshot;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::configuration::Settings;
use crate::midi::controller::{midir, stubs};
use crate::midi::model::{InboundMessage, SharedMidiSender};
use crate::mirror::PadMirror;
use crate::snapshot::JsonFiles;

/// Keeps an APC-style pad controller's LEDs in sync with the operator's
/// pad assignments.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML settings file. Built-in defaults when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Substring of the MIDI port names to open. Overrides the settings file.
    #[arg(long)]
    controller: Option<String>,
    /// Snapshot to restore right after start-up.
    #[arg(long)]
    restore: Option<PathBuf>,
    /// Where to write a snapshot when shutting down.
    #[arg(long)]
    save_on_exit: Option<PathBuf>,
    /// Log outgoing messages instead of opening MIDI ports.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings = match &args.config {
        Some(path) => configuration::load_from_yaml(path)?,
        None => Settings::default(),
    };
    let parsed = configuration::parse(settings);
    let controller = args.controller.or(parsed.controller_name);

    let (inbound_tx, inbound_rx) = async_channel::unbounded::<InboundMessage>();
    // The listener keeps the input ports open while it lives.
    let (sender, _listener) = if args.dry_run {
        info!("Dry run: MIDI ports stay closed.");
        let sender: SharedMidiSender = Arc::new(stubs::JustLog);
        (sender, None)
    } else {
        let sender: SharedMidiSender =
            Arc::new(midir::MidirBased::new(controller.as_deref())?);
        let listener = midir::MidirListener::start(controller.as_deref(), inbound_tx)?;
        (sender, Some(listener))
    };

    let mirror = Arc::new(PadMirror::new(
        sender,
        Arc::new(JsonFiles),
        parsed.mirror_config,
    ));

    // Listen before restoring so the replay's echoes are recognised.
    mirror.clone().listen(inbound_rx);

    if let Some(path) = &args.restore {
        match mirror.load_snapshot(path).await {
            Ok(name) => info!(snapshot = %name, "Restored at start-up."),
            Err(e) => warn!("Start-up restore skipped: {e}"),
        }
    }

    let mut console = tokio::spawn(console::run(mirror.clone()));
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted."),
        finished = &mut console => match finished {
            Ok(Ok(())) => info!("Console closed."),
            Ok(Err(e)) => error!("Console failed: {e}"),
            Err(e) => error!("Console task died: {e}"),
        },
    }

    if let Some(path) = &args.save_on_exit {
        let name = format!("Exit {}", snapshot::now_millis());
        match mirror.save_snapshot(path, &name).await {
            Ok(()) => info!(path = %path.display(), "Saved on exit."),
            Err(e) => error!("Saving on exit failed: {e}"),
        }
    }
    mirror.wait_idle().await;
    Ok(())
}
