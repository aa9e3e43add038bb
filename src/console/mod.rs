use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::midi::registry::model::{Behavior, PaletteColor, UnknownName};
use crate::mirror::PadMirror;

/// One line typed by the operator.
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Assign {
        note: u8,
        color: PaletteColor,
        behavior: Option<Behavior>,
    },
    Unassign(u8),
    /// Grid pad click with the current selection.
    Click(u8),
    /// Round button click.
    Aux(u8),
    Color(PaletteColor),
    Behavior(Behavior),
    Clear,
    Reset,
    Save {
        path: PathBuf,
        name: Option<String>,
    },
    Load(PathBuf),
    Debug,
    Quit,
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleParseError {
    #[error("Empty command.")]
    Empty,
    #[error("Unknown command {0:?}. Try: assign, unassign, click, aux, color, behavior, clear, reset, save, load, debug, quit.")]
    UnknownCommand(String),
    #[error("Missing {0}.")]
    MissingArgument(&'static str),
    #[error("{0:?} is not a MIDI note (0-127).")]
    BadNote(String),
    #[error(transparent)]
    UnknownName(#[from] UnknownName),
}

fn parse_note(word: Option<&str>) -> Result<u8, ConsoleParseError> {
    let word = word.ok_or(ConsoleParseError::MissingArgument("note"))?;
    word.parse::<u8>()
        .ok()
        .filter(|note| *note <= 127)
        .ok_or_else(|| ConsoleParseError::BadNote(word.to_string()))
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(ConsoleParseError::Empty)?;

        let parsed = match command.to_ascii_lowercase().as_str() {
            "assign" => {
                let note = parse_note(words.next())?;
                let color = words
                    .next()
                    .ok_or(ConsoleParseError::MissingArgument("color"))?
                    .parse::<PaletteColor>()?;
                let behavior = words.next().map(str::parse::<Behavior>).transpose()?;
                ConsoleCommand::Assign {
                    note,
                    color,
                    behavior,
                }
            }
            "unassign" => ConsoleCommand::Unassign(parse_note(words.next())?),
            "click" => ConsoleCommand::Click(parse_note(words.next())?),
            "aux" => ConsoleCommand::Aux(parse_note(words.next())?),
            "color" => ConsoleCommand::Color(
                words
                    .next()
                    .ok_or(ConsoleParseError::MissingArgument("color"))?
                    .parse::<PaletteColor>()?,
            ),
            "behavior" => ConsoleCommand::Behavior(
                words
                    .next()
                    .ok_or(ConsoleParseError::MissingArgument("behavior"))?
                    .parse::<Behavior>()?,
            ),
            "clear" => ConsoleCommand::Clear,
            "reset" => ConsoleCommand::Reset,
            "save" => {
                let path = words
                    .next()
                    .ok_or(ConsoleParseError::MissingArgument("file"))?;
                let name: Vec<&str> = words.by_ref().collect();
                ConsoleCommand::Save {
                    path: PathBuf::from(path),
                    name: (!name.is_empty()).then(|| name.join(" ")),
                }
            }
            "load" => ConsoleCommand::Load(PathBuf::from(
                words
                    .next()
                    .ok_or(ConsoleParseError::MissingArgument("file"))?,
            )),
            "debug" => ConsoleCommand::Debug,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => return Err(ConsoleParseError::UnknownCommand(other.to_string())),
        };
        Ok(parsed)
    }
}

pub enum Flow {
    Continue,
    Quit,
}

pub async fn execute(mirror: &PadMirror, command: ConsoleCommand) -> Flow {
    match command {
        ConsoleCommand::Assign {
            note,
            color,
            behavior,
        } => {
            let behavior = behavior.unwrap_or(mirror.selection().behavior);
            if !mirror.assign(note, color, behavior) {
                println!("Note {note} is not on the controller.");
            }
        }
        ConsoleCommand::Unassign(note) => mirror.unassign(note),
        ConsoleCommand::Click(note) => {
            if !mirror.click_pad(note) {
                println!("Note {note} is not on the controller.");
            }
        }
        ConsoleCommand::Aux(note) => {
            if !mirror.click_button(note) {
                println!("Note {note} is not a track or scene button.");
            }
        }
        ConsoleCommand::Color(color) => mirror.select_color(color),
        ConsoleCommand::Behavior(behavior) => mirror.select_behavior(behavior),
        ConsoleCommand::Clear => mirror.clear_grid().await,
        ConsoleCommand::Reset => mirror.reset_all().await,
        ConsoleCommand::Save { path, name } => {
            let name = name.unwrap_or_else(|| path.display().to_string());
            match mirror.save_snapshot(&path, &name).await {
                Ok(()) => println!("Saved {name:?} to {}.", path.display()),
                Err(e) => println!("Saving failed: {e}"),
            }
        }
        ConsoleCommand::Load(path) => match mirror.load_snapshot(&path).await {
            Ok(name) => println!("Loaded {name:?}."),
            Err(e) => println!("Loading failed, nothing changed: {e}"),
        },
        ConsoleCommand::Debug => println!("{}", mirror.debug_report()),
        ConsoleCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

/// Reads commands from stdin until `quit` or end of input.
pub async fn run(mirror: Arc<PadMirror>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<ConsoleCommand>() {
            Ok(command) => {
                debug!(?command, "Console command.");
                if let Flow::Quit = execute(&mirror, command).await {
                    break;
                }
            }
            Err(e) => {
                warn!("{e}");
                println!("{e}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::controller::stubs::Recording;
    use crate::mirror::Config;
    use crate::snapshot::InMemory;

    #[test]
    fn parses_assign_with_and_without_behavior() {
        assert_eq!(
            "assign 5 green toggle".parse(),
            Ok(ConsoleCommand::Assign {
                note: 5,
                color: PaletteColor::Green,
                behavior: Some(Behavior::Toggle)
            })
        );
        assert_eq!(
            "ASSIGN 100 red".parse(),
            Ok(ConsoleCommand::Assign {
                note: 100,
                color: PaletteColor::Red,
                behavior: None
            })
        );
    }

    #[test]
    fn parses_save_with_multi_word_name() {
        assert_eq!(
            "save set.json Friday night".parse(),
            Ok(ConsoleCommand::Save {
                path: PathBuf::from("set.json"),
                name: Some("Friday night".to_string())
            })
        );
        assert_eq!(
            "save set.json".parse(),
            Ok(ConsoleCommand::Save {
                path: PathBuf::from("set.json"),
                name: None
            })
        );
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!("".parse::<ConsoleCommand>(), Err(ConsoleParseError::Empty));
        assert_eq!(
            "assign".parse::<ConsoleCommand>(),
            Err(ConsoleParseError::MissingArgument("note"))
        );
        assert_eq!(
            "unassign 128".parse::<ConsoleCommand>(),
            Err(ConsoleParseError::BadNote("128".to_string()))
        );
        assert!(matches!(
            "assign 3 teal".parse::<ConsoleCommand>(),
            Err(ConsoleParseError::UnknownName(_))
        ));
        assert!(matches!(
            "dance".parse::<ConsoleCommand>(),
            Err(ConsoleParseError::UnknownCommand(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn executes_against_the_mirror() {
        let mirror = PadMirror::new(
            Arc::new(Recording::new()),
            Arc::new(InMemory::default()),
            Config::default(),
        );

        execute(&mirror, "behavior solid".parse().unwrap()).await;
        execute(&mirror, "assign 9 blue".parse().unwrap()).await;
        let assignment = mirror.assignment(9).unwrap();
        assert_eq!(assignment.behavior, Behavior::Solid);

        execute(&mirror, "unassign 9".parse().unwrap()).await;
        assert!(mirror.assignment(9).is_none());
        assert!(matches!(
            execute(&mirror, ConsoleCommand::Quit).await,
            Flow::Quit
        ));
    }
}
