// Console Controller - Bridges the terminal with the scan session processor
//
// This module contains the ConsoleController which coordinates between:
// - stdin (user commands, read on a background thread)
// - ProcessorHandle (enqueue-only access to the processor)
// - ProcessorEvent subscription (rendered on the calling thread)
//
// It never reads session state directly; everything it shows comes from events.

use crate::models::{Installation, ProfileConfig, ScanSide, ScanStatus, StateSnapshot};
use crate::processor::{Command, ProcessorHandle};
use crate::state::ProcessorEvent;
use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;

pub const HELP_TEXT: &str = "\
Commands:
  front | back | scan <front|back>   Scan one side
  configure                          Choose a NAPS2 installation
  use                                Use the suggested installation
  use <portable-root>                Use a portable NAPS2 folder (containing App and Data)
  use <app-dir> <data-dir>           Use a standard NAPS2 install
  install                            Download and install NAPS2 portable
  disable                            Stop asking about NAPS2
  profiles                           Choose front/back scan profiles
  set-profiles <front> <back>        Use the named profiles
  reload                             Re-read configuration
  help                               Show this text
  quit                               Exit";

/// How the console session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleOutcome {
    Finished,
    Crashed(String),
}

/// A parsed line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Submit(Command),
    AcceptCandidate,
    Help,
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command '{0}' (type 'help' for a list)")]
    UnknownCommand(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Unterminated quote")]
    UnterminatedQuote,
}

/// Split a line on whitespace, keeping double-quoted runs together.
pub fn tokenize(line: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_quotes {
        return Err(ParseError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parse one line of user input
pub fn parse_line(line: &str) -> Result<ConsoleInput, ParseError> {
    let tokens = tokenize(line)?;
    let Some((verb, args)) = tokens.split_first() else {
        return Ok(ConsoleInput::Empty);
    };

    let submit = |command: Command| -> Result<ConsoleInput, ParseError> {
        Ok(ConsoleInput::Submit(command))
    };
    let verb = verb.to_ascii_lowercase();
    match (verb.as_str(), args) {
        ("front", []) => submit(Command::Scan {
            side: ScanSide::Front,
        }),
        ("back", []) => submit(Command::Scan {
            side: ScanSide::Back,
        }),
        ("scan", [side]) => match side.to_ascii_lowercase().as_str() {
            "front" => submit(Command::Scan {
                side: ScanSide::Front,
            }),
            "back" => submit(Command::Scan {
                side: ScanSide::Back,
            }),
            _ => Err(ParseError::Usage("scan <front|back>")),
        },
        ("scan", _) => Err(ParseError::Usage("scan <front|back>")),
        ("configure", []) => submit(Command::RequestConfigureInstallation),
        ("use", []) => Ok(ConsoleInput::AcceptCandidate),
        ("use", [root]) => {
            let root = camino::Utf8Path::new(root);
            submit(Command::SetInstallation(Installation::new(
                root.join("App"),
                root.join("Data"),
            )))
        }
        ("use", [app_dir, data_dir]) => submit(Command::SetInstallation(Installation::new(
            app_dir.as_str(),
            data_dir.as_str(),
        ))),
        ("use", _) => Err(ParseError::Usage("use [<portable-root> | <app-dir> <data-dir>]")),
        ("install", []) => submit(Command::AutoInstall),
        ("disable", []) => submit(Command::DisableIntegration),
        ("profiles", []) => submit(Command::RequestConfigureProfiles),
        ("set-profiles", [front, back]) => submit(Command::SetProfileConfig(ProfileConfig::new(
            front.as_str(),
            back.as_str(),
        ))),
        ("set-profiles", _) => Err(ParseError::Usage("set-profiles <front> <back>")),
        ("reload", []) => submit(Command::Bootstrap),
        ("help" | "?", _) => Ok(ConsoleInput::Help),
        ("quit" | "exit", []) => submit(Command::Exit),
        _ => Err(ParseError::UnknownCommand(tokens.join(" "))),
    }
}

/// One-line description of the session status
pub fn status_message(snapshot: &StateSnapshot) -> String {
    match snapshot.status {
        ScanStatus::Uninitialized => "NAPS2 is not configured".to_string(),
        ScanStatus::NoProfiles => match &snapshot.installation {
            Some(installation) => format!(
                "Using NAPS2 at {}; scan profiles not configured (type 'profiles')",
                installation.app_dir()
            ),
            None => "Scan profiles not configured".to_string(),
        },
        ScanStatus::ReadyToScan => match &snapshot.profile_config {
            Some(cfg) => format!(
                "Ready to scan (front: '{}', back: '{}')",
                cfg.front_profile_name(),
                cfg.back_profile_name()
            ),
            None => "Ready to scan".to_string(),
        },
        ScanStatus::Scanning => "Scanning...".to_string(),
    }
}

/// Text shown for an event
pub fn render_event(event: &ProcessorEvent) -> String {
    match event {
        ProcessorEvent::StateChanged(snapshot) => {
            format!("[{}] {}", snapshot.status, status_message(snapshot))
        }
        ProcessorEvent::PromptForInstallation { candidate } => match candidate {
            Some(installation) => format!(
                "Found a {} NAPS2 installation:\n  App:  {}\n  Data: {}\n\
                 Type 'use' to accept it, 'use <path>' for another one, 'install' to download \
                 NAPS2 portable, or 'disable' to stop asking.",
                if installation.is_portable() {
                    "portable"
                } else {
                    "standard"
                },
                installation.app_dir(),
                installation.data_dir()
            ),
            None => "No NAPS2 installation was found.\n\
                     Type 'install' to download NAPS2 portable, 'use <path>' to point at an \
                     existing copy, or 'disable' to stop asking."
                .to_string(),
        },
        ProcessorEvent::PromptForProfiles {
            installation,
            profile_config,
            profile_names,
            devices,
        } => {
            let mut lines = vec![format!("Scan profiles in {}:", installation.data_dir())];
            if profile_names.is_empty() {
                lines.push("  (none; create front and back profiles in NAPS2 first)".to_string());
            }
            for name in profile_names {
                let role = match profile_config {
                    Some(cfg) if cfg.front_profile_name() == name => " (front)",
                    Some(cfg) if cfg.back_profile_name() == name => " (back)",
                    _ => "",
                };
                lines.push(format!("  - {}{}", name, role));
            }
            if !devices.is_empty() {
                lines.push("Devices:".to_string());
                for device in devices {
                    lines.push(format!("  - {} [{}]", device.name, device.id));
                }
            }
            lines.push("Type 'set-profiles \"<front>\" \"<back>\"' to choose.".to_string());
            lines.join("\n")
        }
        ProcessorEvent::ScanCompleted { side, output_path } => {
            format!("Scanned {} side to {}", side, output_path)
        }
        ProcessorEvent::ScanFailed { side, reason } => {
            format!("Scan of {} side failed: {}", side, reason)
        }
        ProcessorEvent::Crashed(diagnostic) => {
            format!("FATAL: the scan session stopped unexpectedly: {}", diagnostic)
        }
        ProcessorEvent::Finished => "Goodbye.".to_string(),
    }
}

/// Terminal front-end for the scan session processor
///
/// Input is read on a background thread so a crash can end the session even
/// while stdin is blocked. Events are rendered on the thread calling [`run`].
///
/// [`run`]: ConsoleController::run
pub struct ConsoleController {
    handle: ProcessorHandle,
    events: broadcast::Receiver<ProcessorEvent>,
    candidate: Arc<Mutex<Option<Installation>>>,
}

impl ConsoleController {
    /// `events` should be subscribed before the processor is spawned so the
    /// startup events are not missed.
    pub fn new(handle: ProcessorHandle, events: broadcast::Receiver<ProcessorEvent>) -> Self {
        Self {
            handle,
            events,
            candidate: Arc::new(Mutex::new(None)),
        }
    }

    /// Read commands from `input` and print events until the processor stops.
    pub fn run<R>(mut self, input: R) -> Result<ConsoleOutcome>
    where
        R: BufRead + Send + 'static,
    {
        let handle = self.handle.clone();
        let candidate = Arc::clone(&self.candidate);
        std::thread::Builder::new()
            .name("fscan-input".to_string())
            .spawn(move || read_input(input, handle, candidate))
            .context("Failed to spawn input thread")?;

        println!("{} v{} - type 'help' for commands", crate::APP_NAME, crate::VERSION);

        loop {
            match self.events.blocking_recv() {
                Ok(event) => {
                    tracing::trace!("Event received: {:?}", event);
                    if let ProcessorEvent::PromptForInstallation { candidate } = &event {
                        *self.candidate.lock().unwrap() = candidate.clone();
                    }

                    println!("{}", render_event(&event));

                    match event {
                        ProcessorEvent::Finished => return Ok(ConsoleOutcome::Finished),
                        ProcessorEvent::Crashed(diagnostic) => {
                            return Ok(ConsoleOutcome::Crashed(diagnostic));
                        }
                        _ => {}
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Console lagged behind; {} events skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::debug!("Event channel closed");
                    return Ok(ConsoleOutcome::Finished);
                }
            }
        }
    }
}

fn read_input<R: BufRead>(
    input: R,
    handle: ProcessorHandle,
    candidate: Arc<Mutex<Option<Installation>>>,
) {
    tracing::debug!("Input thread started");

    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };

        let command = match parse_line(&line) {
            Ok(ConsoleInput::Submit(command)) => command,
            Ok(ConsoleInput::AcceptCandidate) => match candidate.lock().unwrap().clone() {
                Some(installation) => Command::SetInstallation(installation),
                None => {
                    println!("No suggested installation; use 'use <path>' or 'install'.");
                    continue;
                }
            },
            Ok(ConsoleInput::Help) => {
                println!("{}", HELP_TEXT);
                continue;
            }
            Ok(ConsoleInput::Empty) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        let is_exit = command == Command::Exit;
        if let Err(e) = handle.submit(command) {
            tracing::debug!("{}", e);
            return;
        }
        if is_exit {
            return;
        }
    }

    // End of input ends the session
    tracing::debug!("Input closed; exiting");
    handle.exit().ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ScanDevice;

    #[test]
    fn test_tokenize_quotes() {
        assert_eq!(
            tokenize(r#"set-profiles "Front Scan" Back"#).unwrap(),
            vec!["set-profiles", "Front Scan", "Back"]
        );
        assert_eq!(tokenize("  ").unwrap(), Vec::<String>::new());
        assert_eq!(tokenize(r#"use """#).unwrap(), vec!["use", ""]);
        assert_eq!(
            tokenize(r#"use "C:\NAPS2"#),
            Err(ParseError::UnterminatedQuote)
        );
    }

    #[test]
    fn test_parse_scan_commands() {
        let front = ConsoleInput::Submit(Command::Scan {
            side: ScanSide::Front,
        });
        assert_eq!(parse_line("front").unwrap(), front);
        assert_eq!(parse_line("SCAN Front").unwrap(), front);
        assert_eq!(
            parse_line("back").unwrap(),
            ConsoleInput::Submit(Command::Scan {
                side: ScanSide::Back
            })
        );
        assert!(matches!(parse_line("scan sideways"), Err(ParseError::Usage(_))));
    }

    #[test]
    fn test_parse_use() {
        assert_eq!(parse_line("use").unwrap(), ConsoleInput::AcceptCandidate);
        assert_eq!(
            parse_line(r#"use "C:/Tools/naps2""#).unwrap(),
            ConsoleInput::Submit(Command::SetInstallation(Installation::new(
                "C:/Tools/naps2/App",
                "C:/Tools/naps2/Data"
            )))
        );
        assert_eq!(
            parse_line(r#"use "C:/Program Files/NAPS2" C:/Users/me/AppData/Roaming/NAPS2"#)
                .unwrap(),
            ConsoleInput::Submit(Command::SetInstallation(Installation::new(
                "C:/Program Files/NAPS2",
                "C:/Users/me/AppData/Roaming/NAPS2"
            )))
        );
    }

    #[test]
    fn test_parse_other_commands() {
        assert_eq!(
            parse_line(r#"set-profiles "Front Scan" "Back Scan""#).unwrap(),
            ConsoleInput::Submit(Command::SetProfileConfig(ProfileConfig::new(
                "Front Scan",
                "Back Scan"
            )))
        );
        assert_eq!(
            parse_line("install").unwrap(),
            ConsoleInput::Submit(Command::AutoInstall)
        );
        assert_eq!(
            parse_line("quit").unwrap(),
            ConsoleInput::Submit(Command::Exit)
        );
        assert_eq!(parse_line("").unwrap(), ConsoleInput::Empty);
        assert_eq!(parse_line("help").unwrap(), ConsoleInput::Help);
        assert_eq!(
            parse_line("frobnicate now"),
            Err(ParseError::UnknownCommand("frobnicate now".to_string()))
        );
        assert!(matches!(parse_line("set-profiles OnlyOne"), Err(ParseError::Usage(_))));
    }

    #[test]
    fn test_status_messages() {
        let installation = Installation::new("C:/naps2/App", "C:/naps2/Data");
        let cfg = ProfileConfig::new("FrontScan", "BackScan");

        let ready = StateSnapshot {
            status: ScanStatus::ReadyToScan,
            installation: Some(installation.clone()),
            profile_config: Some(cfg),
        };
        assert_eq!(
            status_message(&ready),
            "Ready to scan (front: 'FrontScan', back: 'BackScan')"
        );

        let no_profiles = StateSnapshot {
            status: ScanStatus::NoProfiles,
            installation: Some(installation),
            profile_config: None,
        };
        assert!(status_message(&no_profiles).contains("C:/naps2/App"));
    }

    #[test]
    fn test_render_profile_prompt_marks_selection() {
        let event = ProcessorEvent::PromptForProfiles {
            installation: Installation::new("C:/naps2/App", "C:/naps2/Data"),
            profile_config: Some(ProfileConfig::new("FrontScan", "BackScan")),
            profile_names: vec!["BackScan".to_string(), "FrontScan".to_string()],
            devices: vec![ScanDevice {
                id: "dev-1".to_string(),
                name: "Canon DR-C225".to_string(),
            }],
        };

        let text = render_event(&event);
        assert!(text.contains("- BackScan (back)"));
        assert!(text.contains("- FrontScan (front)"));
        assert!(text.contains("Canon DR-C225 [dev-1]"));
    }

    #[test]
    fn test_render_install_prompt_without_candidate() {
        let text = render_event(&ProcessorEvent::PromptForInstallation { candidate: None });
        assert!(text.contains("No NAPS2 installation was found"));
    }
}
