//! Terminal side of the monitor: key commands in, notices out.

use std::io::BufRead;
use std::sync::mpsc::Sender;
use std::thread;

use loopback_core::{LoopbackDelegate, LoopbackError, LoopbackState, Notification, SessionReport};

/// A command typed at the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start or stop recording.
    Toggle,
    Quit,
}

impl Command {
    /// `q`/`quit` quits; any other line (including an empty one) toggles.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "q" | "quit" => Self::Quit,
            _ => Self::Toggle,
        }
    }
}

/// Forward stdin lines as commands until `Quit`, EOF, or the receiver goes away.
pub fn spawn_stdin_reader(commands: Sender<Command>) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("stdin-commands".into()).spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let command = match line {
                Ok(line) => Command::parse(&line),
                Err(e) => {
                    log::warn!("stdin read failed: {}", e);
                    return;
                }
            };
            if commands.send(command).is_err() || command == Command::Quit {
                return;
            }
        }
        log::debug!("stdin closed");
    })
}

/// Prints notifications to the terminal and logs state changes.
pub struct ConsoleDelegate;

impl LoopbackDelegate for ConsoleDelegate {
    fn on_state_changed(&self, state: &LoopbackState) {
        log::info!("state: {}", state.name());
    }

    fn on_notification(&self, notification: Notification) {
        println!("{}", notification.message());
    }

    fn on_error(&self, error: &LoopbackError) {
        log::error!("loopback failed: {}", error);
        eprintln!("loopback failed: {} (press Enter to reset)", error);
    }

    fn on_session_finished(&self, report: &SessionReport) {
        log::info!(
            "session {}: {:.1}s, {} bytes ({:.1}s of audio) forwarded, {} snapshots plotted",
            report.id,
            report.duration_secs,
            report.bytes_forwarded,
            report.forwarded_secs(),
            report.snapshots_forwarded
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse(""), Command::Toggle);
        assert_eq!(Command::parse("  \n"), Command::Toggle);
        assert_eq!(Command::parse("q"), Command::Quit);
        assert_eq!(Command::parse(" quit "), Command::Quit);
        assert_eq!(Command::parse("x"), Command::Toggle);
    }
}
