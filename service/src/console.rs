//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Operator console
//!
//! Reads one command per line from an input stream and writes results to an
//! output stream. The server binary wires it to stdin and stdout.
//!
//! | Command         | Effect                                      |
//! |-----------------|---------------------------------------------|
//! | `list`          | Print every registered session              |
//! | `kick <token>`  | Tear a session down with `AdminKick`        |
//! | `stats`         | Print server counters                       |
//! | `help`          | Print the command list                      |
//! | `exit`          | Shut the server down and stop the console   |

use crate::{
    DisconnectReason, ProtocolError, Result, SessionError, SessionInfo, SessionManager,
    SessionToken,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{info, warn};

const USAGE: &str = "\
Commands:
  list           list active sessions
  kick <token>   disconnect a session
  stats          show server counters
  help           show this message
  exit           shut down the server
";

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `list`
    List,
    /// `kick <token>`; `None` when the argument is missing
    Kick(Option<String>),
    /// `stats`
    Stats,
    /// `help`
    Help,
    /// `exit`
    Exit,
    /// Blank line
    Empty,
    /// Anything else
    Unknown(String),
}

impl ConsoleCommand {
    /// Parse one console line
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Self::Empty;
        };
        match verb.to_ascii_lowercase().as_str() {
            "list" => Self::List,
            "kick" => Self::Kick(words.next().map(str::to_string)),
            "stats" => Self::Stats,
            "help" | "?" => Self::Help,
            "exit" | "quit" => Self::Exit,
            _ => Self::Unknown(verb.to_string()),
        }
    }
}

/// Why the console stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator typed `exit`
    Shutdown,
    /// The input stream ended
    InputClosed,
    /// The server was shut down from elsewhere
    ServerStopped,
}

/// Single-reader operator console
pub struct AdminConsole<R, W> {
    manager: Arc<SessionManager>,
    input: Lines<R>,
    output: W,
}

impl<R, W> AdminConsole<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Create a console reading commands from `input`
    pub fn new(manager: Arc<SessionManager>, input: R, output: W) -> Self {
        Self {
            manager,
            input: input.lines(),
            output,
        }
    }

    /// Read and execute commands until `exit`, end of input, or shutdown
    pub async fn run(&mut self) -> Result<ConsoleExit> {
        let shutdown = self.manager.shutdown_signal();
        self.print("Admin console ready. Type 'help' for commands.\n")
            .await?;

        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(ConsoleExit::ServerStopped),
                line = self.input.next_line() => line?,
            };
            let Some(line) = line else {
                info!("Console input closed");
                return Ok(ConsoleExit::InputClosed);
            };
            if let Some(exit) = self.execute(&line).await? {
                return Ok(exit);
            }
        }
    }

    /// Execute one command line
    ///
    /// Returns `Some` when the console should stop.
    pub async fn execute(&mut self, line: &str) -> Result<Option<ConsoleExit>> {
        match ConsoleCommand::parse(line) {
            ConsoleCommand::List => self.list().await?,
            ConsoleCommand::Kick(Some(token)) => self.kick(&token).await?,
            ConsoleCommand::Kick(None) => self.print("Usage: kick <token>\n").await?,
            ConsoleCommand::Stats => self.stats().await?,
            ConsoleCommand::Help => self.print(USAGE).await?,
            ConsoleCommand::Exit => {
                let closed = self.manager.shutdown();
                info!(closed, "Shutdown requested from console");
                self.print(&format!("Shutting down: {} session(s) closed\n", closed))
                    .await?;
                return Ok(Some(ConsoleExit::Shutdown));
            }
            ConsoleCommand::Empty => {}
            ConsoleCommand::Unknown(verb) => {
                self.print(&format!("Unknown command: {}\n{}", verb, USAGE))
                    .await?
            }
        }
        Ok(None)
    }

    /// Give back the output stream
    pub fn into_output(self) -> W {
        self.output
    }

    async fn list(&mut self) -> Result<()> {
        let sessions = self.manager.list();
        if sessions.is_empty() {
            return self.print("No active sessions\n").await;
        }

        let mut text = format!(
            "{:<36}  {:<21}  {:<19}  {:>8}  {:<8}\n",
            "TOKEN", "REMOTE", "CONNECTED", "ELAPSED", "ACTIVE"
        );
        for info in &sessions {
            text.push_str(&format_row(info));
        }
        text.push_str(&format!(
            "{} of {} session(s)\n",
            sessions.len(),
            self.manager.capacity()
        ));
        self.print(&text).await
    }

    async fn kick(&mut self, argument: &str) -> Result<()> {
        let outcome = argument
            .parse::<SessionToken>()
            .map_err(|_| SessionError::Protocol(ProtocolError::InvalidCode))
            .and_then(|token| self.manager.kick(&token));
        match outcome {
            Ok(()) => {
                info!(token = %argument, "Session kicked from console");
                self.print(&format!("Session {} kicked\n", argument)).await
            }
            Err(e) => {
                warn!(token = %argument, error = %e, "Kick failed");
                self.print(&format!("Session {} not found\n", argument))
                    .await
            }
        }
    }

    async fn stats(&mut self) -> Result<()> {
        let stats = self.manager.metrics().snapshot();
        let mut text = format!(
            "Sessions: {} active / {} max, {} total, {} rejected\n\
             Lines: {} received, {} sent, {} protocol errors\n\
             Uptime: {}, average session {}\n\
             Disconnects:\n",
            self.manager.count(),
            self.manager.capacity(),
            stats.total_sessions,
            stats.rejected_sessions,
            stats.lines_received,
            stats.lines_sent,
            stats.protocol_errors,
            format_duration(stats.uptime),
            format_duration(stats.avg_session_duration),
        );
        for reason in DisconnectReason::ALL {
            text.push_str(&format!(
                "  {:<18} {}\n",
                reason.as_str(),
                stats.disconnects(reason)
            ));
        }
        self.print(&text).await
    }

    async fn print(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }
}

fn format_row(info: &SessionInfo) -> String {
    format!(
        "{:<36}  {:<21}  {:<19}  {:>8}  {:<8}\n",
        info.token.to_string(),
        info.remote_address.to_string(),
        info.connected_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        format_duration(info.elapsed),
        info.last_activity_at.format("%H:%M:%S").to_string(),
    )
}

/// `HH:MM:SS`
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ServerConfig, ServerMetrics};
    use tokio::io::BufReader;

    fn manager() -> Arc<SessionManager> {
        let config = ServerConfig::default().with_max_sessions(4);
        Arc::new(SessionManager::new(&config, Arc::new(ServerMetrics::new())))
    }

    async fn run_script(manager: &Arc<SessionManager>, script: &str) -> (ConsoleExit, String) {
        let mut console = AdminConsole::new(
            manager.clone(),
            BufReader::new(script.as_bytes()),
            Vec::new(),
        );
        let exit = console.run().await.unwrap();
        let output = String::from_utf8(console.into_output()).unwrap();
        (exit, output)
    }

    #[test]
    fn test_parse() {
        assert_eq!(ConsoleCommand::parse("list"), ConsoleCommand::List);
        assert_eq!(ConsoleCommand::parse("  LIST  "), ConsoleCommand::List);
        assert_eq!(
            ConsoleCommand::parse("kick abc"),
            ConsoleCommand::Kick(Some("abc".into()))
        );
        assert_eq!(ConsoleCommand::parse("kick"), ConsoleCommand::Kick(None));
        assert_eq!(ConsoleCommand::parse(""), ConsoleCommand::Empty);
        assert_eq!(
            ConsoleCommand::parse("reboot now"),
            ConsoleCommand::Unknown("reboot".into())
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
    }

    #[tokio::test]
    async fn test_list_empty_and_populated() {
        let manager = manager();
        let (exit, output) = run_script(&manager, "list\n").await;
        assert_eq!(exit, ConsoleExit::InputClosed);
        assert!(output.contains("No active sessions"));

        let session = manager.open("10.0.0.1:4444".parse().unwrap()).unwrap();
        let (_, output) = run_script(&manager, "list\n").await;
        assert!(output.contains(&session.token().to_string()));
        assert!(output.contains("10.0.0.1:4444"));
        assert!(output.contains("1 of 4 session(s)"));
    }

    #[tokio::test]
    async fn test_kick() {
        let manager = manager();
        let session = manager.open("10.0.0.1:4444".parse().unwrap()).unwrap();
        let token = session.token();

        let script = format!("kick {}\nkick {}\nkick nonsense\n", token, token);
        let (_, output) = run_script(&manager, &script).await;

        assert!(output.contains(&format!("Session {} kicked", token)));
        assert!(output.contains(&format!("Session {} not found", token)));
        assert!(output.contains("Session nonsense not found"));
        assert_eq!(session.teardown_reason(), Some(DisconnectReason::AdminKick));
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_command_prints_usage() {
        let manager = manager();
        let (_, output) = run_script(&manager, "frobnicate\nkick\n").await;
        assert!(output.contains("Unknown command: frobnicate"));
        assert!(output.contains("kick <token>"));
        assert!(output.contains("Usage: kick <token>"));
    }

    #[tokio::test]
    async fn test_stats() {
        let manager = manager();
        let session = manager.open("10.0.0.1:4444".parse().unwrap()).unwrap();
        manager.kick(&session.token()).unwrap();

        let (_, output) = run_script(&manager, "stats\n").await;
        assert!(output.contains("0 active / 4 max, 1 total"));
        assert!(output.contains(&format!("{:<18} {}", "AdminKick", 1)));
    }

    #[tokio::test]
    async fn test_exit_shuts_down() {
        let manager = manager();
        let session = manager.open("10.0.0.1:4444".parse().unwrap()).unwrap();

        let (exit, output) = run_script(&manager, "exit\nlist\n").await;
        assert_eq!(exit, ConsoleExit::Shutdown);
        assert!(output.contains("Shutting down: 1 session(s) closed"));
        assert!(!output.contains("No active sessions"));
        assert!(manager.is_shutting_down());
        assert_eq!(
            session.teardown_reason(),
            Some(DisconnectReason::ServerShutdown)
        );
    }

    #[tokio::test]
    async fn test_stops_when_server_stops() {
        let manager = manager();
        manager.shutdown();
        let (exit, _) = run_script(&manager, "list\n").await;
        assert_eq!(exit, ConsoleExit::ServerStopped);
    }
}
