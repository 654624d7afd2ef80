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

//! Core types for the session broker

use chrono::{DateTime, Local};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Stable identity of a session (monotonically increasing, never reused)
///
/// Unlike the [`SessionToken`], this never changes for the life of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new session ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the underlying u64 value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Opaque rotating session token handed to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(Uuid);

impl SessionToken {
    /// Generate a fresh random token
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.as_hyphenated().fmt(f)
    }
}

impl FromStr for SessionToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Session lifecycle state (stored as atomic u8 for lock-free state management)
///
/// A session only exists once the handshake succeeded, so it starts `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Registered and processing commands
    Active = 0,
    /// Teardown in progress
    Closing = 1,
    /// Teardown complete
    Closed = 2,
}

impl SessionState {
    /// Convert from u8 (for atomic operations)
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Active,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Convert to u8 (for atomic operations)
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    /// The absolute session duration elapsed
    SessionExpired,
    /// No command arrived within the inactivity window
    InactivityTimeout,
    /// An operator kicked the session from the console
    AdminKick,
    /// The server is shutting down
    ServerShutdown,
    /// The client closed its end of the connection
    ClientClosed,
    /// Reading or writing the connection failed
    TransportError,
}

impl DisconnectReason {
    /// Number of distinct reasons
    pub const COUNT: usize = 6;

    /// All reasons, in a stable order
    pub const ALL: [DisconnectReason; Self::COUNT] = [
        Self::SessionExpired,
        Self::InactivityTimeout,
        Self::AdminKick,
        Self::ServerShutdown,
        Self::ClientClosed,
        Self::TransportError,
    ];

    /// Whether the server tells the client about this termination with a
    /// `DISCONNECT` line before closing.
    pub fn notifies_client(self) -> bool {
        matches!(
            self,
            Self::SessionExpired | Self::InactivityTimeout | Self::AdminKick | Self::ServerShutdown
        )
    }

    /// Wire and metrics label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionExpired => "SessionExpired",
            Self::InactivityTimeout => "InactivityTimeout",
            Self::AdminKick => "AdminKick",
            Self::ServerShutdown => "ServerShutdown",
            Self::ClientClosed => "ClientClosed",
            Self::TransportError => "TransportError",
        }
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisconnectReason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or(())
    }
}

/// Point-in-time copy of a session, safe to hold without any lock
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Stable session identity
    pub id: SessionId,
    /// Token at the time of the snapshot
    pub token: SessionToken,
    /// Peer address
    pub remote_address: SocketAddr,
    /// Wall-clock handshake time
    pub connected_at: DateTime<Local>,
    /// Wall-clock time of the most recent command line
    pub last_activity_at: DateTime<Local>,
    /// Time since the handshake
    pub elapsed: Duration,
    /// Time since the most recent command line
    pub idle: Duration,
}

/// Server snapshot for non-blocking debug information
#[derive(Debug, Clone)]
pub struct ServerSnapshot {
    /// Number of registered sessions
    pub active_sessions: usize,
    /// Total sessions opened since server start
    pub total_sessions: u64,
    /// Server bind address
    pub bind_address: SocketAddr,
    /// Server uptime
    pub uptime: Duration,
}

impl fmt::Display for ServerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionServer {{ active: {}, total: {}, addr: {}, uptime: {:?} }}",
            self.active_sessions, self.total_sessions, self.bind_address, self.uptime
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id() {
        let id1 = SessionId::new(1);
        let id2 = SessionId::new(2);

        assert_eq!(id1.as_u64(), 1);
        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert_eq!(id2.to_string(), "session-2");
    }

    #[test]
    fn test_token_text_form() {
        let token = SessionToken::generate();
        let text = token.to_string();

        assert_eq!(text.len(), 36);
        assert!(!text.contains(char::is_whitespace));
        assert_eq!(text.parse::<SessionToken>().unwrap(), token);
        assert!("not-a-token".parse::<SessionToken>().is_err());
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = SessionToken::generate();
        let b = SessionToken::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_session_state_conversion() {
        for state in [
            SessionState::Active,
            SessionState::Closing,
            SessionState::Closed,
        ] {
            assert_eq!(SessionState::from_u8(state.as_u8()), state);
        }
        assert_eq!(SessionState::from_u8(7), SessionState::Closed);
    }

    #[test]
    fn test_disconnect_reason_notice() {
        assert!(DisconnectReason::SessionExpired.notifies_client());
        assert!(DisconnectReason::AdminKick.notifies_client());
        assert!(!DisconnectReason::ClientClosed.notifies_client());
        assert!(!DisconnectReason::TransportError.notifies_client());
        assert_eq!(
            "InactivityTimeout".parse::<DisconnectReason>(),
            Ok(DisconnectReason::InactivityTimeout)
        );
        assert!("Whatever".parse::<DisconnectReason>().is_err());
    }
}
