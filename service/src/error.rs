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

//! Error types for the session broker

use crate::types::SessionToken;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Result type for operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session broker error types
#[derive(Debug, Error)]
pub enum SessionError {
    /// I/O error from the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error from the line codec (overlong line, invalid UTF-8)
    #[error("Codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// The registry already holds the maximum number of sessions
    #[error("Maximum sessions ({0}) reached")]
    CapacityExceeded(usize),

    /// A token collided with one already registered
    #[error("Token already registered")]
    DuplicateToken,

    /// No session is registered under the token
    #[error("Session {0} not found")]
    SessionNotFound(SessionToken),

    /// The session has already been torn down
    #[error("Session closed")]
    SessionClosed,

    /// The server is shutting down and accepts no new sessions
    #[error("Server is shutting down")]
    ShuttingDown,

    /// The server was started twice
    #[error("Server already running")]
    ServerAlreadyRunning,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,

    /// A client sent a bad command
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The server configuration was rejected
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// Check if the error came from the transport rather than the protocol
    ///
    /// Transport errors tear the connection down without notifying the client.
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            SessionError::Io(_) | SessionError::Codec(_) | SessionError::Timeout
        )
    }
}

/// A client command that is understood but not acceptable
///
/// The `Display` form is the reason text sent in `ERROR <reason>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Token argument does not match the session's current token
    #[error("Invalid code")]
    InvalidCode,
    /// Token argument is missing
    #[error("Missing code")]
    MissingCode,
    /// The verb is not recognized
    #[error("Unknown command")]
    UnknownCommand,
    /// The first line was not `CONNECT`
    #[error("Expected CONNECT")]
    ExpectedConnect,
}

/// Invalid startup configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field has a value the server cannot run with
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Configuration field name
        field: &'static str,
        /// What is wrong with it
        reason: &'static str,
    },
}
