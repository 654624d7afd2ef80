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


//! Client error types

use std::io;
use thiserror::Error;
use tokenline_service::{ProtocolError, RejectReason, SessionError};
use tokio_util::codec::LinesCodecError;

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Framing error from the line codec
    #[error("Codec error: {0}")]
    Codec(#[from] LinesCodecError),

    /// Connection or handshake took too long
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// A write to the server took too long
    #[error("Write timeout")]
    WriteTimeout,

    /// The server refused the handshake
    #[error("Connection rejected: {0}")]
    Rejected(RejectReason),

    /// The server answered a command with `ERROR`
    #[error("Server error: {0}")]
    Server(ProtocolError),

    /// A line that does not fit the protocol at this point
    #[error("Unexpected reply: {0:?}")]
    UnexpectedReply(String),

    /// Connection closed by server without a `DISCONNECT`
    #[error("Connection closed by server")]
    ConnectionClosed,
}

impl ClientError {
    /// Check if the session survives this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Server(_) | Self::UnexpectedReply(_))
    }
}

impl From<SessionError> for ClientError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Io(e) => match e.kind() {
                io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
                    Self::ConnectionClosed
                }
                _ => Self::Io(e),
            },
            SessionError::Codec(e) => Self::Codec(e),
            SessionError::Timeout => Self::WriteTimeout,
            SessionError::Protocol(e) => Self::Server(e),
            other => Self::Io(io::Error::other(other)),
        }
    }
}
