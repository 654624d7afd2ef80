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

//! Line protocol spoken between broker and client
//!
//! Every message is one newline-terminated line of whitespace-delimited
//! ASCII words.
//!
//! ```text
//! client                         server
//!   CONNECT                 ->
//!                           <-   CONNECTED <token> <session-secs> <idle-secs>
//!   STATUS <token>          ->
//!                           <-   ACTIVE
//!   RENEW <token>           ->
//!                           <-   RENEWED <new-token>
//!                           <-   DISCONNECT <reason>
//! ```

use crate::{DisconnectReason, ProtocolError, SessionToken};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Longest line either side accepts, in bytes
pub const MAX_LINE_LENGTH: usize = 1024;

/// A line sent by the client, parsed loosely
///
/// Token arguments are kept as text; whether they match the session is the
/// session manager's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `CONNECT`
    Connect,
    /// `RENEW <token>`
    Renew(Option<String>),
    /// `STATUS <token>`
    Status(Option<String>),
    /// Anything else
    Unknown,
}

impl ClientCommand {
    /// Parse one line. Verbs are matched ASCII case-insensitively.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Self::Unknown;
        };
        let argument = words.next().map(str::to_string);
        if words.next().is_some() {
            return Self::Unknown;
        }

        if verb.eq_ignore_ascii_case("CONNECT") {
            match argument {
                None => Self::Connect,
                Some(_) => Self::Unknown,
            }
        } else if verb.eq_ignore_ascii_case("RENEW") {
            Self::Renew(argument)
        } else if verb.eq_ignore_ascii_case("STATUS") {
            Self::Status(argument)
        } else {
            Self::Unknown
        }
    }

    /// Build a `RENEW` for the given token
    pub fn renew(token: SessionToken) -> Self {
        Self::Renew(Some(token.to_string()))
    }

    /// Build a `STATUS` for the given token
    pub fn status(token: SessionToken) -> Self {
        Self::Status(Some(token.to_string()))
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn with_arg(f: &mut fmt::Formatter<'_>, verb: &str, arg: &Option<String>) -> fmt::Result {
            match arg {
                Some(arg) => write!(f, "{} {}", verb, arg),
                None => f.write_str(verb),
            }
        }

        match self {
            Self::Connect => f.write_str("CONNECT"),
            Self::Renew(arg) => with_arg(f, "RENEW", arg),
            Self::Status(arg) => with_arg(f, "STATUS", arg),
            Self::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// Why a handshake was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The registry is at capacity
    ServerFull,
    /// The server is shutting down
    ShuttingDown,
}

impl RejectReason {
    /// Wire label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerFull => "ServerFull",
            Self::ShuttingDown => "ShuttingDown",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A line sent by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerReply {
    /// Handshake accepted
    Connected {
        /// Token to present in later commands
        token: SessionToken,
        /// Absolute session duration in whole seconds
        session_duration_secs: u64,
        /// Inactivity timeout in whole seconds
        inactivity_timeout_secs: u64,
    },
    /// Handshake refused
    Rejected(RejectReason),
    /// Renewal accepted
    Renewed(SessionToken),
    /// Heartbeat acknowledged
    Active,
    /// Command refused, connection stays open
    Error(ProtocolError),
    /// Server is closing the connection
    Disconnect(DisconnectReason),
}

impl fmt::Display for ServerReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected {
                token,
                session_duration_secs,
                inactivity_timeout_secs,
            } => write!(
                f,
                "CONNECTED {} {} {}",
                token, session_duration_secs, inactivity_timeout_secs
            ),
            Self::Rejected(reason) => write!(f, "REJECTED {}", reason),
            Self::Renewed(token) => write!(f, "RENEWED {}", token),
            Self::Active => f.write_str("ACTIVE"),
            Self::Error(error) => write!(f, "ERROR {}", error),
            Self::Disconnect(reason) => write!(f, "DISCONNECT {}", reason),
        }
    }
}

/// A server line the client could not make sense of
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized server reply: {0:?}")]
pub struct ReplyParseError(pub String);

impl FromStr for ServerReply {
    type Err = ReplyParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fail = || ReplyParseError(line.to_string());
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let words: Vec<&str> = rest.split_whitespace().collect();

        match verb {
            "CONNECTED" => match words.as_slice() {
                [token, session, idle] => Ok(Self::Connected {
                    token: token.parse().map_err(|_| fail())?,
                    session_duration_secs: session.parse().map_err(|_| fail())?,
                    inactivity_timeout_secs: idle.parse().map_err(|_| fail())?,
                }),
                _ => Err(fail()),
            },
            "REJECTED" => match rest {
                "ServerFull" => Ok(Self::Rejected(RejectReason::ServerFull)),
                "ShuttingDown" => Ok(Self::Rejected(RejectReason::ShuttingDown)),
                _ => Err(fail()),
            },
            "RENEWED" => match words.as_slice() {
                [token] => Ok(Self::Renewed(token.parse().map_err(|_| fail())?)),
                _ => Err(fail()),
            },
            "ACTIVE" if rest.is_empty() => Ok(Self::Active),
            // Reasons carry spaces, so match the whole remainder.
            "ERROR" => [
                ProtocolError::InvalidCode,
                ProtocolError::MissingCode,
                ProtocolError::UnknownCommand,
                ProtocolError::ExpectedConnect,
            ]
            .into_iter()
            .find(|error| error.to_string() == rest)
            .map(Self::Error)
            .ok_or_else(fail),
            "DISCONNECT" => rest.parse().map(Self::Disconnect).map_err(|_| fail()),
            _ => Err(fail()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ClientCommand::parse("CONNECT"), ClientCommand::Connect);
        assert_eq!(ClientCommand::parse("  connect \r"), ClientCommand::Connect);
        assert_eq!(
            ClientCommand::parse("RENEW abc"),
            ClientCommand::Renew(Some("abc".to_string()))
        );
        assert_eq!(ClientCommand::parse("RENEW"), ClientCommand::Renew(None));
        assert_eq!(
            ClientCommand::parse("status   xyz"),
            ClientCommand::Status(Some("xyz".to_string()))
        );
        assert_eq!(ClientCommand::parse("STATUS"), ClientCommand::Status(None));
    }

    #[test]
    fn test_parse_unknown_commands() {
        assert_eq!(ClientCommand::parse(""), ClientCommand::Unknown);
        assert_eq!(ClientCommand::parse("   "), ClientCommand::Unknown);
        assert_eq!(ClientCommand::parse("HELLO"), ClientCommand::Unknown);
        assert_eq!(ClientCommand::parse("CONNECT now"), ClientCommand::Unknown);
        assert_eq!(ClientCommand::parse("RENEW a b"), ClientCommand::Unknown);
    }

    #[test]
    fn test_command_display() {
        let token = SessionToken::generate();
        assert_eq!(ClientCommand::Connect.to_string(), "CONNECT");
        assert_eq!(
            ClientCommand::renew(token).to_string(),
            format!("RENEW {}", token)
        );
        assert_eq!(
            ClientCommand::status(token).to_string(),
            format!("STATUS {}", token)
        );
    }

    #[test]
    fn test_reply_wire_format() {
        let token = SessionToken::generate();
        let connected = ServerReply::Connected {
            token,
            session_duration_secs: 5,
            inactivity_timeout_secs: 3,
        };
        assert_eq!(connected.to_string(), format!("CONNECTED {} 5 3", token));
        assert_eq!(
            ServerReply::Error(ProtocolError::InvalidCode).to_string(),
            "ERROR Invalid code"
        );
        assert_eq!(
            ServerReply::Disconnect(DisconnectReason::AdminKick).to_string(),
            "DISCONNECT AdminKick"
        );
        assert_eq!(
            ServerReply::Rejected(RejectReason::ServerFull).to_string(),
            "REJECTED ServerFull"
        );
        assert_eq!(ServerReply::Active.to_string(), "ACTIVE");
    }

    #[test]
    fn test_reply_parse() {
        let token = SessionToken::generate();
        let line = format!("CONNECTED {} 300 60", token);
        assert_eq!(
            line.parse::<ServerReply>().unwrap(),
            ServerReply::Connected {
                token,
                session_duration_secs: 300,
                inactivity_timeout_secs: 60,
            }
        );
        assert_eq!(
            "ERROR Unknown command".parse::<ServerReply>().unwrap(),
            ServerReply::Error(ProtocolError::UnknownCommand)
        );
        assert_eq!(
            "DISCONNECT SessionExpired".parse::<ServerReply>().unwrap(),
            ServerReply::Disconnect(DisconnectReason::SessionExpired)
        );
        assert_eq!("ACTIVE".parse::<ServerReply>().unwrap(), ServerReply::Active);
    }

    #[test]
    fn test_reply_parse_rejects_garbage() {
        assert!("CONNECTED nope 1 2".parse::<ServerReply>().is_err());
        assert!("RENEWED".parse::<ServerReply>().is_err());
        assert!("ERROR Something odd".parse::<ServerReply>().is_err());
        assert!("HELLO".parse::<ServerReply>().is_err());
        assert!("ACTIVE now".parse::<ServerReply>().is_err());
    }
}
