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

//! Server configuration
//!
//! # Example
//!
//! ```
//! use tokenline_service::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::default()
//!     .with_max_sessions(2)
//!     .with_session_duration(Duration::from_secs(5))
//!     .with_inactivity_timeout(Duration::from_secs(3));
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::ConfigError;
use std::net::SocketAddr;
use std::time::Duration;

/// Server configuration
///
/// Use the builder pattern methods to customize the configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrently registered sessions
    pub max_sessions: usize,

    /// Hard cap on a session's lifetime, measured from the handshake
    ///
    /// Client activity never extends this deadline.
    pub session_duration: Duration,

    /// Sliding idle window, restarted by every command line
    pub inactivity_timeout: Duration,

    /// How long a new connection may take to send `CONNECT`
    pub handshake_timeout: Duration,

    /// Upper bound on a single line write
    pub write_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 7878)),
            max_sessions: 10,
            session_duration: Duration::from_secs(300),
            inactivity_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration bound to the given address
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn with_bind_address(mut self, bind_address: SocketAddr) -> Self {
        self.bind_address = bind_address;
        self
    }

    /// Set the maximum number of concurrent sessions
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the absolute session duration
    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    /// Set the inactivity timeout
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    /// Set the handshake timeout
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid {
                field: "max_sessions",
                reason: "must be greater than zero",
            });
        }
        // Both limits are advertised in whole seconds
        if !is_whole_seconds(self.session_duration) {
            return Err(ConfigError::Invalid {
                field: "session_duration",
                reason: "must be a whole number of seconds, at least one",
            });
        }
        if !is_whole_seconds(self.inactivity_timeout) {
            return Err(ConfigError::Invalid {
                field: "inactivity_timeout",
                reason: "must be a whole number of seconds, at least one",
            });
        }
        if self.handshake_timeout.is_zero() || self.write_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "timeouts",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

fn is_whole_seconds(duration: Duration) -> bool {
    duration.as_secs() >= 1 && duration.subsec_nanos() == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_address.port(), 7878);
        assert_eq!(config.max_sessions, 10);
        assert_eq!(config.session_duration, Duration::from_secs(300));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::new("0.0.0.0:4000".parse().unwrap())
            .with_max_sessions(2)
            .with_session_duration(Duration::from_secs(5))
            .with_inactivity_timeout(Duration::from_secs(3))
            .with_handshake_timeout(Duration::from_secs(1))
            .with_write_timeout(Duration::from_millis(500));

        assert_eq!(config.bind_address.port(), 4000);
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.session_duration, Duration::from_secs(5));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(3));
        assert_eq!(config.handshake_timeout, Duration::from_secs(1));
        assert_eq!(config.write_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let err = ServerConfig::default()
            .with_max_sessions(0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_sessions",
                ..
            }
        ));

        assert!(
            ServerConfig::default()
                .with_session_duration(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(
            ServerConfig::default()
                .with_inactivity_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_validate_rejects_fractional_limits() {
        let err = ServerConfig::default()
            .with_session_duration(Duration::from_millis(500))
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "session_duration",
                ..
            }
        ));

        let err = ServerConfig::default()
            .with_inactivity_timeout(Duration::from_millis(1500))
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "inactivity_timeout",
                ..
            }
        ));

        assert!(
            ServerConfig::default()
                .with_session_duration(Duration::from_secs(1))
                .with_inactivity_timeout(Duration::from_secs(1))
                .validate()
                .is_ok()
        );
    }
}
