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


//! Client configuration

use std::time::Duration;

/// Shortest heartbeat or renewal period the client will use
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Session client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server hostname or IP address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Time allowed to open the socket and to receive the handshake reply
    pub connect_timeout: Duration,

    /// Bound on each line written to the server
    pub write_timeout: Duration,

    /// Period between `STATUS` heartbeats (None to derive from the server)
    pub heartbeat_interval: Option<Duration>,

    /// Period between `RENEW` requests (None to derive from the server)
    pub renew_interval: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            heartbeat_interval: None,
            renew_interval: None,
        }
    }
}

impl ClientConfig {
    /// Create a new client configuration with the given host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the write timeout
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set a fixed heartbeat period
    pub fn with_heartbeat_interval(mut self, interval: Option<Duration>) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set a fixed renewal period
    pub fn with_renew_interval(mut self, interval: Option<Duration>) -> Self {
        self.renew_interval = interval;
        self
    }

    /// Get the server address as a string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Heartbeat period for a server that allows `inactivity_timeout` of silence
    ///
    /// Defaults to half the timeout. Never below [`MIN_INTERVAL`].
    pub fn heartbeat_period(&self, inactivity_timeout: Duration) -> Duration {
        self.heartbeat_interval
            .unwrap_or(inactivity_timeout / 2)
            .max(MIN_INTERVAL)
    }

    /// Renewal period for a server that grants `session_duration`
    ///
    /// Defaults to half the duration. Never below [`MIN_INTERVAL`].
    pub fn renew_period(&self, session_duration: Duration) -> Duration {
        self.renew_interval
            .unwrap_or(session_duration / 2)
            .max(MIN_INTERVAL)
    }
}
