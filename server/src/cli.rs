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

//! Command line arguments

use clap::Parser;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokenline_service::{ConfigError, ServerConfig};

/// Line-oriented TCP session broker
#[derive(Debug, Parser)]
#[command(name = "tokenline-server")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = 7878)]
    pub port: u16,

    /// Maximum number of concurrent sessions
    #[arg(short, long, default_value_t = 10)]
    pub max_sessions: usize,

    /// Absolute session lifetime in seconds
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    pub session_duration: u64,

    /// Idle window in seconds
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub inactivity_timeout: u64,

    /// Time allowed for the CONNECT line, in seconds
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub handshake_timeout: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Build and validate the server configuration
    pub fn to_config(&self) -> Result<ServerConfig, ConfigError> {
        let config = ServerConfig::new(SocketAddr::new(self.bind, self.port))
            .with_max_sessions(self.max_sessions)
            .with_session_duration(Duration::from_secs(self.session_duration))
            .with_inactivity_timeout(Duration::from_secs(self.inactivity_timeout))
            .with_handshake_timeout(Duration::from_secs(self.handshake_timeout));
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["tokenline-server"]);
        let config = args.to_config().unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:7878".parse().unwrap());
        assert_eq!(config.max_sessions, 10);
        assert_eq!(config.session_duration, Duration::from_secs(300));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(60));
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let args = Args::parse_from([
            "tokenline-server",
            "--bind",
            "0.0.0.0",
            "--port",
            "9000",
            "--max-sessions",
            "2",
            "--session-duration",
            "5",
            "--inactivity-timeout",
            "3",
        ]);
        let config = args.to_config().unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.session_duration, Duration::from_secs(5));
        assert_eq!(config.inactivity_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_zero_values_rejected() {
        let args = Args::parse_from(["tokenline-server", "--max-sessions", "0"]);
        assert!(args.to_config().is_err());

        let args = Args::parse_from(["tokenline-server", "--inactivity-timeout", "0"]);
        assert!(args.to_config().is_err());
    }

    #[test]
    fn test_bad_port_is_a_parse_error() {
        assert!(Args::try_parse_from(["tokenline-server", "--port", "99999"]).is_err());
    }
}
