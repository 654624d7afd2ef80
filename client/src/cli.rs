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
use std::time::Duration;
use tokenline_client::ClientConfig;

/// Client for the tokenline session broker
#[derive(Debug, Parser)]
#[command(name = "tokenline-client")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = 7878)]
    pub port: u16,

    /// Seconds between heartbeats (default: half the inactivity timeout)
    #[arg(long, value_name = "SECS")]
    pub heartbeat: Option<u64>,

    /// Seconds between renewals (default: half the session duration)
    #[arg(long, value_name = "SECS")]
    pub renew: Option<u64>,

    /// Seconds allowed to connect and complete the handshake
    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn to_config(&self) -> ClientConfig {
        ClientConfig::new(self.host.clone(), self.port)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_heartbeat_interval(self.heartbeat.map(Duration::from_secs))
            .with_renew_interval(self.renew.map(Duration::from_secs))
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
        let config = Args::parse_from(["tokenline-client"]).to_config();
        assert_eq!(config.address(), "127.0.0.1:7878");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, None);
        assert_eq!(config.renew_interval, None);
    }

    #[test]
    fn test_intervals() {
        let config = Args::parse_from([
            "tokenline-client",
            "--host",
            "broker",
            "-p",
            "9000",
            "--heartbeat",
            "2",
            "--renew",
            "4",
        ])
        .to_config();
        assert_eq!(config.address(), "broker:9000");
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(2)));
        assert_eq!(config.renew_interval, Some(Duration::from_secs(4)));
    }
}
