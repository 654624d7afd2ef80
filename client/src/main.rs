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


//! Tokenline session broker client
//!
//! Holds one session open until the server ends it or Ctrl-C is pressed.

mod cli;

use async_trait::async_trait;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tokenline_client::{
    ClientError, ClientExit, DisconnectReason, SessionClient, SessionGrant, SessionHandler,
    SessionToken,
};
use tokio::signal::ctrl_c;
use tracing_subscriber::EnvFilter;

/// Prints session events
struct PrintHandler;

#[async_trait]
impl SessionHandler for PrintHandler {
    async fn on_connected(&self, grant: &SessionGrant) {
        println!(
            "Connected: {} (session {}s, idle {}s)",
            grant.token,
            grant.session_duration.as_secs(),
            grant.inactivity_timeout.as_secs()
        );
    }

    async fn on_renewed(&self, token: SessionToken) {
        println!("Renewed: {}", token);
    }

    async fn on_error(&self, error: &ClientError) {
        // Fatal errors are reported once the session returns
        if error.is_recoverable() {
            eprintln!("warning: {}", error);
        }
    }

    async fn on_disconnect(&self, reason: DisconnectReason) {
        println!("Disconnected: {}", reason);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let client = SessionClient::new(args.to_config());
    let cancel = client.cancellation_token();
    tokio::spawn(async move {
        if ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            cancel.cancel();
        }
    });

    match client.connect(Arc::new(PrintHandler)).await {
        Ok(ClientExit::Disconnected(_)) | Ok(ClientExit::Cancelled) => ExitCode::SUCCESS,
        Err(ClientError::Rejected(reason)) => {
            eprintln!("error: server rejected the connection: {}", reason);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
