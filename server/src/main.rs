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

//! Tokenline session broker server
//!
//! Serves the session protocol on TCP and reads operator commands from
//! stdin. Stops on `exit` or Ctrl-C.

mod cli;

use async_trait::async_trait;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokenline_service::{
    AdminConsole, ConsoleExit, DisconnectReason, SessionInfo, SessionObserver, SessionServer,
};
use tokio::io::BufReader;
use tokio::signal::ctrl_c;
use tracing_subscriber::EnvFilter;

/// Prints session arrivals and departures for the operator
struct ConsoleObserver;

#[async_trait]
impl SessionObserver for ConsoleObserver {
    async fn on_session_opened(&self, info: &SessionInfo) {
        println!("+ {} {} from {}", info.id, info.token, info.remote_address);
    }

    async fn on_session_closed(&self, info: &SessionInfo, reason: DisconnectReason) {
        println!("- {} {} ({})", info.id, info.token, reason);
    }
}

fn main() -> ExitCode {
    let args = cli::Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("error: failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = runtime.block_on(run(args));
    // A pending stdin read holds a blocking thread that never finishes
    runtime.shutdown_timeout(Duration::from_millis(250));
    code
}

async fn run(args: cli::Args) -> ExitCode {
    let config = match args.to_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let server = match SessionServer::new(config).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = server.start(Arc::new(ConsoleObserver)).await {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }
    println!("Listening on {}", server.bind_address());

    let mut console = AdminConsole::new(
        server.manager(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    );
    let exit = tokio::select! {
        exit = console.run() => exit,
        _ = ctrl_c() => {
            tracing::info!("Interrupt received");
            Ok(ConsoleExit::ServerStopped)
        }
    };

    match exit {
        Ok(ConsoleExit::InputClosed) => {
            tracing::info!("Console closed; serving until interrupted");
            tokio::select! {
                _ = ctrl_c() => tracing::info!("Interrupt received"),
                _ = server.stopped() => {}
            }
        }
        Ok(exit) => tracing::debug!(?exit, "Console stopped"),
        Err(e) => tracing::error!("Console failed: {}", e),
    }

    if let Err(e) = server.shutdown().await {
        tracing::warn!("Shutdown: {}", e);
    }
    ExitCode::SUCCESS
}
