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

//! Token Line Session Broker
//!
//! A TCP server that hands each client a rotating session token over a
//! newline-delimited text protocol and ends sessions on any of four
//! conditions: absolute session expiry, inactivity, operator kick, or server
//! shutdown.
//!
//! - Atomic capacity checks and token re-keying in the registry
//! - One armed timer pair per session; activity never extends the session
//! - Single-shot teardown, whichever trigger fires first
//! - Lock-free metrics and an operator console
//!
//! # Architecture
//!
//! ```text
//! SessionServer ── accept loop
//!     ↓
//! ConnectionWorker → LineConnection
//!     ↓
//! SessionManager → SessionRegistry
//!                → ExpiryScheduler
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tokenline_service::{SessionInfo, SessionObserver, ServerConfig, SessionServer};
//! use async_trait::async_trait;
//!
//! struct MyObserver;
//!
//! #[async_trait]
//! impl SessionObserver for MyObserver {
//!     async fn on_session_opened(&self, info: &SessionInfo) {
//!         println!("{} connected from {}", info.id, info.remote_address);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let server = SessionServer::new(config).await?;
//!     server.start(std::sync::Arc::new(MyObserver)).await?;
//!     server.stopped().await;
//!     server.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod config;
mod connection;
mod console;
mod error;
mod expiry;
mod handler;
mod manager;
mod metrics;
pub mod protocol;
mod registry;
mod server;
mod session;
mod types;
mod worker;

// Public API
pub use config::ServerConfig;
pub use connection::LineConnection;
pub use console::{AdminConsole, ConsoleCommand, ConsoleExit};
pub use error::{ConfigError, ProtocolError, Result, SessionError};
pub use expiry::{ExpireCallback, ExpiryHandle, ExpiryScheduler};
pub use handler::{CallbackObserver, NoopObserver, SessionObserver};
pub use manager::SessionManager;
pub use metrics::{MetricsSnapshot, ServerMetrics};
pub use protocol::{ClientCommand, MAX_LINE_LENGTH, RejectReason, ReplyParseError, ServerReply};
pub use registry::SessionRegistry;
pub use server::SessionServer;
pub use session::Session;
pub use types::{DisconnectReason, ServerSnapshot, SessionId, SessionInfo, SessionState, SessionToken};
pub use worker::ConnectionWorker;
