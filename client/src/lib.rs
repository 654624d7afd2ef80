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


//! # Tokenline Client
//!
//! Thin peer for the token line session broker. Performs the handshake,
//! keeps the session alive with periodic `STATUS` heartbeats, rotates its
//! token with periodic `RENEW` requests, and stops when the server sends
//! `DISCONNECT` or the caller cancels.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tokenline_client::{ClientConfig, SessionClient, SessionGrant, SessionHandler};
//! use tokenline_service::DisconnectReason;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl SessionHandler for MyHandler {
//!     async fn on_connected(&self, grant: &SessionGrant) {
//!         println!("Connected with {}", grant.token);
//!     }
//!
//!     async fn on_disconnect(&self, reason: DisconnectReason) {
//!         println!("Disconnected: {}", reason);
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("localhost", 7878);
//!     let client = SessionClient::new(config);
//!     let exit = client.connect(Arc::new(MyHandler)).await?;
//!     println!("{:?}", exit);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
mod handler;

pub use client::{ClientExit, SessionClient, SessionGrant};
pub use config::{ClientConfig, MIN_INTERVAL};
pub use error::{ClientError, Result};
pub use handler::{NoopHandler, SessionHandler};

// Re-export wire types handlers need
pub use tokenline_service::{DisconnectReason, ProtocolError, RejectReason, SessionToken};
