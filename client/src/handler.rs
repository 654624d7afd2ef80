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


//! Client event handler trait

use crate::{ClientError, SessionGrant};
use async_trait::async_trait;
use tokenline_service::{DisconnectReason, SessionToken};

/// Client event handler trait
///
/// Implement this trait to follow a session from the client side. All
/// methods have default implementations that do nothing.
///
/// Once `on_connected` has been called, `on_closed` is called exactly once
/// when the session loop ends, whatever the cause.
///
/// # Example
///
/// ```no_run
/// use tokenline_client::{SessionGrant, SessionHandler};
/// use tokenline_service::DisconnectReason;
/// use async_trait::async_trait;
///
/// struct MyHandler;
///
/// #[async_trait]
/// impl SessionHandler for MyHandler {
///     async fn on_connected(&self, grant: &SessionGrant) {
///         println!("Session {} granted", grant.token);
///     }
///
///     async fn on_disconnect(&self, reason: DisconnectReason) {
///         println!("Server ended the session: {}", reason);
///     }
/// }
/// ```
#[async_trait]
pub trait SessionHandler: Send + Sync + 'static {
    /// Called after the server accepted the handshake
    async fn on_connected(&self, _grant: &SessionGrant) {}

    /// Called when the server issued a new token
    async fn on_renewed(&self, _token: SessionToken) {}

    /// Called when a heartbeat was acknowledged
    async fn on_active(&self) {}

    /// Called on every error after the handshake
    ///
    /// Recoverable errors (see [`ClientError::is_recoverable`]) leave the
    /// session running; any other error ends it.
    async fn on_error(&self, _error: &ClientError) {}

    /// Called when the server sent `DISCONNECT`
    async fn on_disconnect(&self, _reason: DisconnectReason) {}

    /// Called once the connection is closed
    async fn on_closed(&self) {}
}

/// Handler that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

#[async_trait]
impl SessionHandler for NoopHandler {}
