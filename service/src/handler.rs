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

//! Observer hooks for session lifecycle events

use crate::{DisconnectReason, ProtocolError, SessionId, SessionInfo, SessionToken};
use async_trait::async_trait;

/// Session lifecycle observer
///
/// Hooks are called from the session's connection worker. `on_session_opened`
/// and `on_session_closed` run exactly once per registered session. All
/// methods have default implementations that do nothing.
///
/// # Example
///
/// ```no_run
/// use tokenline_service::{DisconnectReason, SessionInfo, SessionObserver};
/// use async_trait::async_trait;
///
/// struct Audit;
///
/// #[async_trait]
/// impl SessionObserver for Audit {
///     async fn on_session_closed(&self, info: &SessionInfo, reason: DisconnectReason) {
///         println!("{} from {} closed: {}", info.id, info.remote_address, reason);
///     }
/// }
/// ```
#[async_trait]
pub trait SessionObserver: Send + Sync + 'static {
    /// Called after the handshake succeeded and the client was told its token
    async fn on_session_opened(&self, _info: &SessionInfo) {}

    /// Called after a renewal re-keyed the session
    async fn on_session_renewed(&self, _id: SessionId, _token: SessionToken) {}

    /// Called when a command was answered with `ERROR`
    async fn on_protocol_error(&self, _id: SessionId, _error: ProtocolError) {}

    /// Called once teardown has run and the connection is closed
    async fn on_session_closed(&self, _info: &SessionInfo, _reason: DisconnectReason) {}
}

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl SessionObserver for NoopObserver {}

/// Callback-based observer
///
/// Lets callers hook events with closures instead of implementing
/// [`SessionObserver`].
///
/// # Example
///
/// ```no_run
/// use tokenline_service::{CallbackObserver, DisconnectReason, SessionInfo};
/// use std::sync::Arc;
///
/// let observer = Arc::new(CallbackObserver {
///     on_session_closed: Some(Box::new(|info: &SessionInfo, reason: DisconnectReason| {
///         println!("{} closed: {}", info.token, reason);
///     })),
///     ..Default::default()
/// });
/// ```
#[derive(Default)]
pub struct CallbackObserver {
    /// Called on successful handshake
    pub on_session_opened: Option<Box<dyn Fn(&SessionInfo) + Send + Sync + 'static>>,
    /// Called on renewal
    pub on_session_renewed: Option<Box<dyn Fn(SessionId, SessionToken) + Send + Sync + 'static>>,
    /// Called on protocol errors
    pub on_protocol_error: Option<Box<dyn Fn(SessionId, ProtocolError) + Send + Sync + 'static>>,
    /// Called on teardown
    pub on_session_closed:
        Option<Box<dyn Fn(&SessionInfo, DisconnectReason) + Send + Sync + 'static>>,
}

#[async_trait]
impl SessionObserver for CallbackObserver {
    async fn on_session_opened(&self, info: &SessionInfo) {
        if let Some(ref f) = self.on_session_opened {
            f(info);
        }
    }

    async fn on_session_renewed(&self, id: SessionId, token: SessionToken) {
        if let Some(ref f) = self.on_session_renewed {
            f(id, token);
        }
    }

    async fn on_protocol_error(&self, id: SessionId, error: ProtocolError) {
        if let Some(ref f) = self.on_protocol_error {
            f(id, error);
        }
    }

    async fn on_session_closed(&self, info: &SessionInfo, reason: DisconnectReason) {
        if let Some(ref f) = self.on_session_closed {
            f(info, reason);
        }
    }
}
