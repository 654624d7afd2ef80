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

//! A single connected client's identity and timing state

use crate::expiry::ExpirySlot;
use crate::{DisconnectReason, SessionId, SessionInfo, SessionState, SessionToken};
use chrono::{DateTime, Local};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Fields that change while the session is live
///
/// Guarded by the per-session lock. Holders of this lock may take the
/// registry lock, never the other way around.
#[derive(Debug)]
pub(crate) struct SessionFields {
    pub(crate) token: SessionToken,
    pub(crate) last_activity: Instant,
}

/// One live connection's session
///
/// The `Session` object is the stable identity; its token rotates on renewal
/// and the registry is re-keyed to match.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    remote_address: SocketAddr,
    connected_at: Instant,
    connected_wall: DateTime<Local>,
    state: AtomicU8,
    fields: Mutex<SessionFields>,
    /// Single-shot teardown guard; holds the reason of the winning caller
    teardown: OnceLock<DisconnectReason>,
    /// Fired once teardown has run so the connection worker can close
    close: CancellationToken,
    pub(crate) expiry: ExpirySlot,
}

impl Session {
    /// Create a session that has just completed its handshake
    pub fn new(id: SessionId, token: SessionToken, remote_address: SocketAddr) -> Self {
        Self::with_close_signal(id, token, remote_address, CancellationToken::new())
    }

    /// Create a session whose close signal is derived from `close`
    ///
    /// Passing a child of the server's shutdown token makes a server-wide
    /// shutdown reach every session's worker.
    pub fn with_close_signal(
        id: SessionId,
        token: SessionToken,
        remote_address: SocketAddr,
        close: CancellationToken,
    ) -> Self {
        let now = Instant::now();
        Self {
            id,
            remote_address,
            connected_at: now,
            connected_wall: Local::now(),
            state: AtomicU8::new(SessionState::Active.as_u8()),
            fields: Mutex::new(SessionFields {
                token,
                last_activity: now,
            }),
            teardown: OnceLock::new(),
            close,
            expiry: ExpirySlot::default(),
        }
    }

    /// Stable identity
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current token
    pub fn token(&self) -> SessionToken {
        self.fields().token
    }

    /// Peer address
    pub fn remote_address(&self) -> SocketAddr {
        self.remote_address
    }

    /// Handshake time
    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Time of the most recent command line
    pub fn last_activity(&self) -> Instant {
        self.fields().last_activity
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Record a command line arriving now
    ///
    /// Returns the recorded activity time, which never moves backwards.
    pub fn record_activity(&self) -> Instant {
        let mut fields = self.fields();
        let now = Instant::now();
        if now > fields.last_activity {
            fields.last_activity = now;
        }
        fields.last_activity
    }

    /// Whether teardown has already been claimed
    pub fn is_torn_down(&self) -> bool {
        self.teardown.get().is_some()
    }

    /// Reason recorded by whichever caller won teardown
    pub fn teardown_reason(&self) -> Option<DisconnectReason> {
        self.teardown.get().copied()
    }

    /// Try to become the one caller that tears this session down
    pub(crate) fn claim_teardown(&self, reason: DisconnectReason) -> bool {
        if self.teardown.set(reason).is_ok() {
            self.set_state(SessionState::Closing);
            true
        } else {
            false
        }
    }

    /// Signal observed by the connection worker
    pub fn close_signal(&self) -> &CancellationToken {
        &self.close
    }

    pub(crate) fn fields(&self) -> MutexGuard<'_, SessionFields> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a point-in-time copy for display
    pub fn info(&self) -> SessionInfo {
        let (token, last_activity) = {
            let fields = self.fields();
            (fields.token, fields.last_activity)
        };
        let since_connect = last_activity.saturating_duration_since(self.connected_at);
        let last_activity_at = self.connected_wall
            + chrono::Duration::from_std(since_connect).unwrap_or_else(|_| chrono::Duration::zero());

        SessionInfo {
            id: self.id,
            token,
            remote_address: self.remote_address,
            connected_at: self.connected_wall,
            last_activity_at,
            elapsed: self.connected_at.elapsed(),
            idle: last_activity.elapsed(),
        }
    }
}
