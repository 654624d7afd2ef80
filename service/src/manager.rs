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

//! Session manager
//!
//! Ties the registry, the expiry scheduler, and the metrics together and owns
//! the one teardown path every termination goes through:
//!
//! - Registering sessions after a successful handshake
//! - Token renewal and heartbeat validation
//! - Activity tracking
//! - Single-shot teardown for expiry, kick, shutdown, and transport loss
//! - Server-wide shutdown coordination
//!
//! Lock order is session fields, then registry. The expiry slot lock is never
//! taken while the session fields lock is held.

use crate::{
    DisconnectReason, ExpireCallback, ExpiryScheduler, ProtocolError, Result, ServerConfig,
    ServerMetrics, Session, SessionError, SessionId, SessionInfo, SessionRegistry, SessionToken,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Attempts at drawing a token that is not already registered
const TOKEN_ATTEMPTS: usize = 4;

/// Session manager
pub struct SessionManager {
    /// Live sessions keyed by token
    registry: SessionRegistry,
    /// Session and inactivity timers
    scheduler: ExpiryScheduler,
    /// Server metrics
    metrics: Arc<ServerMetrics>,
    /// Server-wide shutdown signal; each session's close signal is a child
    shutdown: CancellationToken,
    /// Next session ID (monotonically increasing)
    next_id: AtomicU64,
}

impl SessionManager {
    /// Create a manager for the limits in `config`
    pub fn new(config: &ServerConfig, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            registry: SessionRegistry::new(config.max_sessions),
            scheduler: ExpiryScheduler::new(config.session_duration, config.inactivity_timeout),
            metrics,
            shutdown: CancellationToken::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_session_id(&self) -> SessionId {
        SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Absolute session duration
    pub fn session_duration(&self) -> Duration {
        self.scheduler.session_duration()
    }

    /// Inactivity timeout
    pub fn inactivity_timeout(&self) -> Duration {
        self.scheduler.inactivity_timeout()
    }

    /// Server metrics
    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// Signal cancelled once shutdown has begun
    pub fn shutdown_signal(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Register a new session for a peer that sent `CONNECT`
    ///
    /// On success the session is in the registry with its timers armed.
    /// Fails with [`SessionError::CapacityExceeded`] when the registry is full
    /// and [`SessionError::ShuttingDown`] once shutdown has begun.
    #[instrument(skip(self), level = "debug")]
    pub fn open(self: &Arc<Self>, remote_address: SocketAddr) -> Result<Arc<Session>> {
        if self.is_shutting_down() {
            self.metrics.session_rejected();
            return Err(SessionError::ShuttingDown);
        }

        let session = Arc::new(Session::with_close_signal(
            self.next_session_id(),
            SessionToken::generate(),
            remote_address,
            self.shutdown.child_token(),
        ));

        let mut attempts = 0;
        loop {
            match self.registry.add(session.clone()) {
                Ok(()) => break,
                Err(SessionError::DuplicateToken) if attempts < TOKEN_ATTEMPTS => {
                    attempts += 1;
                    session.fields().token = SessionToken::generate();
                }
                Err(e) => {
                    if matches!(e, SessionError::CapacityExceeded(_)) {
                        self.metrics.session_rejected();
                    }
                    return Err(e);
                }
            }
        }
        self.metrics.session_opened();

        let manager: Weak<SessionManager> = Arc::downgrade(self);
        let on_expire: ExpireCallback =
            Arc::new(move |session: Arc<Session>, reason: DisconnectReason| {
                if let Some(manager) = manager.upgrade() {
                    manager.teardown(&session, reason);
                }
            });
        self.scheduler.arm(&session, on_expire);
        // A kick can land between registration and arming
        if session.is_torn_down() {
            self.scheduler.cancel(&session);
        }

        info!(
            session_id = %session.id(),
            remote_address = %remote_address,
            "Session opened"
        );
        Ok(session)
    }

    /// Record a command line from the session's client
    pub fn touch(&self, session: &Session) {
        session.record_activity();
        self.scheduler.reset_inactivity(session);
    }

    /// Replace the session's token if `presented` is its current one
    ///
    /// The registry is re-keyed atomically and the new token returned. Fails
    /// with [`ProtocolError::MissingCode`] or [`ProtocolError::InvalidCode`]
    /// on a bad argument, and [`SessionError::SessionClosed`] if teardown has
    /// already begun.
    #[instrument(skip(self, session, presented), fields(session_id = %session.id()), level = "debug")]
    pub fn renew(&self, session: &Session, presented: Option<&str>) -> Result<SessionToken> {
        let presented = presented_token(presented)?;

        let mut fields = session.fields();
        if session.is_torn_down() {
            return Err(SessionError::SessionClosed);
        }
        if fields.token != presented {
            return Err(ProtocolError::InvalidCode.into());
        }

        let mut attempts = 0;
        let renewed = loop {
            let candidate = SessionToken::generate();
            match self.registry.rekey(&fields.token, candidate) {
                Ok(()) => break candidate,
                Err(SessionError::DuplicateToken) if attempts < TOKEN_ATTEMPTS => attempts += 1,
                Err(e) => return Err(e),
            }
        };
        fields.token = renewed;
        drop(fields);

        debug!("Session renewed");
        Ok(renewed)
    }

    /// Confirm that `presented` is the session's current token
    pub fn heartbeat(&self, session: &Session, presented: Option<&str>) -> Result<()> {
        let presented = presented_token(presented)?;

        let fields = session.fields();
        if session.is_torn_down() {
            return Err(SessionError::SessionClosed);
        }
        if fields.token != presented {
            return Err(ProtocolError::InvalidCode.into());
        }
        Ok(())
    }

    /// Tear the session down for `reason`
    ///
    /// Only the first caller for a session does anything: it cancels the
    /// timers, removes the session from the registry, records the
    /// termination, and fires the session's close signal. The connection
    /// worker then writes `DISCONNECT` if the reason calls for it. Later
    /// callers get `false`.
    pub fn teardown(&self, session: &Session, reason: DisconnectReason) -> bool {
        if !session.claim_teardown(reason) {
            return false;
        }

        self.scheduler.cancel(session);
        {
            let fields = session.fields();
            if self.registry.remove(&fields.token).is_none() {
                debug!(session_id = %session.id(), "Session was already unregistered");
            }
        }

        self.metrics
            .session_closed(reason, session.connected_at().elapsed());
        session.close_signal().cancel();

        info!(
            session_id = %session.id(),
            remote_address = %session.remote_address(),
            reason = %reason,
            "Session closed"
        );
        true
    }

    /// Tear down the session registered under `token` as an admin kick
    pub fn kick(&self, token: &SessionToken) -> Result<()> {
        let session = self
            .registry
            .find_by_token(token)
            .ok_or(SessionError::SessionNotFound(*token))?;
        if !self.teardown(&session, DisconnectReason::AdminKick) {
            debug!(session_id = %session.id(), "Kicked session was already closing");
        }
        Ok(())
    }

    /// Snapshot of every registered session, ordered by session ID
    pub fn list(&self) -> Vec<SessionInfo> {
        self.registry.list().iter().map(|s| s.info()).collect()
    }

    /// Look up a registered session
    pub fn find(&self, token: &SessionToken) -> Option<Arc<Session>> {
        self.registry.find_by_token(token)
    }

    /// Number of registered sessions
    pub fn count(&self) -> usize {
        self.registry.count()
    }

    /// Maximum number of sessions
    pub fn capacity(&self) -> usize {
        self.registry.capacity()
    }

    /// Begin server-wide shutdown
    ///
    /// New handshakes are refused from here on. Every registered session is
    /// torn down with [`DisconnectReason::ServerShutdown`], and anything
    /// registered while this ran is drained afterwards. Returns the number of
    /// sessions this call tore down. Safe to call more than once.
    #[instrument(skip(self))]
    pub fn shutdown(&self) -> usize {
        self.shutdown.cancel();

        let mut closed = 0;
        for session in self.registry.list() {
            if self.teardown(&session, DisconnectReason::ServerShutdown) {
                closed += 1;
            }
        }
        for session in self.registry.drain_all() {
            warn!(session_id = %session.id(), "Draining session registered during shutdown");
            if self.teardown(&session, DisconnectReason::ServerShutdown) {
                closed += 1;
            }
        }

        info!(closed, "Session manager shut down");
        closed
    }
}

fn presented_token(presented: Option<&str>) -> std::result::Result<SessionToken, ProtocolError> {
    presented
        .ok_or(ProtocolError::MissingCode)?
        .parse()
        .map_err(|_| ProtocolError::InvalidCode)
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("registry", &self.registry)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}
