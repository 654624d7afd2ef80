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

//! Connection worker implementation
//!
//! The ConnectionWorker drives one client connection through its lifecycle:
//!
//! ```text
//! Handshaking ──CONNECT──▶ Active ──teardown──▶ Closing ──▶ Closed
//!      │                                                      ▲
//!      └──── timeout, bad first line, refusal ────────────────┘
//! ```
//!
//! While active it reads command lines and answers them, racing the reads
//! against the session's close signal. Whoever tears the session down, the
//! worker is the one that writes the final `DISCONNECT` and closes the socket.

use crate::protocol::{ClientCommand, RejectReason, ServerReply};
use crate::{
    DisconnectReason, LineConnection, ProtocolError, Result, Session, SessionError,
    SessionManager, SessionObserver, SessionState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::select;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

/// Connection worker that manages a single connection's lifecycle
pub struct ConnectionWorker<S> {
    /// The connection being managed
    connection: LineConnection<S>,
    /// Session bookkeeping
    manager: Arc<SessionManager>,
    /// Lifecycle hooks
    observer: Arc<dyn SessionObserver>,
    /// Time allowed for the `CONNECT` line
    handshake_timeout: Duration,
}

impl<S> ConnectionWorker<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Create a new connection worker
    pub fn new(
        connection: LineConnection<S>,
        manager: Arc<SessionManager>,
        observer: Arc<dyn SessionObserver>,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            connection,
            manager,
            observer,
            handshake_timeout,
        }
    }

    /// Run the worker until the connection is closed
    #[instrument(skip(self), fields(peer_addr = %self.connection.peer_addr()))]
    pub async fn run(mut self) {
        let Some(session) = self.handshake().await else {
            self.connection.close().await;
            return;
        };

        self.observer.on_session_opened(&session.info()).await;

        let reason = self.event_loop(&session).await;
        self.finish(&session, reason).await;
    }

    /// Wait for `CONNECT` and register the session
    async fn handshake(&mut self) -> Option<Arc<Session>> {
        let shutdown = self.manager.shutdown_signal();
        let line = select! {
            biased;
            _ = shutdown.cancelled() => {
                self.reply(&ServerReply::Rejected(RejectReason::ShuttingDown)).await.ok();
                return None;
            }
            read = timeout(self.handshake_timeout, self.connection.read_line()) => read,
        };

        let line = match line {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => {
                debug!("Peer left before handshake");
                return None;
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Handshake read failed");
                self.manager.metrics().connection_error();
                return None;
            }
            Err(_) => {
                debug!("Handshake timed out");
                self.manager.metrics().connection_error();
                return None;
            }
        };
        self.manager.metrics().line_received();

        if ClientCommand::parse(&line) != ClientCommand::Connect {
            self.manager.metrics().protocol_error();
            self.reply(&ServerReply::Error(ProtocolError::ExpectedConnect))
                .await
                .ok();
            return None;
        }

        let session = match self.manager.open(self.connection.peer_addr()) {
            Ok(session) => session,
            Err(SessionError::CapacityExceeded(max)) => {
                debug!(max_sessions = max, "Server full");
                self.reply(&ServerReply::Rejected(RejectReason::ServerFull))
                    .await
                    .ok();
                return None;
            }
            Err(SessionError::ShuttingDown) => {
                self.reply(&ServerReply::Rejected(RejectReason::ShuttingDown))
                    .await
                    .ok();
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to open session");
                return None;
            }
        };

        let connected = ServerReply::Connected {
            token: session.token(),
            session_duration_secs: self.manager.session_duration().as_secs(),
            inactivity_timeout_secs: self.manager.inactivity_timeout().as_secs(),
        };
        if let Err(e) = self.reply(&connected).await {
            debug!(error = %e, "Failed to confirm handshake");
            self.manager
                .teardown(&session, DisconnectReason::TransportError);
            session.set_state(SessionState::Closed);
            return None;
        }

        Some(session)
    }

    /// Answer command lines until the session ends
    async fn event_loop(&mut self, session: &Arc<Session>) -> DisconnectReason {
        loop {
            select! {
                biased;
                _ = session.close_signal().cancelled() => {
                    // Parent cancellation reaches here before shutdown claims the session
                    return session
                        .teardown_reason()
                        .unwrap_or(DisconnectReason::ServerShutdown);
                }
                read = self.connection.read_line() => match read {
                    Ok(Some(line)) => {
                        if let Err(e) = self.dispatch(session, &line).await {
                            debug!(session_id = %session.id(), error = %e, "Write failed");
                            return DisconnectReason::TransportError;
                        }
                    }
                    Ok(None) => return DisconnectReason::ClientClosed,
                    Err(e) => {
                        debug!(session_id = %session.id(), error = %e, "Read failed");
                        return DisconnectReason::TransportError;
                    }
                }
            }
        }
    }

    /// Handle one command line
    async fn dispatch(&mut self, session: &Session, line: &str) -> Result<()> {
        self.manager.metrics().line_received();
        self.manager.touch(session);

        let outcome = match ClientCommand::parse(line) {
            ClientCommand::Renew(token) => self
                .manager
                .renew(session, token.as_deref())
                .map(ServerReply::Renewed),
            ClientCommand::Status(token) => self
                .manager
                .heartbeat(session, token.as_deref())
                .map(|()| ServerReply::Active),
            ClientCommand::Connect | ClientCommand::Unknown => {
                Err(ProtocolError::UnknownCommand.into())
            }
        };

        let reply = match outcome {
            Ok(reply) => reply,
            Err(SessionError::Protocol(error)) => {
                self.manager.metrics().protocol_error();
                self.observer.on_protocol_error(session.id(), error).await;
                ServerReply::Error(error)
            }
            // Torn down mid-command; the close signal ends the loop next
            Err(_) => return Ok(()),
        };

        self.reply(&reply).await?;
        if let ServerReply::Renewed(token) = reply {
            self.observer.on_session_renewed(session.id(), token).await;
        }
        Ok(())
    }

    async fn reply(&mut self, reply: &ServerReply) -> Result<()> {
        self.connection.send(reply).await?;
        self.manager.metrics().line_sent();
        Ok(())
    }

    /// Tear down if nobody has yet, send the notice, and close
    async fn finish(&mut self, session: &Session, reason: DisconnectReason) {
        self.manager.teardown(session, reason);
        let reason = session.teardown_reason().unwrap_or(reason);

        if reason.notifies_client() {
            if let Err(e) = self.reply(&ServerReply::Disconnect(reason)).await {
                debug!(session_id = %session.id(), error = %e, "Disconnect notice not delivered");
            }
        }
        self.connection.close().await;
        session.set_state(SessionState::Closed);

        self.observer.on_session_closed(&session.info(), reason).await;
    }
}

impl<S> std::fmt::Debug for ConnectionWorker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionWorker")
            .field("connection", &self.connection)
            .field("handshake_timeout", &self.handshake_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NoopObserver, ServerConfig, ServerMetrics};
    use std::net::SocketAddr;
    use tokio::io::{DuplexStream, duplex};

    fn peer() -> SocketAddr {
        "127.0.0.1:7000".parse().unwrap()
    }

    fn manager(max_sessions: usize) -> Arc<SessionManager> {
        let config = ServerConfig::default().with_max_sessions(max_sessions);
        Arc::new(SessionManager::new(&config, Arc::new(ServerMetrics::new())))
    }

    fn spawn_worker(
        manager: &Arc<SessionManager>,
    ) -> (LineConnection<DuplexStream>, tokio::task::JoinHandle<()>) {
        let (server, client) = duplex(4096);
        let worker = ConnectionWorker::new(
            LineConnection::new(server, peer(), Duration::from_secs(1)),
            manager.clone(),
            Arc::new(NoopObserver),
            Duration::from_secs(10),
        );
        let handle = tokio::spawn(worker.run());
        (LineConnection::new(client, peer(), Duration::from_secs(1)), handle)
    }

    #[tokio::test]
    async fn test_worker_lifecycle() {
        let manager = manager(2);
        let (mut client, handle) = spawn_worker(&manager);

        client.write_line("CONNECT").await.unwrap();
        let reply: ServerReply = client.read_line().await.unwrap().unwrap().parse().unwrap();
        let ServerReply::Connected { token, .. } = reply else {
            panic!("unexpected reply {:?}", reply);
        };
        assert_eq!(manager.count(), 1);

        client.write_line(&format!("STATUS {}", token)).await.unwrap();
        assert_eq!(client.read_line().await.unwrap().as_deref(), Some("ACTIVE"));

        client.write_line("HELLO").await.unwrap();
        assert_eq!(
            client.read_line().await.unwrap().as_deref(),
            Some("ERROR Unknown command")
        );

        drop(client);
        handle.await.unwrap();
        assert_eq!(manager.count(), 0);
        assert_eq!(
            manager
                .metrics()
                .snapshot()
                .disconnects(DisconnectReason::ClientClosed),
            1
        );
    }

    #[tokio::test]
    async fn test_first_line_must_be_connect() {
        let manager = manager(2);
        let (mut client, handle) = spawn_worker(&manager);

        client.write_line("STATUS abc").await.unwrap();
        assert_eq!(
            client.read_line().await.unwrap().as_deref(),
            Some("ERROR Expected CONNECT")
        );
        assert_eq!(client.read_line().await.unwrap(), None);
        handle.await.unwrap();
        assert_eq!(manager.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout_closes_silently() {
        let manager = manager(2);
        let (mut client, handle) = spawn_worker(&manager);

        assert_eq!(client.read_line().await.unwrap(), None);
        handle.await.unwrap();
        assert_eq!(manager.metrics().snapshot().connection_errors, 1);
        assert_eq!(manager.metrics().total_sessions(), 0);
    }

    #[tokio::test]
    async fn test_kick_sends_disconnect() {
        let manager = manager(2);
        let (mut client, handle) = spawn_worker(&manager);

        client.write_line("CONNECT").await.unwrap();
        let reply: ServerReply = client.read_line().await.unwrap().unwrap().parse().unwrap();
        let ServerReply::Connected { token, .. } = reply else {
            panic!("unexpected reply {:?}", reply);
        };

        manager.kick(&token).unwrap();
        assert_eq!(
            client.read_line().await.unwrap().as_deref(),
            Some("DISCONNECT AdminKick")
        );
        assert_eq!(client.read_line().await.unwrap(), None);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_during_handshake_rejects() {
        let manager = manager(2);
        manager.shutdown();
        let (mut client, handle) = spawn_worker(&manager);

        assert_eq!(
            client.read_line().await.unwrap().as_deref(),
            Some("REJECTED ShuttingDown")
        );
        handle.await.unwrap();
    }
}
