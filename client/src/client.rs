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


//! Session client
//!
//! Connects, performs the `CONNECT` handshake, then keeps the session alive
//! with two periodic timers: a `STATUS` heartbeat and a `RENEW` request. Both
//! timers live in one cancellation scope that ends with the connection; the
//! client waits for them to stop before returning.

use crate::{ClientConfig, ClientError, Result, SessionHandler};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokenline_service::{
    ClientCommand, DisconnectReason, LineConnection, ServerReply, SessionToken,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

/// What the server granted in `CONNECTED`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    /// Token to present with the first command
    pub token: SessionToken,
    /// Absolute session lifetime
    pub session_duration: Duration,
    /// Allowed silence before the server drops the session
    pub inactivity_timeout: Duration,
}

/// How a session ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientExit {
    /// The server sent `DISCONNECT`
    Disconnected(DisconnectReason),
    /// The client was cancelled locally
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Heartbeat,
    Renew,
}

/// Token broker client
pub struct SessionClient {
    config: ClientConfig,
    cancel: CancellationToken,
}

impl SessionClient {
    /// Create a client; nothing connects until [`SessionClient::connect`]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token that stops the client when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the client
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Connect over TCP and run the session until it ends
    pub async fn connect<H: SessionHandler>(&self, handler: Arc<H>) -> Result<ClientExit> {
        let addr = self.config.address();
        info!("Connecting to {}...", addr);

        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::ConnectionTimeout),
        };
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;

        info!("Connected to {}", peer_addr);
        self.run(stream, peer_addr, handler).await
    }

    /// Run a session over an already open stream
    #[instrument(skip(self, stream, handler))]
    pub async fn run<S, H>(
        &self,
        stream: S,
        peer_addr: SocketAddr,
        handler: Arc<H>,
    ) -> Result<ClientExit>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        H: SessionHandler,
    {
        let mut connection = LineConnection::new(stream, peer_addr, self.config.write_timeout);

        let Some(grant) = self.handshake(&mut connection).await? else {
            info!("Cancelled during handshake");
            return Ok(ClientExit::Cancelled);
        };
        info!(
            token = %grant.token,
            session_duration = ?grant.session_duration,
            inactivity_timeout = ?grant.inactivity_timeout,
            "Session granted"
        );
        handler.on_connected(&grant).await;

        let result = self
            .session_loop(&mut connection, grant, handler.as_ref())
            .await;
        connection.close().await;

        match &result {
            Ok(exit) => info!(?exit, "Session ended"),
            Err(e) => {
                warn!("Session failed: {}", e);
                handler.on_error(e).await;
            }
        }
        handler.on_closed().await;
        result
    }

    /// Send `CONNECT` and wait for the answer. `None` if cancelled first.
    async fn handshake<S>(&self, connection: &mut LineConnection<S>) -> Result<Option<SessionGrant>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let line = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            line = exchange(connection, self.config.connect_timeout) => line?,
        };
        let Some(line) = line else {
            return Err(ClientError::ConnectionClosed);
        };

        match line.parse::<ServerReply>() {
            Ok(ServerReply::Connected {
                token,
                session_duration_secs,
                inactivity_timeout_secs,
            }) => Ok(Some(SessionGrant {
                token,
                session_duration: Duration::from_secs(session_duration_secs),
                inactivity_timeout: Duration::from_secs(inactivity_timeout_secs),
            })),
            Ok(ServerReply::Rejected(reason)) => Err(ClientError::Rejected(reason)),
            Ok(ServerReply::Error(error)) => Err(ClientError::Server(error)),
            Ok(_) | Err(_) => Err(ClientError::UnexpectedReply(line)),
        }
    }

    async fn session_loop<S, H>(
        &self,
        connection: &mut LineConnection<S>,
        grant: SessionGrant,
        handler: &H,
    ) -> Result<ClientExit>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        H: SessionHandler,
    {
        let scope = self.cancel.child_token();
        let timers = TaskTracker::new();
        let (tick_tx, mut ticks) = mpsc::channel(4);

        let heartbeat = self.config.heartbeat_period(grant.inactivity_timeout);
        let renew = self.config.renew_period(grant.session_duration);
        debug!(?heartbeat, ?renew, "Starting timers");
        timers.spawn(periodic(Tick::Heartbeat, heartbeat, scope.child_token(), tick_tx.clone()));
        timers.spawn(periodic(Tick::Renew, renew, scope.child_token(), tick_tx));
        timers.close();

        let mut token = grant.token;
        // Commands awaiting a reply, oldest first; the server answers in order.
        // While a RENEW is among them the current token may already be stale.
        let mut in_flight: VecDeque<Tick> = VecDeque::new();

        let result = loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => break Ok(ClientExit::Cancelled),
                line = connection.read_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break Err(ClientError::ConnectionClosed),
                        Err(e) => break Err(e.into()),
                    };
                    match line.parse::<ServerReply>() {
                        Ok(ServerReply::Active) => {
                            in_flight.pop_front();
                            handler.on_active().await;
                        }
                        Ok(ServerReply::Renewed(new)) => {
                            debug!(token = %new, "Token renewed");
                            in_flight.pop_front();
                            token = new;
                            handler.on_renewed(new).await;
                        }
                        Ok(ServerReply::Error(error)) => {
                            let refused = in_flight.pop_front();
                            warn!(command = ?refused, "Server refused command: {}", error);
                            handler.on_error(&ClientError::Server(error)).await;
                        }
                        Ok(ServerReply::Disconnect(reason)) => {
                            info!(%reason, "Disconnected by server");
                            handler.on_disconnect(reason).await;
                            break Ok(ClientExit::Disconnected(reason));
                        }
                        Ok(_) | Err(_) => {
                            warn!(line = %line, "Unexpected line from server");
                            handler.on_error(&ClientError::UnexpectedReply(line)).await;
                        }
                    }
                }
                Some(tick) = ticks.recv() => {
                    if in_flight.contains(&Tick::Renew) {
                        debug!(?tick, "Renewal outstanding, skipping");
                        continue;
                    }
                    let command = match tick {
                        Tick::Heartbeat => ClientCommand::status(token),
                        Tick::Renew => ClientCommand::renew(token),
                    };
                    if let Err(e) = connection.write_line(&command.to_string()).await {
                        break Err(e.into());
                    }
                    in_flight.push_back(tick);
                }
            }
        };

        scope.cancel();
        drop(ticks);
        timers.wait().await;
        result
    }
}

/// Write `CONNECT` and read one line within `limit`
async fn exchange<S>(connection: &mut LineConnection<S>, limit: Duration) -> Result<Option<String>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    connection
        .write_line(&ClientCommand::Connect.to_string())
        .await?;
    match timeout(limit, connection.read_line()).await {
        Ok(line) => Ok(line?),
        Err(_) => Err(ClientError::ConnectionTimeout),
    }
}

/// Emit `tick` every `period` until cancelled or nobody listens
async fn periodic(
    tick: Tick,
    period: Duration,
    cancel: CancellationToken,
    ticks: mpsc::Sender<Tick>,
) {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if ticks.send(tick).await.is_err() {
                    break;
                }
            }
        }
    }
    debug!(?tick, "Timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokenline_service::{ProtocolError, RejectReason};
    use tokio::io::{DuplexStream, duplex};
    use tracing_test::traced_test;

    type Server = LineConnection<DuplexStream>;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn push(&self, event: impl Into<String>) {
            self.events.lock().unwrap().push(event.into());
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionHandler for Recorder {
        async fn on_connected(&self, _grant: &SessionGrant) {
            self.push("connected");
        }

        async fn on_renewed(&self, _token: SessionToken) {
            self.push("renewed");
        }

        async fn on_active(&self) {
            self.push("active");
        }

        async fn on_error(&self, error: &ClientError) {
            self.push(format!("error: {}", error));
        }

        async fn on_disconnect(&self, reason: DisconnectReason) {
            self.push(format!("disconnect {}", reason));
        }

        async fn on_closed(&self) {
            self.push("closed");
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:7878".parse().unwrap()
    }

    fn pair() -> (Server, DuplexStream) {
        let (client, server) = duplex(4096);
        (LineConnection::new(server, peer(), Duration::from_secs(5)), client)
    }

    async fn next(server: &mut Server) -> String {
        server
            .read_line()
            .await
            .unwrap()
            .expect("client closed the connection")
    }

    async fn accept(server: &mut Server, token: SessionToken, session_secs: u64, idle_secs: u64) {
        assert_eq!(next(server).await, "CONNECT");
        server
            .send(&ServerReply::Connected {
                token,
                session_duration_secs: session_secs,
                inactivity_timeout_secs: idle_secs,
            })
            .await
            .unwrap();
    }

    fn spawn_client(
        config: ClientConfig,
        stream: DuplexStream,
        recorder: &Arc<Recorder>,
    ) -> (CancellationToken, tokio::task::JoinHandle<Result<ClientExit>>) {
        let client = SessionClient::new(config);
        let cancel = client.cancellation_token();
        let handler = recorder.clone();
        let handle = tokio::spawn(async move { client.run(stream, peer(), handler).await });
        (cancel, handle)
    }

    fn assert_elapsed(start: Instant, millis: u64) {
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(millis), "early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(millis + 100), "late: {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timers_follow_server_limits() {
        let (mut server, stream) = pair();
        let recorder = Arc::new(Recorder::default());
        let (_cancel, client) = spawn_client(ClientConfig::default(), stream, &recorder);

        let start = Instant::now();
        let first = SessionToken::generate();
        let second = SessionToken::generate();
        accept(&mut server, first, 5, 3).await;

        // Heartbeat every 1.5s, renewal every 2.5s
        assert_eq!(next(&mut server).await, format!("STATUS {}", first));
        assert_elapsed(start, 1500);
        server.send(&ServerReply::Active).await.unwrap();

        assert_eq!(next(&mut server).await, format!("RENEW {}", first));
        assert_elapsed(start, 2500);
        server.send(&ServerReply::Renewed(second)).await.unwrap();

        assert_eq!(next(&mut server).await, format!("STATUS {}", second));
        assert_elapsed(start, 3000);
        server.send(&ServerReply::Active).await.unwrap();
        server
            .send(&ServerReply::Disconnect(DisconnectReason::SessionExpired))
            .await
            .unwrap();

        let exit = client.await.unwrap().unwrap();
        assert_eq!(exit, ClientExit::Disconnected(DisconnectReason::SessionExpired));
        assert_eq!(
            recorder.events(),
            [
                "connected",
                "active",
                "renewed",
                "active",
                "disconnect SessionExpired",
                "closed"
            ]
        );
        assert_eq!(server.read_line().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_waits_for_outstanding_renewal() {
        let (mut server, stream) = pair();
        let recorder = Arc::new(Recorder::default());
        let config = ClientConfig::default()
            .with_heartbeat_interval(Some(Duration::from_secs(1)))
            .with_renew_interval(Some(Duration::from_millis(2500)));
        let (_cancel, client) = spawn_client(config, stream, &recorder);

        let start = Instant::now();
        let first = SessionToken::generate();
        let second = SessionToken::generate();
        accept(&mut server, first, 300, 60).await;

        for _ in 0..2 {
            assert_eq!(next(&mut server).await, format!("STATUS {}", first));
            server.send(&ServerReply::Active).await.unwrap();
        }
        assert_eq!(next(&mut server).await, format!("RENEW {}", first));
        assert_elapsed(start, 2500);

        // The heartbeat due at 3s is skipped while the renewal is unanswered
        tokio::time::sleep(Duration::from_secs(1)).await;
        server.send(&ServerReply::Renewed(second)).await.unwrap();
        assert_eq!(next(&mut server).await, format!("STATUS {}", second));
        assert_elapsed(start, 4000);

        drop(server);
        let result = client.await.unwrap();
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        assert_eq!(
            recorder.events().last().map(String::as_str),
            Some("closed")
        );
        assert!(
            recorder
                .events()
                .contains(&"error: Connection closed by server".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_for_heartbeat_keeps_renewal_outstanding() {
        let (mut server, stream) = pair();
        let recorder = Arc::new(Recorder::default());
        let config = ClientConfig::default()
            .with_heartbeat_interval(Some(Duration::from_secs(1)))
            .with_renew_interval(Some(Duration::from_millis(1500)));
        let (_cancel, client) = spawn_client(config, stream, &recorder);

        let start = Instant::now();
        let first = SessionToken::generate();
        let second = SessionToken::generate();
        accept(&mut server, first, 300, 60).await;

        // Hold the STATUS reply until the RENEW is also in flight
        assert_eq!(next(&mut server).await, format!("STATUS {}", first));
        assert_eq!(next(&mut server).await, format!("RENEW {}", first));
        server
            .send(&ServerReply::Error(ProtocolError::InvalidCode))
            .await
            .unwrap();

        // The heartbeat due at 2s must not go out with the old token
        tokio::time::sleep(Duration::from_secs(1)).await;
        server.send(&ServerReply::Renewed(second)).await.unwrap();

        let line = next(&mut server).await;
        assert!(line.ends_with(&second.to_string()), "sent {}", line);
        assert!(start.elapsed() >= Duration::from_secs(3));

        server
            .send(&ServerReply::Disconnect(DisconnectReason::AdminKick))
            .await
            .unwrap();
        let exit = client.await.unwrap().unwrap();
        assert_eq!(exit, ClientExit::Disconnected(DisconnectReason::AdminKick));
        assert!(recorder.events().contains(&"renewed".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_reply_keeps_session() {
        let (mut server, stream) = pair();
        let recorder = Arc::new(Recorder::default());
        let config = ClientConfig::default().with_heartbeat_interval(Some(Duration::from_secs(1)));
        let (_cancel, client) = spawn_client(config, stream, &recorder);

        let token = SessionToken::generate();
        accept(&mut server, token, 300, 60).await;

        next(&mut server).await;
        server
            .send(&ServerReply::Error(ProtocolError::InvalidCode))
            .await
            .unwrap();
        assert_eq!(next(&mut server).await, format!("STATUS {}", token));
        server
            .send(&ServerReply::Disconnect(DisconnectReason::AdminKick))
            .await
            .unwrap();

        let exit = client.await.unwrap().unwrap();
        assert_eq!(exit, ClientExit::Disconnected(DisconnectReason::AdminKick));
        assert_eq!(
            recorder.events(),
            [
                "connected",
                "error: Server error: Invalid code",
                "disconnect AdminKick",
                "closed"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_handshake() {
        let (mut server, stream) = pair();
        let recorder = Arc::new(Recorder::default());
        let (_cancel, client) = spawn_client(ClientConfig::default(), stream, &recorder);

        assert_eq!(next(&mut server).await, "CONNECT");
        server
            .send(&ServerReply::Rejected(RejectReason::ServerFull))
            .await
            .unwrap();

        let result = client.await.unwrap();
        assert!(matches!(
            result,
            Err(ClientError::Rejected(RejectReason::ServerFull))
        ));
        assert!(recorder.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_timeout() {
        let (_server, stream) = pair();
        let client = SessionClient::new(ClientConfig::default());
        let start = Instant::now();

        let result = client.run(stream, peer(), Arc::new(Recorder::default())).await;
        assert!(matches!(result, Err(ClientError::ConnectionTimeout)));
        assert_elapsed(start, 10_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_handshake_reply() {
        let (mut server, stream) = pair();
        let recorder = Arc::new(Recorder::default());
        let (_cancel, client) = spawn_client(ClientConfig::default(), stream, &recorder);

        next(&mut server).await;
        server.write_line("HELLO").await.unwrap();

        let result = client.await.unwrap();
        assert!(matches!(result, Err(ClientError::UnexpectedReply(line)) if line == "HELLO"));
    }

    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_session() {
        let (mut server, stream) = pair();
        let recorder = Arc::new(Recorder::default());
        let (cancel, client) = spawn_client(ClientConfig::default(), stream, &recorder);

        accept(&mut server, SessionToken::generate(), 300, 60).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        cancel.cancel();

        let exit = client.await.unwrap().unwrap();
        assert_eq!(exit, ClientExit::Cancelled);
        assert_eq!(recorder.events(), ["connected", "closed"]);
        assert_eq!(server.read_line().await.unwrap(), None);
        assert!(logs_contain("Timer stopped"));
    }
}
