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

//! Session server implementation
//!
//! The SessionServer owns the TCP listener and the accept loop. Every
//! accepted socket gets its own [`ConnectionWorker`] task; the
//! [`SessionManager`] does the bookkeeping.

use crate::{
    ConnectionWorker, LineConnection, Result, ServerConfig, ServerMetrics, ServerSnapshot,
    SessionError, SessionManager, SessionObserver,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::task::TaskTracker;

/// How long shutdown waits for workers to deliver their final notices
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Back-off after a failed accept
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Session broker server
///
/// # Example
///
/// ```no_run
/// use tokenline_service::{NoopObserver, ServerConfig, SessionServer};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let server = SessionServer::new(ServerConfig::default()).await?;
///     server.start(Arc::new(NoopObserver)).await?;
///
///     tokio::signal::ctrl_c().await?;
///     server.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct SessionServer {
    /// Server configuration
    config: ServerConfig,
    /// Session bookkeeping
    manager: Arc<SessionManager>,
    /// Server metrics
    metrics: Arc<ServerMetrics>,
    /// Listener, taken by the accept loop on start
    listener: Mutex<Option<TcpListener>>,
    /// Actual bind address
    bind_address: SocketAddr,
    /// Server start time
    started_at: Instant,
    /// Running flag
    running: AtomicBool,
    /// Connection worker tasks
    workers: TaskTracker,
    /// Accept loop task handle
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SessionServer {
    /// Create a new server with the given configuration
    ///
    /// Validates the configuration and binds the listener, but does not start
    /// accepting connections. Call `start()` for that.
    pub async fn new(config: ServerConfig) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.bind_address).await?;
        let bind_address = listener.local_addr()?;

        let metrics = Arc::new(ServerMetrics::new());
        let manager = Arc::new(SessionManager::new(&config, metrics.clone()));

        tracing::info!("Session server bound to {}", bind_address);

        Ok(Self {
            config,
            manager,
            metrics,
            listener: Mutex::new(Some(listener)),
            bind_address,
            started_at: Instant::now(),
            running: AtomicBool::new(false),
            workers: TaskTracker::new(),
            accept_handle: Mutex::new(None),
        })
    }

    /// Start accepting connections
    ///
    /// Runs until `shutdown()` is called or the session manager is shut down.
    pub async fn start(&self, observer: Arc<dyn SessionObserver>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SessionError::ServerAlreadyRunning);
        }
        let Some(listener) = self.listener.lock().await.take() else {
            return Err(SessionError::ServerAlreadyRunning);
        };

        tracing::info!(
            max_sessions = self.config.max_sessions,
            session_duration = ?self.config.session_duration,
            inactivity_timeout = ?self.config.inactivity_timeout,
            "Starting session server on {}",
            self.bind_address
        );

        let handle = tokio::spawn(accept_loop(
            listener,
            self.manager.clone(),
            observer,
            self.workers.clone(),
            self.config.clone(),
        ));
        *self.accept_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Shut the server down gracefully
    ///
    /// Stops the accept loop, tears down every session with `ServerShutdown`,
    /// and gives the workers a bounded window to deliver their notices.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(SessionError::ServerNotRunning);
        }

        tracing::info!("Shutting down session server");

        let closed = self.manager.shutdown();

        if let Some(handle) = self.accept_handle.lock().await.take() {
            let _ = timeout(DRAIN_TIMEOUT, handle).await;
        }

        self.workers.close();
        if timeout(DRAIN_TIMEOUT, self.workers.wait()).await.is_err() {
            tracing::warn!(
                remaining = self.workers.len(),
                "Connection workers still running after drain timeout"
            );
        }

        tracing::info!(closed, "Session server shutdown complete");
        Ok(())
    }

    /// Resolves once shutdown has begun, from any source
    pub async fn stopped(&self) {
        self.manager.shutdown_signal().cancelled().await;
    }

    /// Check if the server is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the server's bind address
    pub fn bind_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Get the number of registered sessions
    pub fn session_count(&self) -> usize {
        self.manager.count()
    }

    /// Get a snapshot of the server state
    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            active_sessions: self.manager.count(),
            total_sessions: self.metrics.total_sessions(),
            bind_address: self.bind_address,
            uptime: self.started_at.elapsed(),
        }
    }

    /// Get the server metrics
    pub fn metrics(&self) -> Arc<ServerMetrics> {
        self.metrics.clone()
    }

    /// Get the session manager
    pub fn manager(&self) -> Arc<SessionManager> {
        self.manager.clone()
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

async fn accept_loop(
    listener: TcpListener,
    manager: Arc<SessionManager>,
    observer: Arc<dyn SessionObserver>,
    workers: TaskTracker,
    config: ServerConfig,
) {
    let shutdown = manager.shutdown_signal();
    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            result = listener.accept() => result,
        };

        match accepted {
            Ok((socket, peer_addr)) => {
                tracing::debug!("Accepted connection from {}", peer_addr);
                match LineConnection::wrap(socket, config.write_timeout) {
                    Ok(connection) => {
                        let worker = ConnectionWorker::new(
                            connection,
                            manager.clone(),
                            observer.clone(),
                            config.handshake_timeout,
                        );
                        workers.spawn(worker.run());
                    }
                    Err(e) => {
                        tracing::error!("Failed to wrap connection from {}: {}", peer_addr, e);
                        manager.metrics().connection_error();
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
                manager.metrics().connection_error();
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    tracing::info!("Accept loop terminated");
}

impl std::fmt::Debug for SessionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionServer")
            .field("bind_address", &self.bind_address)
            .field("running", &self.is_running())
            .field("session_count", &self.session_count())
            .field("uptime", &self.started_at.elapsed())
            .finish()
    }
}

impl Drop for SessionServer {
    fn drop(&mut self) {
        if self.running.load(Ordering::SeqCst) {
            tracing::warn!("SessionServer dropped while still running");
            self.running.store(false, Ordering::SeqCst);
            self.manager.shutdown();
        }
    }
}
