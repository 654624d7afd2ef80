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

//! Lock-free metrics for the session broker
//!
//! Every update is mirrored to the `metrics` facade so an installed
//! recorder can export it; the atomics back the admin console's `stats`.

use crate::DisconnectReason;
use metrics::{counter, gauge, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free server metrics
///
/// Use the `snapshot()` method to get a view of all metrics at a point in time.
#[derive(Debug)]
pub struct ServerMetrics {
    // Session counts
    total_sessions: AtomicU64,
    active_sessions: AtomicU64,
    rejected_sessions: AtomicU64,

    // Traffic
    lines_received: AtomicU64,
    lines_sent: AtomicU64,

    // Errors
    protocol_errors: AtomicU64,
    connection_errors: AtomicU64,

    // Terminations, indexed by DisconnectReason
    disconnects: [AtomicU64; DisconnectReason::COUNT],

    // Timing (stored as nanoseconds)
    total_session_duration_ns: AtomicU64,

    started_at: Instant,
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            total_sessions: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            rejected_sessions: AtomicU64::new(0),
            lines_received: AtomicU64::new(0),
            lines_sent: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            disconnects: Default::default(),
            total_session_duration_ns: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    // Session tracking

    /// Record a session being registered
    pub fn session_opened(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("tokenline.sessions.opened").increment(1);
        gauge!("tokenline.sessions.active").increment(1.0);
    }

    /// Record a session being torn down
    pub fn session_closed(&self, reason: DisconnectReason, duration: Duration) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        self.disconnects[reason.index()].fetch_add(1, Ordering::Relaxed);
        self.total_session_duration_ns
            .fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        counter!("tokenline.sessions.closed", "reason" => reason.as_str()).increment(1);
        gauge!("tokenline.sessions.active").decrement(1.0);
        histogram!("tokenline.sessions.duration").record(duration.as_secs_f64());
    }

    /// Record a handshake refused for capacity or shutdown
    pub fn session_rejected(&self) {
        self.rejected_sessions.fetch_add(1, Ordering::Relaxed);
        counter!("tokenline.sessions.rejected").increment(1);
    }

    /// Get the current number of registered sessions
    pub fn active_sessions(&self) -> u64 {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Get the total number of sessions since server start
    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    // Traffic tracking

    /// Record a line received from a client
    pub fn line_received(&self) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a line sent to a client
    pub fn line_sent(&self) {
        self.lines_sent.fetch_add(1, Ordering::Relaxed);
    }

    // Error tracking

    /// Record a command answered with `ERROR`
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
        counter!("tokenline.protocol.errors").increment(1);
    }

    /// Record a failed accept or a connection that died before handshake
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
        counter!("tokenline.connections.errors").increment(1);
    }

    // Snapshot

    /// Get a snapshot of all metrics
    ///
    /// The snapshot may be slightly skewed if metrics are being updated
    /// concurrently.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut disconnects = [0; DisconnectReason::COUNT];
        for (slot, counter) in disconnects.iter_mut().zip(&self.disconnects) {
            *slot = counter.load(Ordering::Relaxed);
        }

        MetricsSnapshot {
            total_sessions: self.total_sessions.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            rejected_sessions: self.rejected_sessions.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            lines_sent: self.lines_sent.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            disconnects,
            uptime: self.started_at.elapsed(),
            avg_session_duration: self.average_session_duration(),
        }
    }

    fn average_session_duration(&self) -> Duration {
        let closed: u64 = self
            .disconnects
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum();
        if closed == 0 {
            return Duration::ZERO;
        }
        let total_ns = self.total_session_duration_ns.load(Ordering::Relaxed);
        Duration::from_nanos(total_ns / closed)
    }
}

/// A snapshot of server metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Total sessions since server start
    pub total_sessions: u64,
    /// Currently registered sessions
    pub active_sessions: u64,
    /// Handshakes refused
    pub rejected_sessions: u64,
    /// Lines received from clients
    pub lines_received: u64,
    /// Lines sent to clients
    pub lines_sent: u64,
    /// Commands answered with `ERROR`
    pub protocol_errors: u64,
    /// Accept failures and connections lost before handshake
    pub connection_errors: u64,
    /// Terminations, indexed like [`DisconnectReason::ALL`]
    pub disconnects: [u64; DisconnectReason::COUNT],
    /// Server uptime
    pub uptime: Duration,
    /// Average duration of closed sessions
    pub avg_session_duration: Duration,
}

impl MetricsSnapshot {
    /// Terminations recorded for one reason
    pub fn disconnects(&self, reason: DisconnectReason) -> u64 {
        self.disconnects[reason.index()]
    }

    /// Total terminations for all reasons
    pub fn total_disconnects(&self) -> u64 {
        self.disconnects.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_session_tracking() {
        let metrics = ServerMetrics::new();

        assert_eq!(metrics.active_sessions(), 0);
        assert_eq!(metrics.total_sessions(), 0);

        metrics.session_opened();
        metrics.session_opened();
        assert_eq!(metrics.active_sessions(), 2);
        assert_eq!(metrics.total_sessions(), 2);

        metrics.session_closed(DisconnectReason::AdminKick, Duration::from_secs(10));
        assert_eq!(metrics.active_sessions(), 1);
        assert_eq!(metrics.total_sessions(), 2);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.disconnects(DisconnectReason::AdminKick), 1);
        assert_eq!(snapshot.disconnects(DisconnectReason::SessionExpired), 0);
        assert_eq!(snapshot.total_disconnects(), 1);
        assert_eq!(snapshot.avg_session_duration, Duration::from_secs(10));
    }

    #[test]
    fn test_error_and_traffic_tracking() {
        let metrics = ServerMetrics::new();

        metrics.session_rejected();
        metrics.protocol_error();
        metrics.connection_error();
        metrics.line_received();
        metrics.line_sent();
        metrics.line_sent();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rejected_sessions, 1);
        assert_eq!(snapshot.protocol_errors, 1);
        assert_eq!(snapshot.connection_errors, 1);
        assert_eq!(snapshot.lines_received, 1);
        assert_eq!(snapshot.lines_sent, 2);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = std::sync::Arc::new(ServerMetrics::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let metrics = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    metrics.session_opened();
                    metrics.line_received();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.total_sessions(), 1000);
        assert_eq!(metrics.active_sessions(), 1000);
        assert_eq!(metrics.snapshot().lines_received, 1000);
    }
}
