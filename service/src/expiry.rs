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

//! Per-session expiry timers
//!
//! Every live session has exactly one armed pair of deadlines:
//!
//! - the **session** deadline, `connected_at + session_duration`, fixed at
//!   handshake and never moved by activity;
//! - the **inactivity** deadline, `last_activity + inactivity_timeout`,
//!   pushed forward by [`ExpiryScheduler::reset_inactivity`].
//!
//! Both deadlines are raced by one timer task. Whichever passes first invokes
//! the expiry callback once; the other is dropped with the task.
//!
//! Each armed pair carries a generation number. A timer that wakes up checks
//! its generation against the session's current one under the slot lock
//! before acting, so a fire racing `cancel` or a re-arm becomes a no-op.

use crate::{DisconnectReason, Session};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Invoked when a session's timers expire
pub type ExpireCallback = Arc<dyn Fn(Arc<Session>, DisconnectReason) + Send + Sync + 'static>;

/// Cancel handle for one armed timer pair
#[derive(Debug, Clone)]
pub struct ExpiryHandle {
    generation: u64,
    session_deadline: Instant,
    cancel: CancellationToken,
}

impl ExpiryHandle {
    /// Generation of the pair this handle controls
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Absolute deadline of the session
    pub fn session_deadline(&self) -> Instant {
        self.session_deadline
    }

    /// Whether this pair has been cancelled or has fired
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug)]
struct ArmedTimers {
    handle: ExpiryHandle,
    idle_deadline: watch::Sender<Instant>,
}

impl ArmedTimers {
    fn disarm(self) {
        self.handle.cancel.cancel();
    }
}

/// Timer state embedded in each [`Session`]
#[derive(Debug, Default)]
pub(crate) struct ExpirySlot {
    generation: AtomicU64,
    armed: Mutex<Option<ArmedTimers>>,
}

impl ExpirySlot {
    fn armed(&self) -> MutexGuard<'_, Option<ArmedTimers>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retire whatever pair is armed and start a new generation
    fn retire(&self, armed: &mut Option<ArmedTimers>) -> u64 {
        if let Some(previous) = armed.take() {
            previous.disarm();
        }
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Consume the pair of `generation` if it is still the armed one
    fn claim_fire(&self, generation: u64) -> bool {
        let mut armed = self.armed();
        match armed.as_ref() {
            Some(current) if current.handle.generation == generation => {
                self.retire(&mut armed);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed().is_some()
    }
}

/// Arms, resets, and cancels session expiry timers
#[derive(Debug, Clone)]
pub struct ExpiryScheduler {
    session_duration: Duration,
    inactivity_timeout: Duration,
}

impl ExpiryScheduler {
    /// Create a scheduler for the given limits
    pub fn new(session_duration: Duration, inactivity_timeout: Duration) -> Self {
        Self {
            session_duration,
            inactivity_timeout,
        }
    }

    /// Absolute session duration
    pub fn session_duration(&self) -> Duration {
        self.session_duration
    }

    /// Inactivity timeout
    pub fn inactivity_timeout(&self) -> Duration {
        self.inactivity_timeout
    }

    /// Arm a fresh timer pair for `session`, replacing any armed one
    ///
    /// The session deadline is always measured from the handshake, so
    /// re-arming never extends it.
    pub fn arm(&self, session: &Arc<Session>, on_expire: ExpireCallback) -> ExpiryHandle {
        let mut armed = session.expiry.armed();
        let generation = session.expiry.retire(&mut armed);

        let session_deadline = session.connected_at() + self.session_duration;
        let (idle_tx, idle_rx) = watch::channel(Instant::now() + self.inactivity_timeout);
        let handle = ExpiryHandle {
            generation,
            session_deadline,
            cancel: CancellationToken::new(),
        };

        tokio::spawn(run_timers(
            Arc::downgrade(session),
            handle.clone(),
            idle_rx,
            on_expire,
        ));

        debug!(
            session_id = %session.id(),
            generation,
            "Armed expiry timers"
        );

        *armed = Some(ArmedTimers {
            handle: handle.clone(),
            idle_deadline: idle_tx,
        });
        handle
    }

    /// Push the inactivity deadline to `last_activity + inactivity_timeout`
    ///
    /// The session deadline is left untouched. Returns false when no pair is
    /// armed (never armed, cancelled, or already fired).
    pub fn reset_inactivity(&self, session: &Session) -> bool {
        let deadline = session.last_activity() + self.inactivity_timeout;
        let armed = session.expiry.armed();
        match armed.as_ref() {
            Some(timers) => {
                timers.idle_deadline.send_replace(deadline);
                trace!(session_id = %session.id(), "Inactivity deadline reset");
                true
            }
            None => false,
        }
    }

    /// Cancel both timers. Idempotent, and a no-op after either has fired.
    pub fn cancel(&self, session: &Session) {
        let mut armed = session.expiry.armed();
        if armed.is_some() {
            session.expiry.retire(&mut armed);
            debug!(session_id = %session.id(), "Expiry timers cancelled");
        }
    }
}

async fn run_timers(
    session: Weak<Session>,
    handle: ExpiryHandle,
    mut idle_deadline: watch::Receiver<Instant>,
    on_expire: ExpireCallback,
) {
    let reason = loop {
        let idle_at = *idle_deadline.borrow_and_update();
        tokio::select! {
            biased;
            _ = handle.cancel.cancelled() => return,
            _ = sleep_until(handle.session_deadline) => break DisconnectReason::SessionExpired,
            _ = sleep_until(idle_at) => {
                // A reset may have landed while the sleep was completing.
                if *idle_deadline.borrow() <= Instant::now() {
                    break DisconnectReason::InactivityTimeout;
                }
            }
            changed = idle_deadline.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    };

    let Some(session) = session.upgrade() else {
        return;
    };
    if !session.expiry.claim_fire(handle.generation) {
        trace!(
            session_id = %session.id(),
            generation = handle.generation,
            "Stale expiry timer ignored"
        );
        return;
    }

    debug!(session_id = %session.id(), %reason, "Session timer fired");
    on_expire(session, reason);
}
