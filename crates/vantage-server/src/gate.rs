//! Single-permit control gate.
//!
//! Every route the server exposes mutates shared pipeline state, so requests
//! are serialized through one permit rather than a per-resource lock. Waiters
//! block up to the configured timeout and then fail without running their
//! handler.

use std::{
    error::Error,
    fmt,
    sync::{Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};

/// Default bound on how long a request waits for the permit.
pub const DEFAULT_GATE_TIMEOUT: Duration = Duration::from_millis(3000);

// ============================================================================
// Errors
// ============================================================================

/// The permit did not free up within the gate's timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateTimeout {
    /// How long the caller was prepared to wait.
    pub waited: Duration,
}

impl fmt::Display for GateTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unable to acquire control gate in {} ms",
            self.waited.as_millis()
        )
    }
}

impl Error for GateTimeout {}

// ============================================================================
// Gate
// ============================================================================

/// A single permit with bounded acquisition.
///
/// Unlike a [`Mutex`], the permit is released by dropping the returned
/// [`GatePermit`], so a handler can hold it across arbitrary work without
/// tying it to a lexical lock scope on the gate itself.
pub struct ControlGate {
    held: Mutex<bool>,
    released: Condvar,
    timeout: Duration,
}

impl ControlGate {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
            timeout,
        }
    }

    /// The configured acquisition bound.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Waits for the permit, up to the configured timeout.
    ///
    /// On success the permit is held until the returned guard drops. Waiters
    /// that hit the deadline get [`GateTimeout`] and never touch the permit.
    pub fn acquire(&self) -> Result<GatePermit<'_>, GateTimeout> {
        let deadline = Instant::now() + self.timeout;
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            let now = Instant::now();
            if now >= deadline {
                return Err(GateTimeout {
                    waited: self.timeout,
                });
            }
            let (guard, wait) = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            held = guard;
            if wait.timed_out() && *held {
                return Err(GateTimeout {
                    waited: self.timeout,
                });
            }
        }
        *held = true;
        Ok(GatePermit { gate: self })
    }
}

/// Proof of holding the gate. Releases the permit on drop.
pub struct GatePermit<'a> {
    gate: &'a ControlGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        let mut held = self
            .gate
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *held = false;
        self.gate.released.notify_one();
    }
}

// ============================================================================
// Tests
// ============================================================================
