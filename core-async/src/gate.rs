//! Exclusive access gate.
//!
//! A decoding engine has exactly one mutable read position. Every operation
//! that reads from or advances it (header fetch, frame fetch, full-stream
//! scan, re-initialisation) must hold the gate for its whole critical section.
//!
//! The gate keeps a FIFO queue of continuation handles: contenders are woken
//! strictly in the order they called [`ExclusiveAccessGate::acquire`], and any
//! number of contenders may wait at once. Releasing is tied to dropping the
//! returned [`GatePermit`], so early returns and error paths release too.
//!
//! Ownership of the gate is handed directly from the releasing permit to the
//! next waiter; the gate never appears unlocked in between, so a newcomer
//! cannot overtake a queued waiter.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::trace;

struct GateState {
    locked: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// FIFO async mutual exclusion without an owned payload.
pub struct ExclusiveAccessGate {
    state: Mutex<GateState>,
}

impl ExclusiveAccessGate {
    /// Creates an unlocked gate with no waiters.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState {
                locked: false,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Waits until the gate is free, then holds it until the permit drops.
    ///
    /// Resolves immediately when the gate is unlocked. Otherwise the caller is
    /// queued behind every earlier contender.
    ///
    /// Cancel safe: dropping the returned future before it resolves removes
    /// the caller from the queue, and passes the gate on if it had already
    /// been handed over.
    pub async fn acquire(&self) -> GatePermit<'_> {
        loop {
            let rx = {
                let mut state = self.state.lock();
                if !state.locked {
                    state.locked = true;
                    trace!("gate acquired uncontended");
                    return GatePermit { gate: self };
                }
                let (tx, rx) = oneshot::channel();
                state.waiters.push_back(tx);
                trace!(queued = state.waiters.len(), "gate contended, waiting");
                rx
            };

            let mut waiter = Waiter {
                gate: self,
                rx,
                granted: false,
            };
            if (&mut waiter.rx).await.is_ok() {
                waiter.granted = true;
                return GatePermit { gate: self };
            }
            // The sender vanished without a handoff; queue up again.
        }
    }

    /// Whether a permit is currently outstanding.
    ///
    /// Advisory only: the answer can be stale by the time it is used.
    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    /// Number of contenders queued behind the current holder.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }

    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(next) = state.waiters.pop_front() {
            if next.send(()).is_ok() {
                trace!(remaining = state.waiters.len(), "gate handed to next waiter");
                return;
            }
        }
        state.locked = false;
        trace!("gate released");
    }
}

impl Default for ExclusiveAccessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExclusiveAccessGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ExclusiveAccessGate")
            .field("locked", &state.locked)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}

/// Proof of exclusive access. Dropping it wakes the next waiter.
#[must_use = "the gate is released as soon as the permit is dropped"]
pub struct GatePermit<'a> {
    gate: &'a ExclusiveAccessGate,
}

impl Drop for GatePermit<'_> {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl std::fmt::Debug for GatePermit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatePermit").finish_non_exhaustive()
    }
}

struct Waiter<'a> {
    gate: &'a ExclusiveAccessGate,
    rx: oneshot::Receiver<()>,
    granted: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.granted {
            return;
        }
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            // Handed the gate after being abandoned; pass it along.
            self.gate.release();
        }
    }
}
