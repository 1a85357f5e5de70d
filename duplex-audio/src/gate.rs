//! One-shot readiness gate.
//!
//! [`ReadinessGate`] lets a consumer block until a one-time initialization has
//! finished (the codec bring-up, typically). It is level-triggered: once
//! released it stays released, so a waiter arriving late returns at once.
//!
//! It is not a steady-state semaphore. Per-cycle audio hand-off uses the
//! transport's own release path.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::signal::Signal;

/// Single-transition `not-ready → ready` gate between an initializer and one
/// waiting task.
pub struct ReadinessGate<S> {
    ready: AtomicBool,
    signal: S,
}

impl<S: Signal> ReadinessGate<S> {
    /// Create a gate in the not-ready state.
    pub const fn new(signal: S) -> Self {
        ReadinessGate {
            ready: AtomicBool::new(false),
            signal,
        }
    }

    /// Block until [`release()`](Self::release) has been called at least once.
    pub fn wait(&self) {
        while !self.ready.load(Ordering::Acquire) {
            self.signal.wait();
        }
    }

    /// Mark the gate ready and wake the waiter. Later calls do nothing.
    ///
    /// Safe from interrupt context.
    pub fn release(&self) {
        if !self.ready.swap(true, Ordering::AcqRel) {
            self.signal.release();
        }
    }

    /// Whether the gate has been released.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
