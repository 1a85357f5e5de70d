//! Scheduler-facing primitives.
//!
//! The library never talks to an RTOS directly. A [`Signal`] is the only thing
//! it needs: a latched binary release that a task can block on and that an
//! interrupt can fire. [`TaskSpec`] describes how a board should create the
//! tasks the platform runs.
//!
//! | Backend | Where | Wait strategy |
//! |---------|-------|---------------|
//! | [`AtomicSignal`] | any `no_std` target | spin (or `WFE` with the `cortex-m` feature) |
//! | [`host::ThreadSignal`](crate::host::ThreadSignal) | `std` | mutex + condvar |

use core::sync::atomic::{AtomicBool, Ordering};

/// Latched binary release between an interrupt (or task) and one waiting task.
///
/// A release that happens before [`wait()`](Signal::wait) is entered is not
/// lost: the next wait consumes it and returns immediately. Several releases
/// before a wait collapse into one.
pub trait Signal: Sync {
    /// Block the calling task until a release is pending, then consume it.
    fn wait(&self);

    /// Make a release pending and wake the waiter.
    ///
    /// Must be callable from interrupt context: no blocking, no allocation.
    fn release(&self);
}

impl<S: Signal + ?Sized> Signal for &S {
    fn wait(&self) {
        (**self).wait();
    }

    fn release(&self) {
        (**self).release();
    }
}

/// Lock-free [`Signal`] built on a single atomic flag.
///
/// The waiter polls the flag. On Cortex-M (feature `cortex-m`) it sleeps in
/// `WFE` between polls and `release()` issues `SEV`.
pub struct AtomicSignal {
    pending: AtomicBool,
}

impl AtomicSignal {
    /// Create a signal with no release pending.
    pub const fn new() -> Self {
        AtomicSignal {
            pending: AtomicBool::new(false),
        }
    }

    /// Whether a release is pending and not yet consumed.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

impl Default for AtomicSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal for AtomicSignal {
    fn wait(&self) {
        while !self.pending.swap(false, Ordering::AcqRel) {
            #[cfg(feature = "cortex-m")]
            cortex_m::asm::wfe();
            #[cfg(not(feature = "cortex-m"))]
            core::hint::spin_loop();
        }
    }

    fn release(&self) {
        self.pending.store(true, Ordering::Release);
        #[cfg(feature = "cortex-m")]
        cortex_m::asm::sev();
    }
}

/// Scheduling priority of a task, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Idle,
    Low,
    Normal,
    High,
    /// Audio signal processing.
    Realtime,
}

/// Parameters a board needs to create a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Name reported by the stack overflow hook.
    pub name: &'static str,
    /// Stack depth in machine words.
    pub stack_depth: usize,
    pub priority: TaskPriority,
}

impl TaskSpec {
    /// Stack size in bytes for the target's word size.
    pub const fn stack_bytes(&self) -> usize {
        self.stack_depth * core::mem::size_of::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_before_wait_is_latched() {
        let signal = AtomicSignal::new();
        signal.release();
        assert!(signal.is_pending());

        signal.wait(); // returns immediately
        assert!(!signal.is_pending());
    }

    #[test]
    fn repeated_releases_collapse() {
        let signal = AtomicSignal::new();
        signal.release();
        signal.release();
        signal.wait();
        assert!(!signal.is_pending(), "second release must not stay latched");
    }

    #[test]
    fn wait_returns_after_release_from_other_thread() {
        let signal = AtomicSignal::new();
        std::thread::scope(|s| {
            let waiter = s.spawn(|| signal.wait());
            std::thread::sleep(std::time::Duration::from_millis(10));
            signal.release();
            waiter.join().unwrap();
        });
        assert!(!signal.is_pending());
    }

    #[test]
    fn reference_forwards_to_signal() {
        let signal = AtomicSignal::new();
        let by_ref = &signal;
        by_ref.release();
        assert!(signal.is_pending());
        by_ref.wait();
        assert!(!signal.is_pending());
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(TaskPriority::Realtime > TaskPriority::Normal);
        assert!(TaskPriority::Idle < TaskPriority::Low);
    }

    #[test]
    fn stack_bytes_scales_with_word_size() {
        let spec = TaskSpec {
            name: "Audio Task",
            stack_depth: 256,
            priority: TaskPriority::Realtime,
        };
        assert_eq!(spec.stack_bytes(), 256 * core::mem::size_of::<usize>());
    }
}
