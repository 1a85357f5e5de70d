//! `std` backend for running the platform on a host.
//!
//! Tasks become threads, the [`Signal`] becomes a mutex/condvar pair and the
//! fault sink is standard error. Used by the tests and the simulation demo.

use core::fmt;
use std::io::Write as _;
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::delay::DelayNs;

use crate::fault::{FaultRegisters, FaultStatus, PostMortem};
use crate::signal::{Signal, TaskSpec};

/// Smallest stack handed to a host thread; target stack depths are far too
/// small for std formatting.
const MIN_HOST_STACK: usize = 64 * 1024;

/// Latched [`Signal`] that parks the waiting thread.
pub struct ThreadSignal {
    pending: Mutex<bool>,
    wake: Condvar,
}

impl ThreadSignal {
    pub const fn new() -> Self {
        ThreadSignal {
            pending: Mutex::new(false),
            wake: Condvar::new(),
        }
    }
}

impl Default for ThreadSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl Signal for ThreadSignal {
    fn wait(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        while !*pending {
            pending = self
                .wake
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *pending = false;
    }

    fn release(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.wake.notify_one();
    }
}

/// Create a thread for `spec`.
///
/// The thread carries the task name; the stack is at least
/// [`stack_bytes()`](TaskSpec::stack_bytes). Host threads have no priorities,
/// so the priority is only logged.
pub fn spawn_task<F, T>(spec: &TaskSpec, body: F) -> std::io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    log::debug!(
        "spawning task \"{}\" ({} words, {:?})",
        spec.name,
        spec.stack_depth,
        spec.priority
    );
    thread::Builder::new()
        .name(spec.name.into())
        .stack_size(spec.stack_bytes().max(MIN_HOST_STACK))
        .spawn(body)
}

/// Fault sink writing to standard error.
///
/// Write failures are ignored: a fault report must never block on I/O.
#[derive(Debug, Default)]
pub struct StderrSink;

impl fmt::Write for StderrSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let _ = std::io::stderr().write_all(s.as_bytes());
        Ok(())
    }
}

/// Hosts have no System Control Block; every register reads as zero.
#[derive(Debug, Default)]
pub struct NoFaultRegisters;

impl FaultRegisters for NoFaultRegisters {
    fn read(&self) -> FaultStatus {
        FaultStatus::default()
    }
}

/// Post-mortem that terminates the process with the given exit code.
#[derive(Debug)]
pub struct ExitProcess(pub i32);

impl PostMortem for ExitProcess {
    fn halt(&self) -> ! {
        let _ = std::io::stderr().flush();
        std::process::exit(self.0)
    }
}

/// [`DelayNs`] backed by `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SleepDelay;

impl DelayNs for SleepDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(u64::from(ns)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::TaskPriority;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn release_before_wait_is_latched() {
        let signal = ThreadSignal::new();
        signal.release();
        signal.release();
        signal.wait();
        assert!(!*signal.pending.lock().unwrap());
    }

    #[test]
    fn wait_blocks_until_release() {
        let signal = Arc::new(ThreadSignal::new());
        let woke = Arc::new(AtomicBool::new(false));

        let waiter = {
            let signal = Arc::clone(&signal);
            let woke = Arc::clone(&woke);
            thread::spawn(move || {
                signal.wait();
                woke.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!woke.load(Ordering::SeqCst));
        signal.release();
        waiter.join().unwrap();
        assert!(woke.load(Ordering::SeqCst));
    }

    #[test]
    fn spawned_task_carries_name() {
        let spec = TaskSpec {
            name: "Audio Task",
            stack_depth: 256,
            priority: TaskPriority::Realtime,
        };
        let handle = spawn_task(&spec, || thread::current().name().map(String::from)).unwrap();
        assert_eq!(handle.join().unwrap().as_deref(), Some("Audio Task"));
    }

    #[test]
    fn sleep_delay_waits_at_least_requested_time() {
        let start = Instant::now();
        SleepDelay.delay_ms(5);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn host_registers_read_zero() {
        assert_eq!(NoFaultRegisters.read(), FaultStatus::default());
    }
}
