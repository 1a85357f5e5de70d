//! Interrupt-side completion object shared by the transfer drivers.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::error::Error;
use crate::router::{CallbackRouter, EventCategory, InterruptClient, PeripheralHandle};
use crate::signal::Signal;

/// State of the transfer tracked by a [`TransferCompletion`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Outcome {
    /// No transfer started.
    Idle = 0,
    /// A transfer is in flight.
    Pending = 1,
    /// The peripheral reported completion.
    Done = 2,
    /// The peripheral reported an error.
    Failed = 3,
}

impl Outcome {
    const fn from_bits(bits: u8) -> Self {
        match bits {
            1 => Outcome::Pending,
            2 => Outcome::Done,
            3 => Outcome::Failed,
            _ => Outcome::Idle,
        }
    }
}

/// Tracks one interrupt-driven transfer at a time for one peripheral.
///
/// Claims transmit-complete, receive-complete and error events for its
/// handle and releases the task blocked in [`wait()`](Self::wait).
pub struct TransferCompletion<S> {
    handle: PeripheralHandle,
    outcome: AtomicU8,
    signal: S,
}

impl<S: Signal> TransferCompletion<S> {
    pub const fn new(handle: PeripheralHandle, signal: S) -> Self {
        TransferCompletion {
            handle,
            outcome: AtomicU8::new(Outcome::Idle as u8),
            signal,
        }
    }

    pub fn handle(&self) -> PeripheralHandle {
        self.handle
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_bits(self.outcome.load(Ordering::Acquire))
    }

    /// Register for completion and error events of this handle.
    pub fn bind<'a, const N: usize>(
        &'a self,
        router: &mut CallbackRouter<'a, N>,
    ) -> Result<(), Error> {
        for category in [
            EventCategory::TransmitComplete,
            EventCategory::ReceiveComplete,
            EventCategory::Error,
        ] {
            router.register(category, self.handle, self)?;
        }
        Ok(())
    }

    /// Mark a transfer as in flight. Call before starting the hardware.
    pub fn begin(&self) {
        self.outcome.store(Outcome::Pending as u8, Ordering::Release);
    }

    /// Abandon the transfer after the hardware refused to start it.
    pub fn cancel(&self) {
        self.outcome.store(Outcome::Idle as u8, Ordering::Release);
    }

    /// Block until the transfer started with [`begin()`](Self::begin)
    /// finishes. Returns `true` on success, `false` on a reported error.
    pub fn wait(&self) -> bool {
        loop {
            match self.outcome() {
                Outcome::Done => {
                    self.outcome.store(Outcome::Idle as u8, Ordering::Relaxed);
                    return true;
                }
                Outcome::Failed => {
                    self.outcome.store(Outcome::Idle as u8, Ordering::Relaxed);
                    return false;
                }
                Outcome::Idle => return false,
                Outcome::Pending => self.signal.wait(),
            }
        }
    }

    fn complete(&self, result: Outcome) {
        let finished = self.outcome.compare_exchange(
            Outcome::Pending as u8,
            result as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        match finished {
            Ok(_) => self.signal.release(),
            Err(_) => log::warn!("{} completed with no transfer in flight", self.handle),
        }
    }
}

impl<S: Signal> InterruptClient for TransferCompletion<S> {
    fn handles_event(&self, handle: PeripheralHandle, category: EventCategory) -> bool {
        if handle != self.handle {
            return false;
        }
        match category {
            EventCategory::TransmitComplete | EventCategory::ReceiveComplete => {
                self.complete(Outcome::Done);
                true
            }
            EventCategory::Error => {
                self.complete(Outcome::Failed);
                true
            }
            _ => false,
        }
    }
}
