//! Double-buffered duplex audio transport.
//!
//! [`DuplexAudio`] gives one audio task a blocking
//! [`transmit_and_receive()`](DuplexAudio::transmit_and_receive) call paced by
//! the hardware sample clock. The interrupt side lives in [`StreamEvents`],
//! which is registered with the [`CallbackRouter`](crate::router::CallbackRouter)
//! and only flips ownership state and releases the task.
//!
//! ## Protocol
//!
//! ```text
//!  DMA     │ streams A │ streams B │ streams A │ streams B │
//!  events  ┴──────────half────────full────────half────────full──
//!  vacated             A           B           A           B
//!  task        wait ─► copy A      wait ─► copy B ...
//! ```
//!
//! The session state records which boundary must come next:
//!
//! | State | Expected event | Vacated region |
//! |-------|----------------|----------------|
//! | `AwaitingHalf` | half-complete | A |
//! | `AwaitingFull` | full-complete | B |
//!
//! Every boundary is consumed exactly once. A boundary out of order, one that
//! arrives before the task consumed the previous one, one that arrives while
//! the stream is idle, or a hardware error, is escalated through the
//! [`FatalHandler`]: a continuous sample clock cannot be paused and resumed
//! without audible corruption.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

use crate::error::Error;
use crate::fault::{Fault, FatalHandler, StreamFault};
use crate::router::{CallbackRouter, EventCategory, InterruptClient, PeripheralHandle};
use crate::signal::Signal;

use super::port::{AudioPort, Region};

/// Transport session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Streaming has not started.
    Idle = 0,
    /// DMA is on region A; half-complete comes next.
    AwaitingHalf = 1,
    /// DMA is on region B; full-complete comes next.
    AwaitingFull = 2,
    /// A streaming fault was escalated.
    Error = 3,
}

impl SessionState {
    const fn from_bits(bits: u8) -> Self {
        match bits {
            0 => SessionState::Idle,
            1 => SessionState::AwaitingHalf,
            2 => SessionState::AwaitingFull,
            _ => SessionState::Error,
        }
    }
}

const NO_FAULT: u8 = u8::MAX;

fn fault_bits(kind: StreamFault) -> u8 {
    match kind {
        StreamFault::Hardware => 0,
        StreamFault::Skipped => 1,
        StreamFault::Overrun => 2,
        StreamFault::Spurious => 3,
    }
}

fn fault_from_bits(bits: u8) -> StreamFault {
    match bits {
        1 => StreamFault::Skipped,
        2 => StreamFault::Overrun,
        3 => StreamFault::Spurious,
        _ => StreamFault::Hardware,
    }
}

/// Interrupt side of the transport.
///
/// Shared between the DMA interrupt (through the router) and the audio task.
/// All fields are single-word atomics; nothing here blocks or allocates.
pub struct StreamEvents<'a, S> {
    tx_handle: PeripheralHandle,
    rx_handle: PeripheralHandle,
    state: AtomicU8,
    /// A boundary has been recorded and not yet consumed by the task.
    pending: AtomicBool,
    vacated: AtomicU8,
    fault: AtomicU8,
    boundaries: AtomicU32,
    signal: S,
    fatal: &'a dyn FatalHandler,
}

impl<'a, S: Signal> StreamEvents<'a, S> {
    /// Create the interrupt side for the peripheral pair `tx_handle`/`rx_handle`.
    pub const fn new(
        tx_handle: PeripheralHandle,
        rx_handle: PeripheralHandle,
        signal: S,
        fatal: &'a dyn FatalHandler,
    ) -> Self {
        StreamEvents {
            tx_handle,
            rx_handle,
            state: AtomicU8::new(SessionState::Idle as u8),
            pending: AtomicBool::new(false),
            vacated: AtomicU8::new(Region::B as u8),
            fault: AtomicU8::new(NO_FAULT),
            boundaries: AtomicU32::new(0),
            signal,
            fatal,
        }
    }

    /// Register for half/full boundaries on the receive handle and for
    /// errors on both handles.
    pub fn bind<const N: usize>(&'a self, router: &mut CallbackRouter<'a, N>) -> Result<(), Error> {
        router.register(EventCategory::HalfComplete, self.rx_handle, self)?;
        router.register(EventCategory::FullComplete, self.rx_handle, self)?;
        router.register(EventCategory::Error, self.rx_handle, self)?;
        if self.tx_handle != self.rx_handle {
            router.register(EventCategory::Error, self.tx_handle, self)?;
        }
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_bits(self.state.load(Ordering::Acquire))
    }

    /// Boundaries accepted since start.
    pub fn boundaries(&self) -> u32 {
        self.boundaries.load(Ordering::Acquire)
    }

    /// Whether a boundary is waiting to be consumed by the task.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// The escalated fault, if any.
    pub fn fault(&self) -> Option<StreamFault> {
        match self.fault.load(Ordering::Acquire) {
            NO_FAULT => None,
            bits => Some(fault_from_bits(bits)),
        }
    }

    /// Prepare for a fresh stream starting on region A.
    fn arm(&self) {
        self.pending.store(false, Ordering::Relaxed);
        self.state
            .store(SessionState::AwaitingHalf as u8, Ordering::Release);
    }

    /// Record a half/full boundary (interrupt context).
    fn on_boundary(&self, vacated: Region) {
        let expected = match self.state() {
            SessionState::AwaitingHalf => Region::A,
            SessionState::AwaitingFull => Region::B,
            SessionState::Idle => self.escalate(StreamFault::Spurious),
            SessionState::Error => return,
        };
        if vacated != expected {
            self.escalate(StreamFault::Skipped);
        }
        if self.pending.load(Ordering::Acquire) {
            self.escalate(StreamFault::Overrun);
        }

        self.vacated.store(vacated as u8, Ordering::Relaxed);
        let next = match vacated {
            Region::A => SessionState::AwaitingFull,
            Region::B => SessionState::AwaitingHalf,
        };
        self.state.store(next as u8, Ordering::Relaxed);
        self.boundaries.fetch_add(1, Ordering::AcqRel);
        self.pending.store(true, Ordering::Release);
        self.signal.release();
    }

    /// Block until the next boundary and return the region it vacated.
    fn wait_vacated(&self) -> Region {
        loop {
            if self.state() == SessionState::Error {
                let kind = self.fault().unwrap_or(StreamFault::Hardware);
                self.fatal.raise(Fault::Streaming(kind));
            }
            if self.pending.swap(false, Ordering::AcqRel) {
                return Region::from_bits(self.vacated.load(Ordering::Relaxed));
            }
            self.signal.wait();
        }
    }

    fn escalate(&self, kind: StreamFault) -> ! {
        self.fault.store(fault_bits(kind), Ordering::Release);
        self.state.store(SessionState::Error as u8, Ordering::Release);
        self.fatal.raise(Fault::Streaming(kind))
    }
}

impl<S: Signal> InterruptClient for StreamEvents<'_, S> {
    fn handles_event(&self, handle: PeripheralHandle, category: EventCategory) -> bool {
        match category {
            EventCategory::HalfComplete if handle == self.rx_handle => {
                self.on_boundary(Region::A);
                true
            }
            EventCategory::FullComplete if handle == self.rx_handle => {
                self.on_boundary(Region::B);
                true
            }
            EventCategory::Error if handle == self.rx_handle || handle == self.tx_handle => {
                self.escalate(StreamFault::Hardware)
            }
            _ => false,
        }
    }
}

/// Task side of the transport: owns the port and serves one audio task.
pub struct DuplexAudio<'a, P, S> {
    port: P,
    events: &'a StreamEvents<'a, S>,
}

impl<'a, P: AudioPort, S: Signal> DuplexAudio<'a, P, S> {
    pub fn new(port: P, events: &'a StreamEvents<'a, S>) -> Self {
        DuplexAudio { port, events }
    }

    /// Samples per channel exchanged by each call.
    pub fn channel_len(&self) -> usize {
        self.port.channel_len()
    }

    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn events(&self) -> &'a StreamEvents<'a, S> {
        self.events
    }

    /// Start streaming if it is not running yet.
    ///
    /// [`transmit_and_receive()`](Self::transmit_and_receive) calls this on
    /// first use.
    pub fn start(&mut self) {
        if self.events.state() == SessionState::Idle {
            self.events.arm();
            self.port.start();
            log::info!("audio streaming started ({} samples/channel)", self.channel_len());
        }
    }

    /// Exchange one frame with the hardware.
    ///
    /// Blocks until DMA vacates the next region, then copies `tx_left` /
    /// `tx_right` into the transmit half DMA streams next and fills `rx_left` /
    /// `rx_right` from the receive half just completed. Samples are passed
    /// through unscaled.
    ///
    /// Returns [`Error::FrameLength`] without blocking if a buffer does not
    /// match [`channel_len()`](Self::channel_len). A streaming fault never
    /// returns; a boundary arriving before the copy has finished is an
    /// overrun.
    pub fn transmit_and_receive(
        &mut self,
        tx_left: &[f32],
        tx_right: &[f32],
        rx_left: &mut [f32],
        rx_right: &mut [f32],
    ) -> Result<(), Error> {
        let expected = self.channel_len();
        for actual in [tx_left.len(), tx_right.len(), rx_left.len(), rx_right.len()] {
            if actual != expected {
                return Err(Error::FrameLength { expected, actual });
            }
        }

        self.start();
        let region = self.events.wait_vacated();
        let boundaries = self.events.boundaries();

        self.port.write_tx(region, tx_left, tx_right);
        self.port.read_rx(region, rx_left, rx_right);

        // DMA wrapped onto `region` before the copy finished.
        if self.events.boundaries() != boundaries {
            self.events.escalate(StreamFault::Overrun);
        }
        Ok(())
    }
}
