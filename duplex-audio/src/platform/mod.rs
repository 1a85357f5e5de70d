//! Platform context: the objects a board creates once at bring-up.
//!
//! [`Platform`] replaces a process-wide bag of driver pointers with one value
//! that is built during bring-up, then shared by reference with the tasks and
//! the interrupt trampolines for the rest of the program.
//!
//! ## Bring-up
//!
//! ```ignore
//! static PLATFORM: StaticCell<Platform<'static, Codec, AtomicSignal>> = StaticCell::new();
//!
//! let mut platform = Platform::new(codec, AtomicSignal::new(), &FAULTS, PlatformConfig::default());
//! let bindings = [
//!     uart_done.bind(platform.router_mut()),
//!     i2c_done.bind(platform.router_mut()),
//!     stream_events.bind(platform.router_mut()),
//! ];
//! for bound in bindings {
//!     platform.require(bound);
//! }
//! let platform: &'static _ = PLATFORM.init(platform);
//!
//! // HAL callback, e.g. the SAI receive half-complete interrupt:
//! platform.on_half_complete(PeripheralHandle::from_ptr(hsai));
//! ```
//!
//! ## Tasks
//!
//! | Task | Entry | Role |
//! |------|-------|------|
//! | audio | [`Platform::audio_task`] | codec start, gains, release gate, talk-through loop |
//! | control | [`Platform::control_unmute`] | wait for the gate, settle, unmute |
//!
//! Codec I/O is blocking, so the codec is parked in a critical-section
//! mutex and checked out for the duration of a call by
//! [`with_codec()`](Platform::with_codec); the critical section only covers
//! the check-out itself.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::StatefulOutputPin;

use crate::codec::{AudioCodec, CodecChannel};
use crate::constants::{AUDIO_CHANNEL_LEN, AUDIO_TASK_STACK_DEPTH, MAX_BINDINGS, UNMUTE_SETTLE_MS};
use crate::error::Error;
use crate::fatal_assert;
use crate::fault::{Fault, FatalHandler};
use crate::gate::ReadinessGate;
use crate::io::{AudioPort, DuplexAudio};
use crate::router::{CallbackRouter, EventCategory, PeripheralHandle};
use crate::signal::{Signal, TaskPriority, TaskSpec};

/// Runtime parameters fixed at bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformConfig {
    /// Samples per channel exchanged per audio cycle.
    pub channel_len: usize,
    /// How the board should create the audio task.
    pub audio_task: TaskSpec,
    /// Delay between codec readiness and unmuting, in milliseconds.
    pub unmute_settle_ms: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            channel_len: AUDIO_CHANNEL_LEN,
            audio_task: TaskSpec {
                name: "Audio Task",
                stack_depth: AUDIO_TASK_STACK_DEPTH,
                priority: TaskPriority::Realtime,
            },
            unmute_settle_ms: UNMUTE_SETTLE_MS,
        }
    }
}

/// Bring-up context shared by tasks and interrupt trampolines.
pub struct Platform<'a, C, S> {
    router: CallbackRouter<'a, MAX_BINDINGS>,
    codec: Mutex<RefCell<Option<C>>>,
    codec_ready: ReadinessGate<S>,
    fatal: &'a dyn FatalHandler,
    config: PlatformConfig,
}

impl<'a, C: AudioCodec, S: Signal> Platform<'a, C, S> {
    /// Create the context. `ready_signal` backs the codec-ready gate.
    pub fn new(
        codec: C,
        ready_signal: S,
        fatal: &'a dyn FatalHandler,
        config: PlatformConfig,
    ) -> Self {
        Platform {
            router: CallbackRouter::new(),
            codec: Mutex::new(RefCell::new(Some(codec))),
            codec_ready: ReadinessGate::new(ready_signal),
            fatal,
            config,
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    pub fn router(&self) -> &CallbackRouter<'a, MAX_BINDINGS> {
        &self.router
    }

    /// Registration access; only available before the context is shared.
    pub fn router_mut(&mut self) -> &mut CallbackRouter<'a, MAX_BINDINGS> {
        &mut self.router
    }

    pub fn codec_ready(&self) -> &ReadinessGate<S> {
        &self.codec_ready
    }

    pub fn fatal(&self) -> &'a dyn FatalHandler {
        self.fatal
    }

    /// Unwrap a bring-up result, raising [`Fault::Bringup`] on error.
    pub fn require<T>(&self, result: Result<T, Error>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => self.fatal.raise(Fault::Bringup(err)),
        }
    }

    // ── Interrupt trampolines ──────────────────────────────────────────

    /// Route an event of `category` from `handle`. Returns whether a driver
    /// claimed it.
    ///
    /// Each `on_*` entry below corresponds to one HAL callback and one
    /// category, except [`on_transfer_complete`](Self::on_transfer_complete).
    pub fn on_event(&self, category: EventCategory, handle: PeripheralHandle) -> bool {
        self.router.route(&[category], handle)
    }

    /// Completion callback that does not say which direction finished
    /// (full-duplex "TxRx complete"). Tries transmit, then receive.
    pub fn on_transfer_complete(&self, handle: PeripheralHandle) -> bool {
        self.router.route(
            &[EventCategory::TransmitComplete, EventCategory::ReceiveComplete],
            handle,
        )
    }

    pub fn on_transmit_complete(&self, handle: PeripheralHandle) -> bool {
        self.on_event(EventCategory::TransmitComplete, handle)
    }

    pub fn on_receive_complete(&self, handle: PeripheralHandle) -> bool {
        self.on_event(EventCategory::ReceiveComplete, handle)
    }

    pub fn on_half_complete(&self, handle: PeripheralHandle) -> bool {
        self.on_event(EventCategory::HalfComplete, handle)
    }

    pub fn on_full_complete(&self, handle: PeripheralHandle) -> bool {
        self.on_event(EventCategory::FullComplete, handle)
    }

    pub fn on_error(&self, handle: PeripheralHandle) -> bool {
        self.on_event(EventCategory::Error, handle)
    }

    pub fn on_external(&self, handle: PeripheralHandle) -> bool {
        self.on_event(EventCategory::External, handle)
    }

    // ── Codec ──────────────────────────────────────────────────────────

    /// Check the codec out, run `f` on it, and park it again.
    ///
    /// Fails with [`Error::CodecUnavailable`] if another caller holds it.
    pub fn with_codec<R>(&self, f: impl FnOnce(&mut C) -> R) -> Result<R, Error> {
        let mut codec = critical_section::with(|cs| self.codec.borrow_ref_mut(cs).take())
            .ok_or(Error::CodecUnavailable)?;
        let result = f(&mut codec);
        critical_section::with(|cs| *self.codec.borrow_ref_mut(cs) = Some(codec));
        Ok(result)
    }

    /// Start the codec, set 0 dB on line input and headphone output (still
    /// muted) and release the codec-ready gate.
    pub fn prepare_codec(&self) -> Result<(), Error> {
        self.with_codec(|codec| -> Result<(), C::Error> {
            codec.start()?;
            codec.set_gain(CodecChannel::LineInput, 0.0, 0.0)?;
            codec.set_gain(CodecChannel::HeadphoneOutput, 0.0, 0.0)
        })?
        .map_err(|e| {
            log::error!("codec setup failed: {:?}", e);
            Error::CodecControl
        })?;

        log::info!("codec ready");
        self.codec_ready.release();
        Ok(())
    }

    /// Control-task step: wait for the codec, let it settle, then unmute line
    /// input and headphone output.
    pub fn control_unmute<D: DelayNs>(&self, delay: &mut D) -> Result<(), Error> {
        self.codec_ready.wait();
        delay.delay_ms(self.config.unmute_settle_ms);

        self.with_codec(|codec| -> Result<(), C::Error> {
            codec.mute(CodecChannel::LineInput, false)?;
            codec.mute(CodecChannel::HeadphoneOutput, false)
        })?
        .map_err(|e| {
            log::error!("codec unmute failed: {:?}", e);
            Error::CodecControl
        })?;

        log::info!("line input and headphone output unmuted");
        Ok(())
    }

    /// Audio task body: codec bring-up, then talk-through forever.
    ///
    /// `status` is toggled once per cycle. Any failure is fatal.
    pub fn audio_task<P, T, L, const LEN: usize>(
        &self,
        audio: &mut DuplexAudio<'_, P, T>,
        talk: &mut TalkThrough<LEN>,
        status: &mut L,
    ) -> !
    where
        P: AudioPort,
        T: Signal,
        L: StatefulOutputPin,
    {
        self.require(self.prepare_codec());
        fatal_assert!(self.fatal, audio.channel_len() == self.config.channel_len);
        fatal_assert!(self.fatal, LEN == self.config.channel_len);

        loop {
            let cycle = talk.cycle(audio);
            fatal_assert!(self.fatal, cycle.is_ok());
            // Status LED failures are not worth stopping audio for.
            let _ = status.toggle();
        }
    }
}

/// Talk-through frame buffers: every received frame is transmitted on the
/// next cycle.
///
/// Four frames of `LEN` samples; place it in static storage on targets with
/// small task stacks.
pub struct TalkThrough<const LEN: usize> {
    tx_left: [f32; LEN],
    tx_right: [f32; LEN],
    rx_left: [f32; LEN],
    rx_right: [f32; LEN],
    cycles: u32,
}

impl<const LEN: usize> TalkThrough<LEN> {
    /// Start from silence to avoid a click at power-up.
    pub const fn new() -> Self {
        TalkThrough {
            tx_left: [0.0; LEN],
            tx_right: [0.0; LEN],
            rx_left: [0.0; LEN],
            rx_right: [0.0; LEN],
            cycles: 0,
        }
    }

    /// Exchange one frame and copy what was received into the next transmit
    /// frame.
    pub fn cycle<P: AudioPort, S: Signal>(
        &mut self,
        audio: &mut DuplexAudio<'_, P, S>,
    ) -> Result<(), Error> {
        audio.transmit_and_receive(
            &self.tx_left,
            &self.tx_right,
            &mut self.rx_left,
            &mut self.rx_right,
        )?;
        self.tx_left = self.rx_left;
        self.tx_right = self.rx_right;
        self.cycles = self.cycles.wrapping_add(1);
        Ok(())
    }

    /// Completed cycles.
    pub fn cycles(&self) -> u32 {
        self.cycles
    }

    pub fn received(&self) -> (&[f32; LEN], &[f32; LEN]) {
        (&self.rx_left, &self.rx_right)
    }
}

impl<const LEN: usize> Default for TalkThrough<LEN> {
    fn default() -> Self {
        Self::new()
    }
}
