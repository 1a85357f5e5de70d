//! # duplex-audio
//!
//! A `no_std`, allocation-free real-time backbone for a duplex (input and
//! output) audio path on a microcontroller. Sample frames move between a
//! DMA-driven serial audio peripheral and one audio task, while the UART,
//! I2C and audio drivers share a small set of interrupt entry points.
//!
//! ## Architecture
//!
//! | Layer | Module | Purpose |
//! |-------|--------|---------|
//! | Routing | [`router`] | One interrupt event → the one driver instance that owns it |
//! | Transport | [`io`] | Double-buffered `transmit_and_receive()` paced by DMA |
//! | Sync | [`signal`] / [`gate`] | Task release primitive, one-shot readiness gate |
//! | Faults | [`fault`] | Deterministic fault dump, then a never-returning halt |
//! | Drivers | [`driver`] | Interrupt-driven UART console and I2C master |
//! | Codec | [`codec`] | `AudioCodec` control contract |
//! | Context | [`platform`] | Bring-up context, trampolines, audio and control tasks |
//! | Host | `host` | `std` signal, threads and sinks (feature `std`) |
//!
//! ## Event flow
//!
//! ```text
//!  SAI RX half/full IRQ ─► Platform::on_*() ─► CallbackRouter ─► StreamEvents
//!                                                                    │ release
//!  audio task: transmit_and_receive() ◄──────────────────────────────┘
//!              (copies the vacated region, DMA streams the other one)
//!
//!  SAI error / skipped boundary ─► FatalHandler::raise() ─► report ─► halt
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use duplex_audio::io::{DuplexAudio, StreamEvents};
//! use duplex_audio::platform::TalkThrough;
//!
//! static EVENTS: StreamEvents<'static, AtomicSignal> =
//!     StreamEvents::new(SAI_TX, SAI_RX, AtomicSignal::new(), &FAULTS);
//!
//! // Audio task:
//! let mut audio = DuplexAudio::new(port, &EVENTS);
//! platform.audio_task(&mut audio, TALK.take(), &mut status_led);
//! ```
//!
//! ## Features
//!
//! | Feature | Default | Enables |
//! |---------|---------|---------|
//! | `std` | no | `host` backend (threads, condvar signal, stderr sink) |
//! | `cortex-m` | no | SCB fault registers, `WFE`/`SEV` signal, `HardFault` frame conversion |
//!
//! ## Audio parameters
//!
//! - **Frame length:** 128 samples per channel ([`constants::AUDIO_CHANNEL_LEN`])
//! - **Sample rate:** 48 kHz ([`constants::AUDIO_SAMPLE_RATE`])
//! - **Sample format:** `f32` in `[-1.0, 1.0]`, left-aligned `i32` on the wire

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod constants;
pub mod error;
pub mod router;
pub mod signal;
pub mod gate;
pub mod fault;
pub mod io;
pub mod driver;
pub mod codec;
pub mod platform;

#[cfg(any(test, feature = "std"))]
pub mod host;

pub use error::Error;
pub use fault::{Fault, FatalHandler};
