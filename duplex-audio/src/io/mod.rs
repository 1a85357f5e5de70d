//! Duplex audio streaming.
//!
//! ## Components
//!
//! | Item | Side | Description |
//! |------|------|-------------|
//! | [`DuplexAudio`] | task | Blocking `transmit_and_receive()` paced by DMA |
//! | [`StreamEvents`] | interrupt | Half/full/error events from the router |
//! | [`AudioPort`] | both | Streaming peripheral seen through two DMA regions |
//! | [`InterleavedPort`] | both | `AudioPort` over static interleaved `i32` rings |
//!
//! ## Utilities
//!
//! - [`interleave`]: `f32` planar ↔ interleaved stereo word conversion
//!
//! ## DMA Buffer Layout
//!
//! Each direction uses one circular ring split into regions A and B:
//! - Each region holds `channel_len` stereo frames (two `i32` words per frame)
//! - DMA fires half-complete after region A and full-complete after region B
//! - The task fills/reads the vacated region while DMA streams the other one

pub mod interleave;
pub mod port;
pub mod transport;

pub use port::{AudioPort, InterleavedPort, Region, StreamEngine};
pub use transport::{DuplexAudio, SessionState, StreamEvents};
