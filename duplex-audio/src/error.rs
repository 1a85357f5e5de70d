//! Recoverable error type.
//!
//! Everything here is reported to the caller as a `Result`. Conditions that
//! cannot be recovered from are expressed as [`Fault`](crate::fault::Fault)
//! instead and never come back as an `Error`.

use crate::router::{EventCategory, PeripheralHandle};

/// Errors reported by bring-up and by the task-side APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The handle is already bound for this event category.
    #[error("{handle} is already bound for {category:?} events")]
    DuplicateBinding {
        category: EventCategory,
        handle: PeripheralHandle,
    },

    /// The router has no free binding slot left.
    #[error("callback router is full")]
    RegistryFull,

    /// A caller buffer does not match the configured channel length.
    #[error("frame length mismatch: expected {expected} samples, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    /// The codec is not parked in the platform (another task holds it).
    #[error("codec is not available")]
    CodecUnavailable,

    /// The codec rejected a control operation.
    #[error("codec control failed")]
    CodecControl,
}
