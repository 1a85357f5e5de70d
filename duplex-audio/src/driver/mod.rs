//! Interrupt-driven transfer drivers.
//!
//! Both drivers share one shape: the task starts a transfer on a
//! non-blocking port trait and sleeps on a [`TransferCompletion`], which is
//! bound in the [`CallbackRouter`](crate::router::CallbackRouter) and claims
//! the completion/error events of its peripheral handle.
//!
//! | Driver | Port trait | Exposes |
//! |--------|------------|---------|
//! | [`UartConsole`] | [`UartPort`] | `core::fmt::Write`, blocking `transmit`/`receive` |
//! | [`I2cMaster`] | [`I2cBus`] | `embedded_hal::i2c::I2c`, bus `scan` |
//!
//! Transfer errors are returned to the caller; they are not faults.

pub mod completion;
pub mod i2c;
pub mod uart;

pub use completion::{Outcome, TransferCompletion};
pub use i2c::{I2cBus, I2cError, I2cMaster};
pub use uart::{UartConsole, UartError, UartPort};
