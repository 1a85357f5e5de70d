//! Interrupt callback routing.
//!
//! A HAL exposes one callback per event kind ("transfer complete", "error", …)
//! and passes the handle of the peripheral that raised it. Several driver
//! instances may sit behind the same callback, so each entry point asks the
//! [`CallbackRouter`] to find the one instance that owns the handle.
//!
//! ```text
//!  DMA / UART / I2C IRQ          CallbackRouter               Driver instances
//! ┌──────────────────┐    ┌───────────────────────────┐    ┌──────────────────┐
//! │ on_full_complete │───►│ FullComplete: [audio]     │───►│ StreamEvents     │
//! │ on_tx_complete   │───►│ TransmitComplete: [uart,  │───►│ TransferCompl.   │
//! │ on_error         │───►│   i2c] Error: [...]       │    │ (uart, i2c)      │
//! └──────────────────┘    └───────────────────────────┘    └──────────────────┘
//! ```
//!
//! Registration happens once at bring-up (`&mut self`); dispatch runs in
//! interrupt context (`&self`) and never locks or allocates.

use core::fmt;

use heapless::Vec;

use crate::error::Error;

/// Opaque identity of a peripheral instance (the address of its HAL handle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralHandle(usize);

impl PeripheralHandle {
    /// Wrap a raw identifier.
    pub const fn new(raw: usize) -> Self {
        PeripheralHandle(raw)
    }

    /// Identify a peripheral by the address of its HAL handle structure.
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        PeripheralHandle(ptr as usize)
    }

    /// The raw identifier.
    pub const fn raw(self) -> usize {
        self.0
    }
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle {:#x}", self.0)
    }
}

/// Kind of interrupt event delivered by a HAL callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Interrupt-driven transmission finished.
    TransmitComplete,
    /// Interrupt-driven reception finished.
    ReceiveComplete,
    /// Circular DMA finished the first half of its ring.
    HalfComplete,
    /// Circular DMA finished the whole ring and wrapped.
    FullComplete,
    /// The peripheral reported an error.
    Error,
    /// External line (EXTI) interrupt.
    External,
}

/// A driver instance that can claim interrupt events.
///
/// Implementations run in interrupt context: they must not block, allocate or
/// take task-level locks.
pub trait InterruptClient: Sync {
    /// Claim the event if `handle` belongs to this instance.
    ///
    /// Returns `true` after performing the event-specific action (typically
    /// releasing a blocked task), `false` if the event is not for this
    /// instance.
    fn handles_event(&self, handle: PeripheralHandle, category: EventCategory) -> bool;
}

struct Binding<'a> {
    category: EventCategory,
    handle: PeripheralHandle,
    client: &'a dyn InterruptClient,
}

/// Fixed-capacity registry mapping event categories to driver instances.
pub struct CallbackRouter<'a, const N: usize> {
    bindings: Vec<Binding<'a>, N>,
}

impl<'a, const N: usize> CallbackRouter<'a, N> {
    /// Create an empty router.
    pub const fn new() -> Self {
        CallbackRouter {
            bindings: Vec::new(),
        }
    }

    /// Bind `client` as the owner of `handle` for `category` events.
    ///
    /// Fails with [`Error::DuplicateBinding`] if the pair is already bound and
    /// with [`Error::RegistryFull`] when no slot is left.
    pub fn register(
        &mut self,
        category: EventCategory,
        handle: PeripheralHandle,
        client: &'a dyn InterruptClient,
    ) -> Result<(), Error> {
        let duplicate = self
            .bindings
            .iter()
            .any(|b| b.category == category && b.handle == handle);
        if duplicate {
            return Err(Error::DuplicateBinding { category, handle });
        }

        self.bindings
            .push(Binding {
                category,
                handle,
                client,
            })
            .map_err(|_| Error::RegistryFull)?;

        log::debug!("bound {} for {:?}", handle, category);
        Ok(())
    }

    /// Offer an event to the instances bound for `category`.
    ///
    /// Only instances registered under `handle` are asked, in registration
    /// order; the first one that claims the event stops the traversal.
    /// `false` only means no instance of this category owns `handle`.
    pub fn dispatch(&self, category: EventCategory, handle: PeripheralHandle) -> bool {
        self.bindings
            .iter()
            .filter(|b| b.category == category && b.handle == handle)
            .any(|b| b.client.handles_event(handle, category))
    }

    /// Try each category in turn until one claims the event.
    ///
    /// An event no category claims is logged as unclaimed and dropped.
    pub fn route(&self, categories: &[EventCategory], handle: PeripheralHandle) -> bool {
        if categories.iter().any(|&c| self.dispatch(c, handle)) {
            return true;
        }
        log::warn!("unclaimed event from {} ({:?})", handle, categories);
        false
    }

    /// Number of bindings across all categories.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Number of instances bound for `category`.
    pub fn bound(&self, category: EventCategory) -> usize {
        self.bindings
            .iter()
            .filter(|b| b.category == category)
            .count()
    }
}

impl<const N: usize> Default for CallbackRouter<'_, N> {
    fn default() -> Self {
        Self::new()
    }
}
