//! Interrupt-driven UART console.
//!
//! [`UartConsole`] turns a non-blocking [`UartPort`] into a blocking
//! `core::fmt::Write` sink: each write starts a transfer and sleeps on the
//! shared [`TransferCompletion`] until the router delivers the
//! transmit-complete (or error) event.

use core::fmt;

use crate::signal::Signal;

use super::completion::TransferCompletion;

/// Errors reported by a UART peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UartError {
    #[error("UART framing error")]
    Framing,
    #[error("UART noise error")]
    Noise,
    #[error("UART receive overrun")]
    Overrun,
    #[error("UART parity error")]
    Parity,
    /// The peripheral is still busy with a previous transfer.
    #[error("UART busy")]
    Busy,
}

/// Non-blocking UART hardware access.
///
/// `start_*` only arms the transfer; completion is signalled through the
/// router. Buffers must stay valid until then, which [`UartConsole`]
/// guarantees by waiting before returning.
pub trait UartPort {
    fn start_transmit(&mut self, bytes: &[u8]) -> Result<(), UartError>;

    fn start_receive(&mut self, buf: &mut [u8]) -> Result<(), UartError>;

    /// Error latched by the last failed transfer.
    fn take_error(&mut self) -> UartError;
}

/// Blocking console over an interrupt-driven UART.
pub struct UartConsole<'a, U, S> {
    port: U,
    completion: &'a TransferCompletion<S>,
}

impl<'a, U: UartPort, S: Signal> UartConsole<'a, U, S> {
    pub fn new(port: U, completion: &'a TransferCompletion<S>) -> Self {
        UartConsole { port, completion }
    }

    pub fn port(&self) -> &U {
        &self.port
    }

    pub fn port_mut(&mut self) -> &mut U {
        &mut self.port
    }

    /// Transmit `bytes` and block until the peripheral is done.
    pub fn transmit(&mut self, bytes: &[u8]) -> Result<(), UartError> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.completion.begin();
        if let Err(e) = self.port.start_transmit(bytes) {
            self.completion.cancel();
            return Err(e);
        }
        self.finish()
    }

    /// Fill `buf` and block until the peripheral is done.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<(), UartError> {
        if buf.is_empty() {
            return Ok(());
        }
        self.completion.begin();
        if let Err(e) = self.port.start_receive(buf) {
            self.completion.cancel();
            return Err(e);
        }
        self.finish()
    }

    fn finish(&mut self) -> Result<(), UartError> {
        if self.completion.wait() {
            Ok(())
        } else {
            Err(self.port.take_error())
        }
    }
}

impl<U: UartPort, S: Signal> fmt::Write for UartConsole<'_, U, S> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.transmit(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::{EventCategory, InterruptClient, PeripheralHandle};
    use crate::signal::AtomicSignal;
    use core::fmt::Write;
    use std::vec::Vec;

    const HANDLE: PeripheralHandle = PeripheralHandle::new(0x4000_4800);

    /// UART whose "interrupt" fires synchronously on start.
    struct LoopbackUart<'a> {
        completion: &'a TransferCompletion<AtomicSignal>,
        sent: Vec<u8>,
        incoming: Vec<u8>,
        fail_with: Option<UartError>,
    }

    impl<'a> LoopbackUart<'a> {
        fn new(completion: &'a TransferCompletion<AtomicSignal>) -> Self {
            LoopbackUart {
                completion,
                sent: Vec::new(),
                incoming: Vec::new(),
                fail_with: None,
            }
        }

        fn fire(&self, category: EventCategory) {
            let category = if self.fail_with.is_some() {
                EventCategory::Error
            } else {
                category
            };
            assert!(self.completion.handles_event(HANDLE, category));
        }
    }

    impl UartPort for LoopbackUart<'_> {
        fn start_transmit(&mut self, bytes: &[u8]) -> Result<(), UartError> {
            self.sent.extend_from_slice(bytes);
            self.fire(EventCategory::TransmitComplete);
            Ok(())
        }

        fn start_receive(&mut self, buf: &mut [u8]) -> Result<(), UartError> {
            if buf.len() > self.incoming.len() {
                return Err(UartError::Busy);
            }
            let rest = self.incoming.split_off(buf.len());
            buf.copy_from_slice(&self.incoming);
            self.incoming = rest;
            self.fire(EventCategory::ReceiveComplete);
            Ok(())
        }

        // The line fault stays latched until the test clears it.
        fn take_error(&mut self) -> UartError {
            self.fail_with.unwrap_or(UartError::Framing)
        }
    }

    #[test]
    fn formatted_output_reaches_port() {
        let completion = TransferCompletion::new(HANDLE, AtomicSignal::new());
        let mut console = UartConsole::new(LoopbackUart::new(&completion), &completion);

        write!(console, "Hello {} \n", 42).unwrap();

        assert_eq!(console.port().sent, b"Hello 42 \n");
    }

    #[test]
    fn receive_fills_buffer() {
        let completion = TransferCompletion::new(HANDLE, AtomicSignal::new());
        let mut uart = LoopbackUart::new(&completion);
        uart.incoming = b"abc".to_vec();
        let mut console = UartConsole::new(uart, &completion);

        let mut buf = [0u8; 2];
        console.receive(&mut buf).unwrap();
        assert_eq!(&buf, b"ab");
    }

    #[test]
    fn error_event_surfaces_port_error() {
        let completion = TransferCompletion::new(HANDLE, AtomicSignal::new());
        let mut uart = LoopbackUart::new(&completion);
        uart.fail_with = Some(UartError::Parity);
        let mut console = UartConsole::new(uart, &completion);

        assert_eq!(console.transmit(b"x"), Err(UartError::Parity));
        assert!(console.write_str("y").is_err());

        console.port_mut().fail_with = None;
        assert_eq!(console.transmit(b"z"), Ok(()));
        assert_eq!(console.port().sent, b"xyz");
    }

    #[test]
    fn refused_start_leaves_completion_idle() {
        let completion = TransferCompletion::new(HANDLE, AtomicSignal::new());
        let mut console = UartConsole::new(LoopbackUart::new(&completion), &completion);

        let mut buf = [0u8; 4];
        assert_eq!(console.receive(&mut buf), Err(UartError::Busy));
        assert_eq!(completion.outcome(), super::super::completion::Outcome::Idle);
    }
}
