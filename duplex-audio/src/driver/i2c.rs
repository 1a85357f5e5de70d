//! Interrupt-driven I2C master.
//!
//! [`I2cMaster`] implements [`embedded_hal::i2c::I2c`] on top of a
//! non-blocking [`I2cBus`], so any `embedded-hal` device driver (the codec,
//! typically) can run over it from a task.
//!
//! Each operation of a transaction is one interrupt-driven transfer; the bus
//! is told whether to finish with a STOP or keep the line for a repeated
//! START.

use core::fmt;

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};

use crate::signal::Signal;

use super::completion::TransferCompletion;

/// Errors reported by an I2C bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum I2cError {
    /// No device acknowledged the address or a data byte.
    #[error("I2C no acknowledge")]
    Nack,
    #[error("I2C arbitration lost")]
    ArbitrationLoss,
    /// Misplaced START/STOP or other bus-level error.
    #[error("I2C bus error")]
    Bus,
    #[error("I2C overrun")]
    Overrun,
    /// The peripheral is still busy with a previous transfer.
    #[error("I2C busy")]
    Busy,
}

impl embedded_hal::i2c::Error for I2cError {
    fn kind(&self) -> ErrorKind {
        match self {
            I2cError::Nack => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
            I2cError::ArbitrationLoss => ErrorKind::ArbitrationLoss,
            I2cError::Bus => ErrorKind::Bus,
            I2cError::Overrun => ErrorKind::Overrun,
            I2cError::Busy => ErrorKind::Other,
        }
    }
}

/// Non-blocking I2C master hardware access.
///
/// `start_*` only arms the transfer; completion is signalled through the
/// router. `stop` selects STOP (`true`) or repeated START (`false`) after
/// the transfer.
pub trait I2cBus {
    fn start_write(&mut self, address: u8, bytes: &[u8], stop: bool) -> Result<(), I2cError>;

    fn start_read(&mut self, address: u8, buf: &mut [u8], stop: bool) -> Result<(), I2cError>;

    /// Error latched by the last failed transfer.
    fn take_error(&mut self) -> I2cError;
}

/// Blocking I2C master over an interrupt-driven bus.
pub struct I2cMaster<'a, B, S> {
    bus: B,
    completion: &'a TransferCompletion<S>,
}

impl<'a, B: I2cBus, S: Signal> I2cMaster<'a, B, S> {
    pub fn new(bus: B, completion: &'a TransferCompletion<S>) -> Self {
        I2cMaster { bus, completion }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Check whether a device acknowledges `address`.
    ///
    /// Sends an empty write. A NACK means "nobody there"; any other error is
    /// returned.
    pub fn probe(&mut self, address: u8) -> Result<bool, I2cError> {
        match self.write_op(address, &[], true) {
            Ok(()) => Ok(true),
            Err(I2cError::Nack) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Probe every 7-bit address and print a map of the bus to `out`.
    ///
    /// ```text
    ///    | 00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F
    /// ---+------------------------------------------------
    ///  0 | -- -- -- ...
    /// 30 | -- -- -- -- -- -- -- -- 38 -- ...
    /// ```
    ///
    /// `--` marks no device, `??` an unexpected bus error.
    pub fn scan<W: fmt::Write>(&mut self, out: &mut W) -> fmt::Result {
        out.write_str("\n            Probing I2C devices \n")?;
        out.write_str("   | 00 01 02 03 04 05 06 07 08 09 0A 0B 0C 0D 0E 0F\n")?;
        out.write_str("---+------------------------------------------------\n")?;
        for row in (0u8..128).step_by(16) {
            write!(out, "{row:2x} |")?;
            for address in row..row + 16 {
                match self.probe(address) {
                    Ok(true) => write!(out, " {address:2X}")?,
                    Ok(false) => out.write_str(" --")?,
                    Err(_) => out.write_str(" ??")?,
                }
            }
            out.write_str("\n")?;
        }
        Ok(())
    }

    fn write_op(&mut self, address: u8, bytes: &[u8], stop: bool) -> Result<(), I2cError> {
        self.completion.begin();
        if let Err(e) = self.bus.start_write(address, bytes, stop) {
            self.completion.cancel();
            return Err(e);
        }
        self.finish()
    }

    fn read_op(&mut self, address: u8, buf: &mut [u8], stop: bool) -> Result<(), I2cError> {
        self.completion.begin();
        if let Err(e) = self.bus.start_read(address, buf, stop) {
            self.completion.cancel();
            return Err(e);
        }
        self.finish()
    }

    fn finish(&mut self) -> Result<(), I2cError> {
        if self.completion.wait() {
            Ok(())
        } else {
            Err(self.bus.take_error())
        }
    }
}

impl<B: I2cBus, S: Signal> ErrorType for I2cMaster<'_, B, S> {
    type Error = I2cError;
}

impl<B: I2cBus, S: Signal> I2c for I2cMaster<'_, B, S> {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let last = operations.len().saturating_sub(1);
        for (i, op) in operations.iter_mut().enumerate() {
            let stop = i == last;
            match op {
                Operation::Write(bytes) => self.write_op(address, bytes, stop)?,
                Operation::Read(buf) => self.read_op(address, buf, stop)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CODEC_I2C_ADDRESS;
    use crate::router::{EventCategory, InterruptClient, PeripheralHandle};
    use crate::signal::AtomicSignal;
    use std::string::String;
    use std::vec::Vec;

    const HANDLE: PeripheralHandle = PeripheralHandle::new(0x4000_5400);

    #[derive(Debug, PartialEq)]
    enum Transfer {
        Write(u8, Vec<u8>, bool),
        Read(u8, usize, bool),
    }

    /// Bus with one device at the codec address holding an 8-bit register file.
    struct SimBus<'a> {
        completion: &'a TransferCompletion<AtomicSignal>,
        log: Vec<Transfer>,
        registers: [u8; 4],
        pointer: usize,
        broken: Option<u8>,
        error: Option<I2cError>,
    }

    impl<'a> SimBus<'a> {
        fn new(completion: &'a TransferCompletion<AtomicSignal>) -> Self {
            SimBus {
                completion,
                log: Vec::new(),
                registers: [0x10, 0x20, 0x30, 0x40],
                pointer: 0,
                broken: None,
                error: None,
            }
        }

        fn finish(&mut self, address: u8) {
            let category = if self.broken == Some(address) {
                self.error = Some(I2cError::Bus);
                EventCategory::Error
            } else if address != CODEC_I2C_ADDRESS {
                self.error = Some(I2cError::Nack);
                EventCategory::Error
            } else {
                EventCategory::TransmitComplete
            };
            assert!(self.completion.handles_event(HANDLE, category));
        }
    }

    impl I2cBus for SimBus<'_> {
        fn start_write(&mut self, address: u8, bytes: &[u8], stop: bool) -> Result<(), I2cError> {
            self.log.push(Transfer::Write(address, bytes.to_vec(), stop));
            if address == CODEC_I2C_ADDRESS {
                if let Some((&reg, data)) = bytes.split_first() {
                    self.pointer = reg as usize;
                    for (i, &b) in data.iter().enumerate() {
                        self.registers[self.pointer + i] = b;
                    }
                }
            }
            self.finish(address);
            Ok(())
        }

        fn start_read(&mut self, address: u8, buf: &mut [u8], stop: bool) -> Result<(), I2cError> {
            self.log.push(Transfer::Read(address, buf.len(), stop));
            if address == CODEC_I2C_ADDRESS {
                buf.copy_from_slice(&self.registers[self.pointer..self.pointer + buf.len()]);
            }
            self.finish(address);
            Ok(())
        }

        fn take_error(&mut self) -> I2cError {
            self.error.take().unwrap_or(I2cError::Bus)
        }
    }

    #[test]
    fn write_read_uses_repeated_start() {
        let completion = TransferCompletion::new(HANDLE, AtomicSignal::new());
        let mut master = I2cMaster::new(SimBus::new(&completion), &completion);

        let mut value = [0u8; 2];
        master
            .write_read(CODEC_I2C_ADDRESS, &[1], &mut value)
            .unwrap();

        assert_eq!(value, [0x20, 0x30]);
        assert_eq!(
            master.bus().log,
            [
                Transfer::Write(CODEC_I2C_ADDRESS, std::vec![1], false),
                Transfer::Read(CODEC_I2C_ADDRESS, 2, true),
            ]
        );
    }

    #[test]
    fn write_updates_device() {
        let completion = TransferCompletion::new(HANDLE, AtomicSignal::new());
        let mut master = I2cMaster::new(SimBus::new(&completion), &completion);

        master.write(CODEC_I2C_ADDRESS, &[2, 0xAB]).unwrap();
        assert_eq!(master.bus().registers[2], 0xAB);
    }

    #[test]
    fn missing_device_reports_nack_kind() {
        let completion = TransferCompletion::new(HANDLE, AtomicSignal::new());
        let mut master = I2cMaster::new(SimBus::new(&completion), &completion);

        let err = master.write(0x1A, &[0]).unwrap_err();
        assert_eq!(err, I2cError::Nack);
        assert_eq!(
            embedded_hal::i2c::Error::kind(&err),
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown)
        );
    }

    #[test]
    fn probe_distinguishes_nack_from_errors() {
        let completion = TransferCompletion::new(HANDLE, AtomicSignal::new());
        let mut bus = SimBus::new(&completion);
        bus.broken = Some(0x50);
        let mut master = I2cMaster::new(bus, &completion);

        assert_eq!(master.probe(CODEC_I2C_ADDRESS), Ok(true));
        assert_eq!(master.probe(0x20), Ok(false));
        assert_eq!(master.probe(0x50), Err(I2cError::Bus));
    }

    #[test]
    fn scan_prints_bus_map() {
        let completion = TransferCompletion::new(HANDLE, AtomicSignal::new());
        let mut bus = SimBus::new(&completion);
        bus.broken = Some(0x7F);
        let mut master = I2cMaster::new(bus, &completion);

        let mut out = String::new();
        master.scan(&mut out).unwrap();

        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 1 + 3 + 8);
        assert_eq!(lines[4], " 0 | -- -- -- -- -- -- -- -- -- -- -- -- -- -- -- --");
        assert_eq!(lines[7], "30 | -- -- -- -- -- -- -- -- 38 -- -- -- -- -- -- --");
        assert!(lines[11].ends_with("-- ??"));
        assert_eq!(master.bus().log.len(), 128);
    }
}
