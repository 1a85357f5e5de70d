//! Fatal fault capture.
//!
//! Every unrecoverable condition ends here: processor exceptions, hardware
//! streaming errors, failed runtime assertions, task stack overflows and
//! bring-up errors. [`FaultCapture`] writes a deterministic report to a
//! diagnostic sink and then hands control to a [`PostMortem`] hook that never
//! returns.
//!
//! ## Exception entry
//!
//! On a hard fault the hardware has pushed eight words onto whichever stack
//! was active. Bit 2 of the EXC_RETURN value in LR tells which one:
//!
//! ```text
//! EXC_RETURN & 0b100 == 0  → main stack (MSP)   handler or pre-scheduler code
//! EXC_RETURN & 0b100 != 0  → process stack (PSP) a task was running
//!
//! sp[0] R0  sp[1] R1  sp[2] R2  sp[3] R3
//! sp[4] R12 sp[5] LR  sp[6] PC  sp[7] xPSR
//! ```
//!
//! [`recover_stack_pointer()`] makes that selection testable. On target the
//! runtime's exception hook provides the frame (see
//! [`StackFrame::from_exception_frame`] with the `cortex-m` feature).
//!
//! ## Report format
//!
//! The report contains no timestamps or counters, so the same snapshot always
//! produces byte-identical output.

use core::cell::RefCell;
use core::fmt::{self, Write};

use critical_section::Mutex;

use crate::constants::EXC_RETURN_SPSEL;
use crate::error::Error;

// ── Captured state ─────────────────────────────────────────────────────────

/// Registers pushed by the processor on exception entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

impl StackFrame {
    /// Build a frame from the eight stacked words in hardware order.
    pub const fn from_words(words: [u32; 8]) -> Self {
        StackFrame {
            r0: words[0],
            r1: words[1],
            r2: words[2],
            r3: words[3],
            r12: words[4],
            lr: words[5],
            pc: words[6],
            xpsr: words[7],
        }
    }

    /// Read the frame the processor stacked at `sp`.
    ///
    /// # Safety
    ///
    /// `sp` must point to eight readable, word-aligned `u32`s, i.e. the stack
    /// pointer recovered on exception entry.
    pub unsafe fn read(sp: *const u32) -> Self {
        let mut words = [0u32; 8];
        for (i, word) in words.iter_mut().enumerate() {
            *word = core::ptr::read_volatile(sp.add(i));
        }
        Self::from_words(words)
    }

    /// Convert the frame handed over by `cortex-m-rt`'s `HardFault` hook.
    #[cfg(feature = "cortex-m")]
    pub fn from_exception_frame(ef: &cortex_m_rt::ExceptionFrame) -> Self {
        StackFrame {
            r0: ef.r0(),
            r1: ef.r1(),
            r2: ef.r2(),
            r3: ef.r3(),
            r12: ef.r12(),
            lr: ef.lr(),
            pc: ef.pc(),
            xpsr: ef.xpsr(),
        }
    }
}

/// Fault status and fault address registers of the System Control Block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultStatus {
    pub cfsr: u32,
    pub hfsr: u32,
    pub dfsr: u32,
    pub afsr: u32,
    pub mmfar: u32,
    pub bfar: u32,
}

/// Source of [`FaultStatus`] snapshots.
pub trait FaultRegisters {
    fn read(&self) -> FaultStatus;
}

/// Reads the live System Control Block registers.
#[cfg(feature = "cortex-m")]
pub struct ScbFaultRegisters;

#[cfg(feature = "cortex-m")]
impl FaultRegisters for ScbFaultRegisters {
    fn read(&self) -> FaultStatus {
        use crate::constants::{SCB_AFSR, SCB_BFAR, SCB_CFSR, SCB_DFSR, SCB_HFSR, SCB_MMFAR};

        // SAFETY: fixed, always-mapped, word-aligned SCB registers on ARMv7-M.
        let reg = |addr: usize| unsafe { core::ptr::read_volatile(addr as *const u32) };
        FaultStatus {
            cfsr: reg(SCB_CFSR),
            hfsr: reg(SCB_HFSR),
            dfsr: reg(SCB_DFSR),
            afsr: reg(SCB_AFSR),
            mmfar: reg(SCB_MMFAR),
            bfar: reg(SCB_BFAR),
        }
    }
}

/// Snapshot taken on a processor exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaultRecord {
    pub frame: StackFrame,
    pub status: FaultStatus,
}

impl fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fr = &self.frame;
        let st = &self.status;
        writeln!(f, "Hard fault or spurious exception")?;
        for (name, value) in [
            ("R0  ", fr.r0),
            ("R1  ", fr.r1),
            ("R2  ", fr.r2),
            ("R3  ", fr.r3),
            ("R12 ", fr.r12),
            ("LR  ", fr.lr),
            ("PC  ", fr.pc),
            ("xPSR", fr.xpsr),
        ] {
            writeln!(f, "  stacked {name} : 0x{value:08X}")?;
        }
        for (name, value) in [
            ("CFSR ", st.cfsr),
            ("HFSR ", st.hfsr),
            ("DFSR ", st.dfsr),
            ("AFSR ", st.afsr),
            ("MMFAR", st.mmfar),
            ("BFAR ", st.bfar),
        ] {
            writeln!(f, "          {name} : 0x{value:08X}")?;
        }
        Ok(())
    }
}

// ── Stack selection ────────────────────────────────────────────────────────

/// Stack that was active when the exception was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveStack {
    /// MSP: handler mode or code running before the scheduler.
    Main,
    /// PSP: a task was running.
    Process,
}

/// Decode the stack selection bit of an EXC_RETURN value.
pub const fn active_stack(exc_return: u32) -> ActiveStack {
    if exc_return & EXC_RETURN_SPSEL == 0 {
        ActiveStack::Main
    } else {
        ActiveStack::Process
    }
}

/// Pick the pre-exception stack pointer from MSP/PSP using EXC_RETURN.
pub const fn recover_stack_pointer(exc_return: u32, msp: u32, psp: u32) -> u32 {
    match active_stack(exc_return) {
        ActiveStack::Main => msp,
        ActiveStack::Process => psp,
    }
}

// ── Fault taxonomy ─────────────────────────────────────────────────────────

/// What went wrong in the audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFault {
    /// The peripheral reported a transfer error.
    Hardware,
    /// A half/full boundary arrived out of order: one was lost.
    Skipped,
    /// A boundary arrived before the task consumed the previous one.
    Overrun,
    /// A boundary arrived while the stream was not running.
    Spurious,
}

/// An unrecoverable condition. Raising one never returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Processor exception (hard fault or unhandled vector).
    Exception(FaultRecord),
    /// Audio streaming can no longer keep the sample clock intact.
    Streaming(StreamFault),
    /// A runtime assertion failed.
    Assertion { file: &'static str, line: u32 },
    /// A task exhausted its stack.
    StackOverflow { task: &'static str },
    /// Bring-up could not construct the platform.
    Bringup(Error),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Exception(record) => fmt::Display::fmt(record, f),
            Fault::Streaming(kind) => writeln!(f, "Audio streaming fault: {kind:?}"),
            Fault::Assertion { file, line } => {
                writeln!(f, "Assertion failed: file {file} on line {line}")
            }
            Fault::StackOverflow { task } => writeln!(f, "Stack overflow at task : {task}"),
            Fault::Bringup(err) => writeln!(f, "Bring-up failed: {err}"),
        }
    }
}

// ── Escalation ─────────────────────────────────────────────────────────────

/// Terminal escalation path shared by every component.
pub trait FatalHandler: Sync {
    /// Report `fault` and stop. Never returns.
    fn raise(&self, fault: Fault) -> !;
}

/// What happens after the report has been written.
pub trait PostMortem {
    fn halt(&self) -> !;
}

/// Disable interrupts and park the core until a watchdog or debugger resets it.
#[cfg(feature = "cortex-m")]
pub struct Halt;

#[cfg(feature = "cortex-m")]
impl PostMortem for Halt {
    fn halt(&self) -> ! {
        cortex_m::interrupt::disable();
        loop {
            cortex_m::asm::wfi();
        }
    }
}

/// Request a system reset.
#[cfg(feature = "cortex-m")]
pub struct Reset;

#[cfg(feature = "cortex-m")]
impl PostMortem for Reset {
    fn halt(&self) -> ! {
        cortex_m::peripheral::SCB::sys_reset()
    }
}

/// Writes fault reports to a diagnostic sink, then runs the post-mortem hook.
pub struct FaultCapture<W, R, P> {
    sink: Mutex<RefCell<W>>,
    registers: R,
    post_mortem: P,
}

impl<W, R, P> FaultCapture<W, R, P>
where
    W: Write + Send,
    R: FaultRegisters + Sync,
    P: PostMortem + Sync,
{
    pub const fn new(sink: W, registers: R, post_mortem: P) -> Self {
        FaultCapture {
            sink: Mutex::new(RefCell::new(sink)),
            registers,
            post_mortem,
        }
    }

    /// Entry from the exception hook with the recovered stack pointer.
    ///
    /// # Safety
    ///
    /// `sp` must be the stack pointer selected by [`recover_stack_pointer()`]
    /// on exception entry.
    pub unsafe fn on_exception(&self, sp: *const u32) -> ! {
        self.on_exception_frame(StackFrame::read(sp))
    }

    /// Entry from a runtime hook that already decoded the stacked frame.
    pub fn on_exception_frame(&self, frame: StackFrame) -> ! {
        let record = FaultRecord {
            frame,
            status: self.registers.read(),
        };
        self.raise(Fault::Exception(record))
    }

    /// Entry from the RTOS stack overflow hook.
    pub fn on_stack_overflow(&self, task: &'static str) -> ! {
        self.raise(Fault::StackOverflow { task })
    }

    /// Write the report for `fault` without halting.
    fn report(&self, fault: &Fault) {
        critical_section::with(|cs| {
            // A fault raised while a report is being written must not
            // re-enter the sink.
            if let Ok(mut sink) = self.sink.borrow(cs).try_borrow_mut() {
                let _ = write!(sink, "\n{fault}");
            }
        });
    }
}

impl<W, R, P> FatalHandler for FaultCapture<W, R, P>
where
    W: Write + Send,
    R: FaultRegisters + Sync,
    P: PostMortem + Sync,
{
    /// The report is the only output; the `log` backend may sit on a
    /// blocking console and is not touched here.
    fn raise(&self, fault: Fault) -> ! {
        self.report(&fault);
        self.post_mortem.halt()
    }
}

/// Raise [`Fault::Assertion`] through `$fatal` when `$cond` is false.
///
/// ```ignore
/// fatal_assert!(platform.fatal(), rx_left.len() == AUDIO_CHANNEL_LEN);
/// ```
#[macro_export]
macro_rules! fatal_assert {
    ($fatal:expr, $cond:expr $(,)?) => {
        if !$cond {
            $crate::fault::FatalHandler::raise(
                $fatal,
                $crate::fault::Fault::Assertion {
                    file: file!(),
                    line: line!(),
                },
            )
        }
    };
}
