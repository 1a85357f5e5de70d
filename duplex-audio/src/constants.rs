/// Samples per channel in one audio frame (one DMA region).
pub const AUDIO_CHANNEL_LEN: usize = 128;

/// Nominal sample rate in Hz.
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// 7-bit I2C address of the codec on the reference boards.
pub const CODEC_I2C_ADDRESS: u8 = 0x38;

/// Codec master clock crystal frequency in Hz.
pub const CODEC_MASTER_CLOCK: u32 = 12_000_000;

/// Upper bound on router bindings across all event categories.
pub const MAX_BINDINGS: usize = 16;

/// Stack depth, in words, given to the audio task.
pub const AUDIO_TASK_STACK_DEPTH: usize = 256;

/// Delay between codec readiness and unmuting, in milliseconds.
pub const UNMUTE_SETTLE_MS: u32 = 30;

// ── System Control Block fault registers (ARMv7-M) ─────────────────────────

/// Configurable Fault Status Register.
pub const SCB_CFSR: usize = 0xE000_ED28;
/// HardFault Status Register.
pub const SCB_HFSR: usize = 0xE000_ED2C;
/// Debug Fault Status Register.
pub const SCB_DFSR: usize = 0xE000_ED30;
/// MemManage Fault Address Register.
pub const SCB_MMFAR: usize = 0xE000_ED34;
/// BusFault Address Register.
pub const SCB_BFAR: usize = 0xE000_ED38;
/// Auxiliary Fault Status Register.
pub const SCB_AFSR: usize = 0xE000_ED3C;

/// EXC_RETURN bit selecting the process stack on exception return.
pub const EXC_RETURN_SPSEL: u32 = 1 << 2;
