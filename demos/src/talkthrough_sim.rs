//! Talk-through on a simulated board.
//!
//! Brings up the full platform on host threads: a UART console, an I2C
//! master with a codec behind it, and a serial audio interface whose DMA
//! engine is a thread writing a line-input tone into the receive ring. The
//! audio task copies every received frame to the transmit ring.
//!
//! ```text
//!  engine thread ──HalfComplete/FullComplete──┐
//!  uart / i2c "hardware" ──Tx/RxComplete──────┤
//!                                             ▼
//!                                   irq thread: Platform::on_event()
//!                                             │
//!              ┌──────────────────────────────┼───────────────────────┐
//!              ▼                              ▼                       ▼
//!        UartConsole (main)          I2cMaster (codec)      DuplexAudio (audio task)
//! ```
//!
//! Usage:
//!
//! ```text
//! talkthrough_sim [--heartbeats N] [--inject-fault]
//! ```
//!
//! `--inject-fault` makes the engine report a transfer error after 100
//! frames, which ends the run with the fault report on standard error.
//! Set `RUST_LOG=debug` for router and engine detail.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin, StatefulOutputPin};
use embedded_hal::i2c::I2c;
use static_cell::StaticCell;

use duplex_audio::codec::{AudioCodec, CodecChannel};
use duplex_audio::constants::{
    AUDIO_CHANNEL_LEN, AUDIO_SAMPLE_RATE, CODEC_I2C_ADDRESS, CODEC_MASTER_CLOCK,
};
use duplex_audio::driver::{
    I2cBus, I2cError, I2cMaster, TransferCompletion, UartConsole, UartError, UartPort,
};
use duplex_audio::fault::FaultCapture;
use duplex_audio::host::{self, ExitProcess, NoFaultRegisters, SleepDelay, StderrSink, ThreadSignal};
use duplex_audio::io::interleave::{to_sample, to_word};
use duplex_audio::io::{DuplexAudio, InterleavedPort, StreamEngine, StreamEvents};
use duplex_audio::platform::{Platform, PlatformConfig, TalkThrough};
use duplex_audio::router::{EventCategory, PeripheralHandle};

// ── Simulated peripherals ──────────────────────────────────────────────────

const UART: PeripheralHandle = PeripheralHandle::new(0x4000_4800);
const I2C: PeripheralHandle = PeripheralHandle::new(0x4000_5400);
const SAI_TX: PeripheralHandle = PeripheralHandle::new(0x4001_5824);
const SAI_RX: PeripheralHandle = PeripheralHandle::new(0x4001_5804);

const RING_WORDS: usize = InterleavedPort::<SimSai>::ring_words(AUDIO_CHANNEL_LEN);

/// Host threads wake with millisecond jitter; stretch the frame period well
/// past it.
const CLOCK_SLOWDOWN: u32 = 4;

/// Frequency of the tone on the simulated line input.
const TONE_HZ: f32 = 440.0;

const INJECT_FAULT_AFTER: u32 = 100;

type Irq = (EventCategory, PeripheralHandle);

type Codec = SimCodec<I2cMaster<'static, SimI2cBus, ThreadSignal>>;

// ── Program-lifetime objects ───────────────────────────────────────────────

static FAULTS: FaultCapture<StderrSink, NoFaultRegisters, ExitProcess> =
    FaultCapture::new(StderrSink, NoFaultRegisters, ExitProcess(1));

static UART_DONE: TransferCompletion<ThreadSignal> =
    TransferCompletion::new(UART, ThreadSignal::new());

static I2C_DONE: TransferCompletion<ThreadSignal> =
    TransferCompletion::new(I2C, ThreadSignal::new());

static AUDIO_EVENTS: StreamEvents<'static, ThreadSignal> =
    StreamEvents::new(SAI_TX, SAI_RX, ThreadSignal::new(), &FAULTS);

static PLATFORM: StaticCell<Platform<'static, Codec, ThreadSignal>> = StaticCell::new();
static TALK: StaticCell<TalkThrough<AUDIO_CHANNEL_LEN>> = StaticCell::new();
static TX_RING: StaticCell<[i32; RING_WORDS]> = StaticCell::new();
static RX_RING: StaticCell<[i32; RING_WORDS]> = StaticCell::new();

static LED_TOGGLES: AtomicU32 = AtomicU32::new(0);

/// UART that prints to standard output and completes immediately.
struct SimUart {
    irq: Sender<Irq>,
}

impl UartPort for SimUart {
    fn start_transmit(&mut self, bytes: &[u8]) -> Result<(), UartError> {
        print!("{}", String::from_utf8_lossy(bytes));
        self.irq
            .send((EventCategory::TransmitComplete, UART))
            .map_err(|_| UartError::Busy)
    }

    fn start_receive(&mut self, _buf: &mut [u8]) -> Result<(), UartError> {
        // No keyboard on the simulated console.
        Err(UartError::Busy)
    }

    fn take_error(&mut self) -> UartError {
        UartError::Framing
    }
}

/// I2C bus with a single device at the codec address.
struct SimI2cBus {
    irq: Sender<Irq>,
    registers: [u8; 16],
    error: Option<I2cError>,
}

impl SimI2cBus {
    fn complete(&mut self, address: u8, category: EventCategory) -> Result<(), I2cError> {
        let category = if address == CODEC_I2C_ADDRESS {
            category
        } else {
            self.error = Some(I2cError::Nack);
            EventCategory::Error
        };
        self.irq.send((category, I2C)).map_err(|_| I2cError::Busy)
    }
}

impl I2cBus for SimI2cBus {
    fn start_write(&mut self, address: u8, bytes: &[u8], _stop: bool) -> Result<(), I2cError> {
        if address == CODEC_I2C_ADDRESS {
            if let Some((&reg, data)) = bytes.split_first() {
                for (offset, &value) in data.iter().enumerate() {
                    if let Some(slot) = self.registers.get_mut(reg as usize + offset) {
                        *slot = value;
                    }
                }
                log::trace!("codec reg {:#04x} <- {:02x?}", reg, data);
            }
        }
        self.complete(address, EventCategory::TransmitComplete)
    }

    fn start_read(&mut self, address: u8, buf: &mut [u8], _stop: bool) -> Result<(), I2cError> {
        if address == CODEC_I2C_ADDRESS {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = self.registers.get(i).copied().unwrap_or(0);
            }
        }
        self.complete(address, EventCategory::ReceiveComplete)
    }

    fn take_error(&mut self) -> I2cError {
        self.error.take().unwrap_or(I2cError::Bus)
    }
}

/// Minimal codec: one power register, one gain register pair and one mute
/// register per channel, in half-dB steps.
struct SimCodec<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> SimCodec<I> {
    const REG_POWER: u8 = 0x00;

    fn channel_reg(channel: CodecChannel) -> u8 {
        match channel {
            CodecChannel::LineInput => 0x01,
            CodecChannel::AuxInput => 0x03,
            CodecChannel::MicInput => 0x05,
            CodecChannel::LineOutput => 0x07,
            CodecChannel::HeadphoneOutput => 0x09,
        }
    }

    fn i2c_mut(&mut self) -> &mut I {
        &mut self.i2c
    }
}

fn half_db(db: f32) -> u8 {
    ((db * 2.0).round() as i8) as u8
}

impl<I: I2c> AudioCodec for SimCodec<I> {
    type Error = I::Error;

    fn start(&mut self) -> Result<(), Self::Error> {
        log::info!("codec PLL locked to {} Hz master clock", CODEC_MASTER_CLOCK);
        self.i2c.write(self.address, &[Self::REG_POWER, 0x01])
    }

    fn set_gain(
        &mut self,
        channel: CodecChannel,
        left_db: f32,
        right_db: f32,
    ) -> Result<(), Self::Error> {
        let reg = Self::channel_reg(channel);
        self.i2c
            .write(self.address, &[reg, half_db(left_db), half_db(right_db)])
    }

    fn mute(&mut self, channel: CodecChannel, mute: bool) -> Result<(), Self::Error> {
        // Mute flags follow the gain registers.
        let reg = Self::channel_reg(channel) / 2 + 0x0B;
        self.i2c.write(self.address, &[reg, u8::from(mute)])
    }
}

/// Raw ring pointers handed to the engine thread.
struct Rings {
    tx: *const i32,
    rx: *mut i32,
    words: usize,
}

// SAFETY: the engine thread only touches the region the audio task has not
// been handed, and the rings are 'static.
unsafe impl Send for Rings {}

/// Serial audio interface whose DMA is an engine thread.
struct SimSai {
    irq: Sender<Irq>,
    period: Duration,
    inject_fault: bool,
    running: Arc<AtomicBool>,
}

impl StreamEngine for SimSai {
    fn tx_handle(&self) -> PeripheralHandle {
        SAI_TX
    }

    fn rx_handle(&self) -> PeripheralHandle {
        SAI_RX
    }

    fn start(&mut self, tx_ring: *const i32, rx_ring: *mut i32, words: usize) {
        let rings = Rings {
            tx: tx_ring,
            rx: rx_ring,
            words,
        };
        let irq = self.irq.clone();
        let period = self.period;
        let inject_fault = self.inject_fault;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name("sai-dma".into())
            .spawn(move || run_engine(rings, irq, period, inject_fault, &running));
        if let Err(e) = spawned {
            log::error!("cannot start DMA engine: {}", e);
            let _ = self.irq.send((EventCategory::Error, SAI_RX));
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn run_engine(
    rings: Rings,
    irq: Sender<Irq>,
    period: Duration,
    inject_fault: bool,
    running: &AtomicBool,
) {
    let region_words = rings.words / 2;
    let step = core::f32::consts::TAU * TONE_HZ / AUDIO_SAMPLE_RATE as f32;
    let mut phase = 0.0f32;
    let mut frames = 0u32;
    let mut region = 0usize;

    while running.load(Ordering::SeqCst) {
        thread::sleep(period);

        // Finish streaming `region`: it now holds fresh input and has sent
        // what the task put there.
        let base = region * region_words;
        let mut peak = 0.0f32;
        for frame in 0..region_words / 2 {
            let sample = 0.5 * phase.sin();
            phase = (phase + step) % core::f32::consts::TAU;
            // SAFETY: `base + 2 * frame + 1 < words`; the task is on the
            // other region until the boundary below is raised.
            unsafe {
                let at = base + frame * 2;
                rings.rx.add(at).write_volatile(to_word(sample));
                rings.rx.add(at + 1).write_volatile(to_word(sample));
                peak = peak.max(to_sample(rings.tx.add(at).read_volatile()).abs());
            }
        }

        let category = if region == 0 {
            EventCategory::HalfComplete
        } else {
            EventCategory::FullComplete
        };
        if irq.send((category, SAI_RX)).is_err() {
            return;
        }
        region ^= 1;
        frames += 1;

        if frames % 200 == 0 {
            log::debug!("{} frames streamed, output peak {:.3}", frames, peak);
        }
        if inject_fault && frames == INJECT_FAULT_AFTER {
            log::warn!("injecting SAI transfer error");
            let _ = irq.send((EventCategory::Error, SAI_TX));
            return;
        }
    }
}

/// Status LED counting its toggles.
#[derive(Default)]
struct SimLed {
    lit: bool,
}

impl ErrorType for SimLed {
    type Error = core::convert::Infallible;
}

impl OutputPin for SimLed {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.lit = false;
        LED_TOGGLES.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.lit = true;
        LED_TOGGLES.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl StatefulOutputPin for SimLed {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.lit)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.lit)
    }
}

// ── Bring-up ───────────────────────────────────────────────────────────────

/// Talk-through on a simulated board.
#[derive(Parser, Debug)]
#[command(name = "talkthrough_sim")]
struct Options {
    /// Heartbeat lines to print on the console before exiting.
    #[arg(long, value_name = "N", default_value_t = 10)]
    heartbeats: u32,

    /// Report an SAI transfer error after 100 frames.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    inject_fault: bool,
}

/// Interrupt controller: runs trampolines one at a time, like a single
/// interrupt priority level.
fn run_irq(platform: &'static Platform<'static, Codec, ThreadSignal>, lines: Receiver<Irq>) {
    for (category, handle) in lines {
        platform.on_event(category, handle);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let options = Options::parse();
    let (irq, lines) = mpsc::channel::<Irq>();

    let i2c = I2cMaster::new(
        SimI2cBus {
            irq: irq.clone(),
            registers: [0; 16],
            error: None,
        },
        &I2C_DONE,
    );
    let codec = SimCodec {
        i2c,
        address: CODEC_I2C_ADDRESS,
    };

    let mut platform = Platform::new(codec, ThreadSignal::new(), &FAULTS, PlatformConfig::default());
    let bindings = [
        UART_DONE.bind(platform.router_mut()),
        I2C_DONE.bind(platform.router_mut()),
        AUDIO_EVENTS.bind(platform.router_mut()),
    ];
    for bound in bindings {
        platform.require(bound);
    }
    let platform: &'static _ = PLATFORM.init(platform);
    log::info!("{} router bindings", platform.router().len());

    let irq_thread = thread::Builder::new()
        .name("irq".into())
        .spawn(move || run_irq(platform, lines));
    if let Err(e) = irq_thread {
        log::error!("cannot start irq thread: {}", e);
        std::process::exit(1);
    }

    let frame_period = Duration::from_micros(
        AUDIO_CHANNEL_LEN as u64 * 1_000_000 / u64::from(AUDIO_SAMPLE_RATE),
    ) * CLOCK_SLOWDOWN;
    let sai = SimSai {
        irq: irq.clone(),
        period: frame_period,
        inject_fault: options.inject_fault,
        running: Arc::new(AtomicBool::new(false)),
    };
    let port = platform.require(InterleavedPort::new(
        sai,
        platform.config().channel_len,
        TX_RING.init([0; RING_WORDS]),
        RX_RING.init([0; RING_WORDS]),
    ));

    let talk = TALK.init(TalkThrough::new());
    let audio_task = host::spawn_task(&platform.config().audio_task, move || {
        let mut audio = DuplexAudio::new(port, &AUDIO_EVENTS);
        let mut led = SimLed::default();
        platform.audio_task(&mut audio, talk, &mut led);
    });
    if let Err(e) = audio_task {
        log::error!("cannot start audio task: {}", e);
        std::process::exit(1);
    }

    // Control task: the main thread.
    let mut console = UartConsole::new(SimUart { irq }, &UART_DONE);
    platform.require(platform.control_unmute(&mut SleepDelay));

    match platform.with_codec(|codec| codec.i2c_mut().scan(&mut console)) {
        Ok(Ok(())) => {}
        Ok(Err(_)) => log::warn!("console write failed during bus scan"),
        Err(e) => log::warn!("bus scan skipped: {}", e),
    }

    let mut delay = SleepDelay;
    for count in 0..options.heartbeats {
        let _ = writeln!(
            console,
            "Hello {} ({} frames, {} boundaries)",
            count,
            LED_TOGGLES.load(Ordering::Relaxed),
            AUDIO_EVENTS.boundaries()
        );
        delay.delay_ms(500);
    }

    log::info!("done");
    std::process::exit(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ten_heartbeats_without_fault() {
        let options = Options::try_parse_from(["talkthrough_sim"]).unwrap();
        assert_eq!(options.heartbeats, 10);
        assert!(!options.inject_fault);
    }

    #[test]
    fn parses_both_flags() {
        let options =
            Options::try_parse_from(["talkthrough_sim", "--heartbeats", "3", "--inject-fault"])
                .unwrap();
        assert_eq!(options.heartbeats, 3);
        assert!(options.inject_fault);
    }

    #[test]
    fn rejects_non_numeric_heartbeats() {
        let err = Options::try_parse_from(["talkthrough_sim", "--heartbeats", "abc"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn rejects_unknown_argument() {
        assert!(Options::try_parse_from(["talkthrough_sim", "--loud"]).is_err());
    }
}
