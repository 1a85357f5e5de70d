//! Streaming audio peripheral abstraction.
//!
//! The transport never programs peripheral registers. It sees an
//! [`AudioPort`]: two DMA rings (transmit and receive), each split into two
//! regions that the engine streams alternately.
//!
//! ```text
//!            ┌──────────── one ring (per direction) ────────────┐
//!            │ Region A (channel_len frames) │ Region B (…)      │
//!            └───────────────────────────────┴───────────────────┘
//!  half-complete ─┘ (A vacated, DMA on B)      full-complete ─┘ (B vacated, DMA on A)
//! ```
//!
//! [`InterleavedPort`] is the stock adapter: it owns static DMA rings of
//! interleaved stereo words and drives a board-specific [`StreamEngine`].

use core::ptr::NonNull;
use core::sync::atomic::{compiler_fence, Ordering};

use crate::error::Error;
use crate::router::PeripheralHandle;

use super::interleave::{deinterleave, interleave, silence};

/// One of the two regions of a DMA ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    /// First half of the ring.
    A = 0,
    /// Second half of the ring.
    B = 1,
}

impl Region {
    /// The region DMA is not on when this one is vacated.
    pub const fn other(self) -> Region {
        match self {
            Region::A => Region::B,
            Region::B => Region::A,
        }
    }

    pub(crate) const fn from_bits(bits: u8) -> Region {
        if bits == 0 {
            Region::A
        } else {
            Region::B
        }
    }
}

/// A duplex streaming audio peripheral seen through its DMA rings.
///
/// `write_tx` and `read_rx` are only ever called for the region the engine
/// has just vacated.
pub trait AudioPort {
    /// Handle of the transmit peripheral.
    fn tx_handle(&self) -> PeripheralHandle;

    /// Handle of the receive peripheral (the one raising half/full events).
    fn rx_handle(&self) -> PeripheralHandle;

    /// Samples per channel in one region.
    fn channel_len(&self) -> usize;

    /// Start circular streaming from region A of both rings.
    fn start(&mut self);

    /// Stop streaming.
    fn stop(&mut self);

    /// Copy one frame into the transmit ring.
    fn write_tx(&mut self, region: Region, left: &[f32], right: &[f32]);

    /// Copy one frame out of the receive ring.
    fn read_rx(&mut self, region: Region, left: &mut [f32], right: &mut [f32]);
}

/// Board-specific DMA/serial-audio driver behind an [`InterleavedPort`].
pub trait StreamEngine {
    fn tx_handle(&self) -> PeripheralHandle;

    fn rx_handle(&self) -> PeripheralHandle;

    /// Start circular transfers of `words` words over both rings.
    ///
    /// Transmit and receive run from the same serial clock, so their
    /// half/full boundaries coincide.
    fn start(&mut self, tx_ring: *const i32, rx_ring: *mut i32, words: usize);

    fn stop(&mut self);
}

/// [`AudioPort`] over static rings of interleaved stereo `i32` words.
pub struct InterleavedPort<E> {
    engine: E,
    tx: NonNull<i32>,
    rx: NonNull<i32>,
    channel_len: usize,
}

// SAFETY: the rings are `'static` memory handed over exclusively in `new()`;
// the port is the only software accessor and moves with its owning task.
unsafe impl<E: Send> Send for InterleavedPort<E> {}

impl<E: StreamEngine> InterleavedPort<E> {
    /// Words in one ring: two regions of `channel_len` stereo frames.
    pub const fn ring_words(channel_len: usize) -> usize {
        channel_len * 2 * 2
    }

    /// Take ownership of the DMA rings. Both are silenced.
    ///
    /// Fails with [`Error::FrameLength`] if a ring does not hold exactly
    /// [`ring_words(channel_len)`](Self::ring_words) words.
    pub fn new(
        engine: E,
        channel_len: usize,
        tx_ring: &'static mut [i32],
        rx_ring: &'static mut [i32],
    ) -> Result<Self, Error> {
        let expected = Self::ring_words(channel_len);
        for ring in [&*tx_ring, &*rx_ring] {
            if ring.len() != expected {
                return Err(Error::FrameLength {
                    expected,
                    actual: ring.len(),
                });
            }
        }

        silence(tx_ring);
        silence(rx_ring);

        Ok(InterleavedPort {
            engine,
            tx: NonNull::from(tx_ring).cast(),
            rx: NonNull::from(rx_ring).cast(),
            channel_len,
        })
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Words of one transmit region, for diagnostics.
    pub fn tx_words(&self, region: Region) -> &[i32] {
        let (offset, len) = self.region_span(region);
        // SAFETY: in bounds of the ring validated in `new()`.
        unsafe { core::slice::from_raw_parts(self.tx.as_ptr().add(offset), len) }
    }

    /// Words of one receive region, for diagnostics.
    pub fn rx_words(&self, region: Region) -> &[i32] {
        let (offset, len) = self.region_span(region);
        // SAFETY: in bounds of the ring validated in `new()`.
        unsafe { core::slice::from_raw_parts(self.rx.as_ptr().add(offset), len) }
    }

    fn region_span(&self, region: Region) -> (usize, usize) {
        let words = self.channel_len * 2;
        (region as usize * words, words)
    }
}

impl<E: StreamEngine> AudioPort for InterleavedPort<E> {
    fn tx_handle(&self) -> PeripheralHandle {
        self.engine.tx_handle()
    }

    fn rx_handle(&self) -> PeripheralHandle {
        self.engine.rx_handle()
    }

    fn channel_len(&self) -> usize {
        self.channel_len
    }

    fn start(&mut self) {
        compiler_fence(Ordering::SeqCst);
        let words = Self::ring_words(self.channel_len);
        self.engine.start(self.tx.as_ptr(), self.rx.as_ptr(), words);
    }

    fn stop(&mut self) {
        self.engine.stop();
        compiler_fence(Ordering::SeqCst);
    }

    fn write_tx(&mut self, region: Region, left: &[f32], right: &[f32]) {
        let (offset, len) = self.region_span(region);
        // SAFETY: in bounds; the engine is streaming the other region.
        let dest = unsafe { core::slice::from_raw_parts_mut(self.tx.as_ptr().add(offset), len) };
        interleave(dest, left, right);
        compiler_fence(Ordering::Release);
    }

    fn read_rx(&mut self, region: Region, left: &mut [f32], right: &mut [f32]) {
        compiler_fence(Ordering::Acquire);
        let (offset, len) = self.region_span(region);
        // SAFETY: in bounds; the engine finished writing this region.
        let src = unsafe { core::slice::from_raw_parts(self.rx.as_ptr().add(offset), len) };
        deinterleave(src, left, right);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::interleave::to_word;

    const LEN: usize = 8;

    /// Records what the port asked of the hardware.
    #[derive(Default)]
    struct MockEngine {
        started: Option<(usize, usize, usize)>,
        stops: usize,
    }

    impl StreamEngine for MockEngine {
        fn tx_handle(&self) -> PeripheralHandle {
            PeripheralHandle::new(0xB1)
        }

        fn rx_handle(&self) -> PeripheralHandle {
            PeripheralHandle::new(0xA1)
        }

        fn start(&mut self, tx_ring: *const i32, rx_ring: *mut i32, words: usize) {
            self.started = Some((tx_ring as usize, rx_ring as usize, words));
        }

        fn stop(&mut self) {
            self.stops += 1;
        }
    }

    fn leak_ring(len: usize, fill: i32) -> &'static mut [i32] {
        std::boxed::Box::leak(std::vec![fill; len].into_boxed_slice())
    }

    fn port() -> InterleavedPort<MockEngine> {
        let words = InterleavedPort::<MockEngine>::ring_words(LEN);
        InterleavedPort::new(MockEngine::default(), LEN, leak_ring(words, 7), leak_ring(words, 7))
            .unwrap()
    }

    #[test]
    fn ring_words_cover_two_stereo_regions() {
        assert_eq!(InterleavedPort::<MockEngine>::ring_words(128), 512);
    }

    #[test]
    fn new_silences_rings() {
        let port = port();
        assert!(port.tx_words(Region::A).iter().all(|&w| w == 0));
        assert!(port.rx_words(Region::B).iter().all(|&w| w == 0));
        assert_eq!(port.tx_words(Region::B).len(), LEN * 2);
    }

    #[test]
    fn new_rejects_wrong_ring_length() {
        let words = InterleavedPort::<MockEngine>::ring_words(LEN);
        let result = InterleavedPort::new(
            MockEngine::default(),
            LEN,
            leak_ring(words, 0),
            leak_ring(words - 2, 0),
        );
        assert_eq!(
            result.err(),
            Some(Error::FrameLength {
                expected: words,
                actual: words - 2,
            })
        );
    }

    #[test]
    fn start_passes_ring_geometry() {
        let mut port = port();
        port.start();
        let (tx, rx, words) = port.engine().started.unwrap();
        assert_eq!(tx, port.tx_words(Region::A).as_ptr() as usize);
        assert_eq!(rx, port.rx_words(Region::A).as_ptr() as usize);
        assert_eq!(words, LEN * 4);

        port.stop();
        assert_eq!(port.engine().stops, 1);
    }

    #[test]
    fn handles_come_from_engine() {
        let port = port();
        assert_eq!(port.tx_handle(), PeripheralHandle::new(0xB1));
        assert_eq!(port.rx_handle(), PeripheralHandle::new(0xA1));
        assert_eq!(port.channel_len(), LEN);
    }

    #[test]
    fn write_tx_touches_only_requested_region() {
        let mut port = port();
        let left = [0.5f32; LEN];
        let right = [-0.5f32; LEN];

        port.write_tx(Region::B, &left, &right);

        assert!(port.tx_words(Region::A).iter().all(|&w| w == 0));
        for frame in port.tx_words(Region::B).chunks_exact(2) {
            assert_eq!(frame[0], to_word(0.5));
            assert_eq!(frame[1], to_word(-0.5));
        }
    }

    #[test]
    fn read_rx_deinterleaves_region() {
        let mut port = port();
        // Simulate the engine writing region A of the receive ring.
        let base = port.rx.as_ptr();
        for i in 0..LEN {
            unsafe {
                *base.add(i * 2) = to_word(i as f32 / 16.0);
                *base.add(i * 2 + 1) = to_word(-(i as f32) / 16.0);
            }
        }

        let mut left = [0f32; LEN];
        let mut right = [0f32; LEN];
        port.read_rx(Region::A, &mut left, &mut right);

        for i in 0..LEN {
            assert_eq!(left[i], i as f32 / 16.0, "left mismatch at {i}");
            assert_eq!(right[i], -(i as f32) / 16.0, "right mismatch at {i}");
        }
    }

    #[test]
    fn region_other_alternates() {
        assert_eq!(Region::A.other(), Region::B);
        assert_eq!(Region::B.other(), Region::A);
        assert_eq!(Region::from_bits(Region::B as u8), Region::B);
    }
}
