//! Conversion between planar `f32` channels and the interleaved DMA words.
//!
//! ## DMA Word Format
//!
//! Each stereo frame occupies two consecutive `i32` slots: left, then right.
//! Samples are left-aligned signed fixed point, so a codec running 24-bit or
//! 16-bit slots simply ignores the low bits:
//!
//! ```text
//! f32  -1.0 ..= 1.0   ×2³¹  →  i32  i32::MIN ..= i32::MAX
//! [ L0 | R0 | L1 | R1 | L2 | R2 | ... ]
//! ```
//!
//! `as` casts from `f32` saturate, so full-scale `1.0` lands on `i32::MAX`.

/// Scale between normalized samples and 32-bit fixed point.
const FULL_SCALE: f32 = 2_147_483_648.0;

/// Convert one normalized sample to a left-aligned DMA word.
#[inline]
pub fn to_word(sample: f32) -> i32 {
    (sample * FULL_SCALE) as i32
}

/// Convert one left-aligned DMA word to a normalized sample.
#[inline]
pub fn to_sample(word: i32) -> f32 {
    word as f32 / FULL_SCALE
}

/// Interleave left and right channels into stereo DMA words.
///
/// # Panics
///
/// Debug-asserts that `dest` holds exactly one word per sample of each channel.
pub fn interleave(dest: &mut [i32], left: &[f32], right: &[f32]) {
    debug_assert_eq!(dest.len(), left.len() * 2);
    debug_assert_eq!(left.len(), right.len());

    for (frame, (&l, &r)) in dest.chunks_exact_mut(2).zip(left.iter().zip(right)) {
        frame[0] = to_word(l);
        frame[1] = to_word(r);
    }
}

/// Split stereo DMA words into left and right channels.
///
/// # Panics
///
/// Debug-asserts that `src` holds exactly one word per sample of each channel.
pub fn deinterleave(src: &[i32], left: &mut [f32], right: &mut [f32]) {
    debug_assert_eq!(src.len(), left.len() * 2);
    debug_assert_eq!(left.len(), right.len());

    for (frame, (l, r)) in src.chunks_exact(2).zip(left.iter_mut().zip(right.iter_mut())) {
        *l = to_sample(frame[0]);
        *r = to_sample(frame[1]);
    }
}

/// Fill a region of DMA words with silence.
pub fn silence(dest: &mut [i32]) {
    dest.fill(0);
}
