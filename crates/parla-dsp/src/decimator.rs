//! 2x decimators for the multi-rate analysis chain (48 kHz -> 24 kHz -> 12 kHz).

/// Halves the sample rate with a 3-tap `[0.25, 0.5, 0.25]` anti-aliasing
/// blend across adjacent input samples.
///
/// The first output sample has no left neighbor; its tap is folded into the
/// on-sample weight so that a constant signal is preserved exactly.
///
/// `src.len()` must be `2 * dst.len()`.
pub fn decimate_2x(src: &[f32], dst: &mut [f32]) {
    debug_assert_eq!(src.len(), 2 * dst.len());
    debug_assert!(!dst.is_empty());
    dst[0] = 0.75 * src[0] + 0.25 * src[1];
    for (i, d) in dst.iter_mut().enumerate().skip(1) {
        *d = 0.25 * src[2 * i - 1] + 0.5 * src[2 * i] + 0.25 * src[2 * i + 1];
    }
}

/// Halves the sample rate by dropping every other sample, without any
/// anti-aliasing filter.
///
/// Only acceptable where aliasing is harmless, such as the coarse half-band
/// pitch pre-search.
///
/// `src.len()` must be `2 * dst.len()`.
pub fn decimate_2x_raw(src: &[f32], dst: &mut [f32]) {
    debug_assert_eq!(src.len(), 2 * dst.len());
    for (i, d) in dst.iter_mut().enumerate() {
        *d = src[2 * i];
    }
}
