//! Pipeline constants.
//!
//! The detector accepts 10 ms frames at 48 kHz and runs every analysis stage
//! at 24 kHz; the coarse pitch pre-search additionally decimates to 12 kHz.
//! Pitch periods are reported at 48 kHz resolution.

/// External sample rate of the input frames.
pub const SAMPLE_RATE_48K: i32 = 48000;
/// Samples per 10 ms input frame at 48 kHz.
pub const FRAME_SIZE_10MS_48K: usize = SAMPLE_RATE_48K as usize / 100;

/// Internal analysis sample rate.
pub(crate) const SAMPLE_RATE_24K: i32 = 24000;
pub(crate) const FRAME_SIZE_10MS_24K: usize = SAMPLE_RATE_24K as usize / 100;
pub(crate) const FRAME_SIZE_20MS_24K: usize = 2 * FRAME_SIZE_10MS_24K;

// Pitch buffer: the most recent 20 ms frame preceded by the longest
// admissible pitch period.
pub(crate) const MIN_PITCH_PERIOD_24K: usize = SAMPLE_RATE_24K as usize / 800; // 1.25 ms
pub(crate) const MAX_PITCH_PERIOD_24K: usize = (SAMPLE_RATE_24K as f64 / 62.5) as usize; // 16 ms
pub(crate) const PITCH_BUF_SIZE_24K: usize = MAX_PITCH_PERIOD_24K + FRAME_SIZE_20MS_24K;
const _: () = assert!(
    PITCH_BUF_SIZE_24K & 1 == 0,
    "the pitch buffer size must be even for 2x decimation"
);

// 24 kHz refinement.
pub(crate) const INITIAL_MIN_PITCH_PERIOD_24K: usize = 3 * MIN_PITCH_PERIOD_24K;
const _: () = assert!(INITIAL_MIN_PITCH_PERIOD_24K < MAX_PITCH_PERIOD_24K);
/// Inverted lags searched during the initial (coarse) phase, at 24 kHz scale.
pub(crate) const INITIAL_NUM_LAGS_24K: usize = MAX_PITCH_PERIOD_24K - INITIAL_MIN_PITCH_PERIOD_24K;
/// Inverted lags covered by the refinement phase, which searches the full
/// pitch range.
pub(crate) const REFINE_NUM_LAGS_24K: usize = MAX_PITCH_PERIOD_24K + 1;
const _: () = assert!(REFINE_NUM_LAGS_24K > INITIAL_NUM_LAGS_24K);

// 12 kHz coarse search.
pub(crate) const FRAME_SIZE_20MS_12K: usize = FRAME_SIZE_20MS_24K / 2;
pub(crate) const PITCH_BUF_SIZE_12K: usize = PITCH_BUF_SIZE_24K / 2;
pub(crate) const MAX_PITCH_PERIOD_12K: usize = MAX_PITCH_PERIOD_24K / 2;
pub(crate) const INITIAL_MIN_PITCH_PERIOD_12K: usize = INITIAL_MIN_PITCH_PERIOD_24K / 2;
const _: () = assert!(MAX_PITCH_PERIOD_12K > INITIAL_MIN_PITCH_PERIOD_12K);
pub(crate) const NUM_LAGS_12K: usize = MAX_PITCH_PERIOD_12K - INITIAL_MIN_PITCH_PERIOD_12K;

// 48 kHz scale used for the reported pitch period.
pub(crate) const MIN_PITCH_PERIOD_48K: usize = 2 * MIN_PITCH_PERIOD_24K;
pub(crate) const MAX_PITCH_PERIOD_48K: usize = 2 * MAX_PITCH_PERIOD_24K;

// Spectral features.
pub(crate) const NUM_BANDS: usize = 22;
/// Bands that fit below the Nyquist frequency at the 24 kHz analysis rate.
pub(crate) const NUM_FOLDED_BANDS: usize = 20;
pub(crate) const NUM_LOWER_BANDS: usize = 6;
pub(crate) const NUM_HIGHER_BANDS: usize = NUM_BANDS - NUM_LOWER_BANDS;
const _: () = assert!(0 < NUM_LOWER_BANDS && NUM_LOWER_BANDS < NUM_FOLDED_BANDS);
pub(crate) const CEPSTRUM_HISTORY_SIZE: usize = 8;
const _: () = assert!(
    CEPSTRUM_HISTORY_SIZE > 2,
    "three cepstral vectors are required for the delta features"
);

pub(crate) const FEATURE_VECTOR_SIZE: usize = 42;
