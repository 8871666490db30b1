//! Pitch period and gain estimation on the 24 kHz pitch buffer.
//!
//! The search runs in two stages: a coarse autocorrelation scan over the
//! whole admissible period range on a 2x-decimated (12 kHz) copy of the
//! buffer, followed by a full-rate refinement restricted to small
//! neighborhoods of the two best coarse candidates. A final stage checks
//! sub-multiples of the refined period against an adaptive threshold to
//! avoid octave errors, and computes the pitch gain.
//!
//! Periods are handled as inverted lags (`maxPeriod - period`) so that index
//! 0 of every correlation array corresponds to the longest period.

use crate::common::{
    FRAME_SIZE_20MS_12K, FRAME_SIZE_20MS_24K, INITIAL_NUM_LAGS_24K, MAX_PITCH_PERIOD_24K,
    MAX_PITCH_PERIOD_48K, MIN_PITCH_PERIOD_24K, MIN_PITCH_PERIOD_48K, NUM_LAGS_12K,
    PITCH_BUF_SIZE_12K, PITCH_BUF_SIZE_24K, REFINE_NUM_LAGS_24K,
};
use parla_dsp::decimator::decimate_2x_raw;
use parla_dsp::math::dot_product;

/// Estimated pitch period (at 48 kHz resolution) and gain.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PitchInfo {
    pub(crate) period: i32,
    pub(crate) gain: f32,
}

/// Top-2 coarse pitch candidates, as inverted lags.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CandidatePeriods {
    pub(crate) best: i32,
    pub(crate) second_best: i32,
}

/// Pitch estimator with inter-frame hysteresis.
///
/// The previous frame's pitch lowers the acceptance threshold for nearby
/// candidate periods, which keeps the estimate from jumping between octaves
/// on sustained voiced segments.
#[derive(derive_more::Debug)]
pub(crate) struct PitchEstimator {
    last_pitch_48k: PitchInfo,
    #[debug(skip)]
    buf_12k: Vec<f32>,
    #[debug(skip)]
    auto_corr_12k: Vec<f32>,
    #[debug(skip)]
    y_energy_24k: Vec<f32>,
}

impl Default for PitchEstimator {
    fn default() -> Self {
        Self {
            last_pitch_48k: PitchInfo::default(),
            buf_12k: vec![0.0; PITCH_BUF_SIZE_12K],
            auto_corr_12k: vec![0.0; NUM_LAGS_12K],
            y_energy_24k: vec![0.0; REFINE_NUM_LAGS_24K],
        }
    }
}

impl PitchEstimator {
    /// Clears the inter-frame hysteresis state.
    pub(crate) fn reset(&mut self) {
        self.last_pitch_48k = PitchInfo::default();
    }

    /// Estimates the pitch of the given 24 kHz buffer.
    ///
    /// The returned period is expressed at 48 kHz resolution.
    pub(crate) fn estimate(&mut self, pitch_buffer: &[f32]) -> PitchInfo {
        debug_assert_eq!(pitch_buffer.len(), PITCH_BUF_SIZE_24K);

        // Coarse search at 12 kHz.
        decimate_2x_raw(pitch_buffer, &mut self.buf_12k);
        compute_auto_correlation_12k(&self.buf_12k, &mut self.auto_corr_12k);
        let coarse = find_candidate_periods_12k(&self.auto_corr_12k, &self.buf_12k);

        // Refinement at 24 kHz around the two candidates, rescaled by 2x.
        let candidates = CandidatePeriods {
            best: 2 * coarse.best,
            second_best: 2 * coarse.second_best,
        };
        compute_sliding_frame_energies_24k(pitch_buffer, &mut self.y_energy_24k);
        let refined_inverted_lag_48k =
            refine_pitch_period_48k(pitch_buffer, &self.y_energy_24k, candidates);

        // Sub-harmonic check and gain computation.
        self.last_pitch_48k = check_lower_periods_and_compute_gain(
            pitch_buffer,
            &self.y_energy_24k,
            MAX_PITCH_PERIOD_48K as i32 - refined_inverted_lag_48k,
            self.last_pitch_48k,
        );
        self.last_pitch_48k
    }
}

/// Autocorrelation of the trailing 20 ms frame against the window starting
/// at `inverted_lag`, both in the 24 kHz pitch buffer.
fn auto_correlation_24k(inverted_lag: usize, pitch_buffer: &[f32]) -> f32 {
    debug_assert!(inverted_lag < REFINE_NUM_LAGS_24K);
    let x = &pitch_buffer[MAX_PITCH_PERIOD_24K..MAX_PITCH_PERIOD_24K + FRAME_SIZE_20MS_24K];
    let y = &pitch_buffer[inverted_lag..inverted_lag + FRAME_SIZE_20MS_24K];
    dot_product(x, y)
}

/// Autocorrelation coefficients for every inverted lag of the coarse search.
fn compute_auto_correlation_12k(pitch_buffer: &[f32], auto_corr: &mut [f32]) {
    debug_assert_eq!(pitch_buffer.len(), PITCH_BUF_SIZE_12K);
    debug_assert_eq!(auto_corr.len(), NUM_LAGS_12K);
    let max_pitch = PITCH_BUF_SIZE_12K - FRAME_SIZE_20MS_12K;
    let x = &pitch_buffer[max_pitch..];
    for (inverted_lag, coeff) in auto_corr.iter_mut().enumerate() {
        let y = &pitch_buffer[inverted_lag..inverted_lag + FRAME_SIZE_20MS_12K];
        *coeff = dot_product(x, y);
    }
}

/// Finds the two strongest pitch candidates in the coarse autocorrelation.
///
/// Candidate strengths are compared as `numerator / denominator` ratios via
/// cross-multiplication to avoid divisions; the denominator is the sliding
/// energy of the lagged window, maintained incrementally and floored so
/// that near-silent windows cannot produce spurious maxima.
fn find_candidate_periods_12k(auto_corr: &[f32], pitch_buffer: &[f32]) -> CandidatePeriods {
    #[derive(Clone, Copy)]
    struct Candidate {
        inverted_lag: i32,
        numerator: f32,
        denominator: f32,
    }

    impl Candidate {
        fn stronger_than(&self, other: &Self) -> bool {
            self.numerator * other.denominator > other.numerator * self.denominator
        }
    }

    debug_assert_eq!(auto_corr.len(), NUM_LAGS_12K);
    debug_assert_eq!(pitch_buffer.len(), PITCH_BUF_SIZE_12K);

    let frame_view = &pitch_buffer[..FRAME_SIZE_20MS_12K + 1];
    let mut energy = 1.0 + dot_product(frame_view, frame_view);

    let mut best = Candidate {
        inverted_lag: 0,
        numerator: -1.0,
        denominator: 0.0,
    };
    let mut second_best = Candidate {
        inverted_lag: 1,
        numerator: -1.0,
        denominator: 0.0,
    };

    for (inverted_lag, &coeff) in auto_corr.iter().enumerate() {
        // A pitch candidate must have positive correlation.
        if coeff > 0.0 {
            let candidate = Candidate {
                inverted_lag: inverted_lag as i32,
                numerator: coeff * coeff,
                denominator: energy,
            };
            if candidate.stronger_than(&second_best) {
                if candidate.stronger_than(&best) {
                    second_best = best;
                    best = candidate;
                } else {
                    second_best = candidate;
                }
            }
        }
        // Slide the energy window for the next inverted lag.
        let old = pitch_buffer[inverted_lag];
        let new = pitch_buffer[inverted_lag + FRAME_SIZE_20MS_12K];
        energy = (energy - old * old + new * new).max(0.0);
    }

    CandidatePeriods {
        best: best.inverted_lag,
        second_best: second_best.inverted_lag,
    }
}

/// Sum of squared samples of every 20 ms sliding window in the pitch buffer,
/// indexed by inverted lag.
///
/// Maintained incrementally and floored at 1.0 so later normalizations never
/// divide by a vanishing energy.
pub(crate) fn compute_sliding_frame_energies_24k(pitch_buffer: &[f32], y_energy: &mut [f32]) {
    debug_assert_eq!(pitch_buffer.len(), PITCH_BUF_SIZE_24K);
    debug_assert_eq!(y_energy.len(), REFINE_NUM_LAGS_24K);

    let frame = &pitch_buffer[..FRAME_SIZE_20MS_24K];
    let mut yy = dot_product(frame, frame);
    y_energy[0] = yy;
    for inverted_lag in 0..MAX_PITCH_PERIOD_24K {
        let old = pitch_buffer[inverted_lag];
        let new = pitch_buffer[inverted_lag + FRAME_SIZE_20MS_24K];
        yy = (yy - old * old + new * new).max(1.0);
        y_energy[inverted_lag + 1] = yy;
    }
}

/// Pseudo-interpolation offset in {-1, 0, +1} from three neighboring
/// autocorrelation coefficients.
fn pseudo_interpolation_offset(prev: f32, curr: f32, next: f32) -> i32 {
    if (next - prev) > 0.7 * (curr - prev) {
        1 // `next` is the largest coefficient.
    } else if (prev - next) > 0.7 * (curr - next) {
        -1 // `prev` is the largest coefficient.
    } else {
        0
    }
}

/// Refines a pitch period expressed as a lag with pseudo-interpolation; the
/// output is at twice the input resolution.
fn pseudo_interpolate_lag(lag: i32, pitch_buffer: &[f32]) -> i32 {
    let mut offset = 0;
    if lag > 0 && lag < MAX_PITCH_PERIOD_24K as i32 {
        let inverted_lag = MAX_PITCH_PERIOD_24K as i32 - lag;
        offset = pseudo_interpolation_offset(
            auto_correlation_24k((inverted_lag + 1) as usize, pitch_buffer),
            auto_correlation_24k(inverted_lag as usize, pitch_buffer),
            auto_correlation_24k((inverted_lag - 1) as usize, pitch_buffer),
        );
    }
    2 * lag + offset
}

/// Number of analyzed lags to the left and right of a candidate.
const NEIGHBORHOOD_RADIUS: i32 = 2;
const MAX_ANALYZED_LAGS: usize = 2 * (2 * NEIGHBORHOOD_RADIUS as usize + 1);

#[derive(Debug, Clone, Copy)]
struct LagRange {
    min: i32,
    max: i32,
}

fn neighborhood(inverted_lag: i32) -> LagRange {
    LagRange {
        min: (inverted_lag - NEIGHBORHOOD_RADIUS).max(0),
        max: (inverted_lag + NEIGHBORHOOD_RADIUS).min(INITIAL_NUM_LAGS_24K as i32 - 1),
    }
}

/// Inverted lags visited by the refinement, in ascending order.
struct AnalyzedLags {
    lags: [i32; MAX_ANALYZED_LAGS],
    len: usize,
}

impl AnalyzedLags {
    fn new() -> Self {
        Self {
            lags: [0; MAX_ANALYZED_LAGS],
            len: 0,
        }
    }

    fn append(&mut self, inverted_lag: i32) {
        debug_assert!(self.len < MAX_ANALYZED_LAGS);
        self.lags[self.len] = inverted_lag;
        self.len += 1;
    }

    fn as_slice(&self) -> &[i32] {
        &self.lags[..self.len]
    }
}

fn compute_auto_correlation_range(
    range: LagRange,
    pitch_buffer: &[f32],
    auto_correlation: &mut [f32],
    analyzed: &mut AnalyzedLags,
) {
    debug_assert!(range.min >= 0);
    debug_assert!((range.max as usize) < INITIAL_NUM_LAGS_24K);
    for inverted_lag in range.min..=range.max {
        auto_correlation[inverted_lag as usize] =
            auto_correlation_24k(inverted_lag as usize, pitch_buffer);
        analyzed.append(inverted_lag);
    }
}

/// Refines the coarse candidates at 24 kHz and returns the winning pitch
/// period as an inverted lag at 48 kHz resolution.
///
/// Only the +/-2 neighborhoods of the two candidates are evaluated; the
/// result does not depend on the order of the candidate pair.
pub(crate) fn refine_pitch_period_48k(
    pitch_buffer: &[f32],
    y_energy: &[f32],
    candidates: CandidatePeriods,
) -> i32 {
    debug_assert_eq!(pitch_buffer.len(), PITCH_BUF_SIZE_24K);
    debug_assert_eq!(y_energy.len(), REFINE_NUM_LAGS_24K);

    let mut auto_correlation = [0.0_f32; INITIAL_NUM_LAGS_24K];
    let mut analyzed = AnalyzedLags::new();

    // Order the two neighborhoods so that `r1` never starts after `r2`.
    let swap = candidates.best > candidates.second_best;
    let r1 = neighborhood(if swap {
        candidates.second_best
    } else {
        candidates.best
    });
    let r2 = neighborhood(if swap {
        candidates.best
    } else {
        candidates.second_best
    });
    debug_assert!(r1.min <= r2.min);
    debug_assert!(r1.max <= r2.max);

    if r1.max + 1 >= r2.min {
        // Overlapping or adjacent neighborhoods: one merged scan.
        compute_auto_correlation_range(
            LagRange {
                min: r1.min,
                max: r2.max,
            },
            pitch_buffer,
            &mut auto_correlation,
            &mut analyzed,
        );
    } else {
        compute_auto_correlation_range(r1, pitch_buffer, &mut auto_correlation, &mut analyzed);
        compute_auto_correlation_range(r2, pitch_buffer, &mut auto_correlation, &mut analyzed);
    }

    // Select the strongest analyzed lag.
    let mut best_inverted_lag = 0_i32;
    let mut best_numerator = -1.0_f32;
    let mut best_denominator = 0.0_f32;
    for &inverted_lag in analyzed.as_slice() {
        let il = inverted_lag as usize;
        if auto_correlation[il] > 0.0 {
            let numerator = auto_correlation[il] * auto_correlation[il];
            let denominator = y_energy[il];
            if numerator * best_denominator > best_numerator * denominator {
                best_inverted_lag = inverted_lag;
                best_numerator = numerator;
                best_denominator = denominator;
            }
        }
    }

    // Pseudo-interpolation to 48 kHz resolution. Cannot be applied at the
    // boundaries; the unanalyzed neighbors of each range read as zero, which
    // biases the offset towards the analyzed side and is harmless.
    if best_inverted_lag == 0 || best_inverted_lag >= INITIAL_NUM_LAGS_24K as i32 - 1 {
        return 2 * best_inverted_lag;
    }
    let il = best_inverted_lag as usize;
    let offset = pseudo_interpolation_offset(
        auto_correlation[il + 1],
        auto_correlation[il],
        auto_correlation[il - 1],
    );
    2 * best_inverted_lag + offset
}

/// Sub-harmonic multipliers: when testing the candidate period `T/k`, the
/// multiple `n*T/k` with `n` from this table is examined together with it,
/// chosen so that every multiple is visited exactly once over all `k`.
const SUB_HARMONIC_MULTIPLIERS: [i32; 14] = [3, 2, 3, 2, 5, 2, 3, 2, 3, 2, 5, 2, 3, 2];

/// Initial-period thresholds indexed by `k - 2`, computed as `5*k*k`.
const INITIAL_PERIOD_THRESHOLDS: [i32; 14] = [
    20, 45, 80, 125, 180, 245, 320, 405, 500, 605, 720, 845, 980, 1125,
];

/// `round(multiplier * period / divisor)` in integer arithmetic.
const fn alternative_period(period: i32, multiplier: i32, divisor: i32) -> i32 {
    (2 * multiplier * period + divisor) / (2 * divisor)
}

/// Decides whether an alternative (lower) pitch period wins over the initial
/// estimate.
///
/// The threshold adapts in two ways: it scales with the initial gain, and it
/// drops when the alternative period is within 1-2 samples of the previous
/// frame's period (pitch tracking hysteresis).
fn alternative_pitch_wins(
    last: PitchInfo,
    initial: PitchInfo,
    alternative: PitchInfo,
    period_divisor: i32,
) -> bool {
    debug_assert!(period_divisor >= 2);

    let mut discount = 0.0_f32;
    if (alternative.period - last.period).abs() <= 1 {
        discount = last.gain;
    } else if (alternative.period - last.period).abs() == 2
        && initial.period > INITIAL_PERIOD_THRESHOLDS[(period_divisor - 2) as usize]
    {
        discount = 0.5 * last.gain;
    }

    // Shorter candidate periods face a higher bar: short-term correlations
    // bias the score towards high frequencies.
    let threshold = if alternative.period < 2 * MIN_PITCH_PERIOD_24K as i32 {
        (0.9 * initial.gain - discount).max(0.5)
    } else if alternative.period < 3 * MIN_PITCH_PERIOD_24K as i32 {
        (0.85 * initial.gain - discount).max(0.4)
    } else {
        (0.7 * initial.gain - discount).max(0.3)
    };
    alternative.gain > threshold
}

/// Checks sub-multiples of the refined period and computes the final pitch.
///
/// `initial_period_48k` is the refined period at 48 kHz resolution;
/// `last_pitch_48k` is the previous frame's result, used for hysteresis.
pub(crate) fn check_lower_periods_and_compute_gain(
    pitch_buffer: &[f32],
    y_energy: &[f32],
    initial_period_48k: i32,
    last_pitch_48k: PitchInfo,
) -> PitchInfo {
    debug_assert_eq!(pitch_buffer.len(), PITCH_BUF_SIZE_24K);
    debug_assert_eq!(y_energy.len(), REFINE_NUM_LAGS_24K);
    debug_assert!(MIN_PITCH_PERIOD_48K as i32 <= initial_period_48k);
    debug_assert!(initial_period_48k <= MAX_PITCH_PERIOD_48K as i32);

    #[derive(Clone, Copy)]
    struct RefinedCandidate {
        period: i32,
        gain: f32,
        xy: f32,
        yy: f32,
    }

    // Energy of the most recent 20 ms frame.
    let xx = y_energy[MAX_PITCH_PERIOD_24K];
    let pitch_gain = |xy: f32, yy: f32| -> f32 {
        debug_assert!(xx * yy >= 0.0);
        xy / (1.0 + xx * yy).sqrt()
    };

    // Initial candidate at 24 kHz.
    let initial_period = (initial_period_48k / 2).min(MAX_PITCH_PERIOD_24K as i32 - 1);
    let initial_inverted_lag = (MAX_PITCH_PERIOD_24K as i32 - initial_period) as usize;
    let initial_xy = auto_correlation_24k(initial_inverted_lag, pitch_buffer);
    let initial_yy = y_energy[initial_inverted_lag];
    let mut best = RefinedCandidate {
        period: initial_period,
        gain: pitch_gain(initial_xy, initial_yy),
        xy: initial_xy,
        yy: initial_yy,
    };

    let initial = PitchInfo {
        period: best.period,
        gain: best.gain,
    };
    let last = PitchInfo {
        period: last_pitch_48k.period / 2,
        gain: last_pitch_48k.gain,
    };

    // Largest divisor that keeps the candidate period admissible.
    let max_divisor = (2 * initial.period) / (2 * MIN_PITCH_PERIOD_24K as i32 - 1);
    for divisor in 2..=max_divisor.min(SUB_HARMONIC_MULTIPLIERS.len() as i32 + 1) {
        let candidate_period = alternative_period(initial.period, 1, divisor);
        debug_assert!(candidate_period >= MIN_PITCH_PERIOD_24K as i32);

        // Validate the candidate by also looking at one of its multiples.
        let mut secondary_period = alternative_period(
            initial.period,
            SUB_HARMONIC_MULTIPLIERS[(divisor - 2) as usize],
            divisor,
        );
        if divisor == 2 && secondary_period > MAX_PITCH_PERIOD_24K as i32 {
            secondary_period = initial.period;
        }
        debug_assert_ne!(candidate_period, secondary_period);

        let candidate_inverted_lag = (MAX_PITCH_PERIOD_24K as i32 - candidate_period) as usize;
        let secondary_inverted_lag = (MAX_PITCH_PERIOD_24K as i32 - secondary_period) as usize;
        let xy = 0.5
            * (auto_correlation_24k(candidate_inverted_lag, pitch_buffer)
                + auto_correlation_24k(secondary_inverted_lag, pitch_buffer));
        let yy = 0.5 * (y_energy[candidate_inverted_lag] + y_energy[secondary_inverted_lag]);
        let alternative = PitchInfo {
            period: candidate_period,
            gain: pitch_gain(xy, yy),
        };

        if alternative_pitch_wins(last, initial, alternative, divisor) {
            best = RefinedCandidate {
                period: alternative.period,
                gain: alternative.gain,
                xy,
                yy,
            };
        }
    }

    // Final gain, additionally capped by the raw cross/auto energy ratio.
    let xy = best.xy.max(0.0);
    debug_assert!(best.yy >= 0.0);
    let capped = if best.yy <= xy { 1.0 } else { xy / (best.yy + 1.0) };
    let final_gain = best.gain.min(capped);

    let final_period_48k =
        (MIN_PITCH_PERIOD_48K as i32).max(pseudo_interpolate_lag(best.period, pitch_buffer));

    PitchInfo {
        period: final_period_48k,
        gain: final_gain,
    }
}
