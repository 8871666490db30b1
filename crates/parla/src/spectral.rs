//! Spectral feature extraction over 20 ms frames at 24 kHz.
//!
//! Per non-silent frame: FFT bin energies are folded into overlapping
//! triangular bands on the Opus scale, log-compressed and decorrelated into
//! cepstral coefficients via a DCT; the cepstral history feeds average,
//! delta and variability features, and the band-wise correlation between the
//! reference frame and a pitch-lagged frame adds a periodicity cue.

use crate::buffers::{RingBuffer, SymmetricMatrixBuffer};
use crate::common::{
    CEPSTRUM_HISTORY_SIZE, FRAME_SIZE_20MS_24K, NUM_BANDS, NUM_FOLDED_BANDS, NUM_HIGHER_BANDS,
    NUM_LOWER_BANDS, SAMPLE_RATE_24K,
};
use parla_dsp::fft::{Complex, WindowedFft};
use std::f64::consts::PI;
use std::ptr;

/// Total folded band energy below which a frame is classified as silence.
const SILENCE_THRESHOLD: f32 = 0.04;

/// Band boundary frequencies on the Opus scale.
const OPUS_BAND_FREQUENCIES_HZ: [usize; NUM_BANDS] = [
    0, 200, 400, 600, 800, 1000, 1200, 1400, 1600, 2000, 2400, 2800, 3200, 4000, 4800, 5600, 6800,
    8000, 9600, 12000, 15600, 20000,
];

/// FFT bin indexes of the band boundaries that fit below Nyquist.
fn compute_band_boundaries(sample_rate: usize, frame_size: usize) -> [usize; NUM_FOLDED_BANDS] {
    let mut boundaries = [0_usize; NUM_FOLDED_BANDS];
    for (boundary, &freq) in boundaries.iter_mut().zip(OPUS_BAND_FREQUENCIES_HZ.iter()) {
        *boundary = freq * frame_size / sample_rate;
        debug_assert!(*boundary <= frame_size / 2);
    }
    boundaries
}

/// Folds per-bin correlation values into overlapping triangular bands.
///
/// `x` and `y` are FFT coefficient arrays; passing the same spectrum twice
/// yields band energies. The first and last bands only see half of their
/// triangular window, so their accumulated value is doubled.
fn fold_band_coefficients(
    x: &[Complex<f32>],
    y: &[Complex<f32>],
    boundaries: &[usize; NUM_FOLDED_BANDS],
    coefficients: &mut [f32; NUM_FOLDED_BANDS],
) {
    debug_assert_eq!(x.len(), y.len());
    coefficients.fill(0.0);
    for i in 0..NUM_FOLDED_BANDS - 1 {
        let first = boundaries[i];
        let size = boundaries[i + 1] - first;
        debug_assert!(size > 0);
        for j in 0..size {
            let bin = first + j;
            let v = x[bin].re * y[bin].re + x[bin].im * y[bin].im;
            let weight = j as f32 / size as f32;
            coefficients[i] += (1.0 - weight) * v;
            coefficients[i + 1] += weight * v;
        }
    }
    coefficients[0] *= 2.0;
    coefficients[NUM_FOLDED_BANDS - 1] *= 2.0;
}

/// Log-compresses band energies with a two-pass causal smoother.
///
/// A running floor that relaxes by at most 1.5 dB per band and a running
/// maximum that relaxes by 7 dB suppress isolated per-band dips without
/// flattening the spectral envelope. Bands beyond the folded range are
/// padded through the same smoother.
fn compute_smoothed_log_band_energies(
    bands_energy: &[f32],
    log_bands_energy: &mut [f32; NUM_BANDS],
) {
    debug_assert!(bands_energy.len() <= NUM_BANDS);
    const LOG_FLOOR: f32 = -2.0; // log10(1e-2).

    let mut log_max = LOG_FLOOR;
    let mut follow = LOG_FLOOR;
    let mut smooth = |x: f32| -> f32 {
        let x = x.max(log_max - 7.0).max(follow - 1.5);
        log_max = log_max.max(x);
        follow = follow.max(x).max(follow - 1.5);
        x
    };

    for (log_energy, &energy) in log_bands_energy.iter_mut().zip(bands_energy.iter()) {
        *log_energy = smooth((1e-2 + energy).log10());
    }
    for log_energy in log_bands_energy.iter_mut().skip(bands_energy.len()) {
        *log_energy = smooth(LOG_FLOOR);
    }
}

/// DCT-II basis for vectors of `NUM_BANDS` elements, row-major.
fn compute_dct_table() -> [f32; NUM_BANDS * NUM_BANDS] {
    let mut table = [0.0_f32; NUM_BANDS * NUM_BANDS];
    let k = 0.5_f64.sqrt();
    for i in 0..NUM_BANDS {
        for j in 0..NUM_BANDS {
            table[i * NUM_BANDS + j] = ((i as f64 + 0.5) * j as f64 * PI / NUM_BANDS as f64).cos()
                as f32;
        }
        table[i * NUM_BANDS] *= k as f32;
    }
    table
}

/// Applies the DCT given a precomputed table.
///
/// In-place computation is not allowed; `output` may be shorter than
/// `input` to compute only the leading coefficients, and `input` may be
/// shorter than `NUM_BANDS` (missing bands count as zero).
fn compute_dct(input: &[f32], dct_table: &[f32; NUM_BANDS * NUM_BANDS], output: &mut [f32]) {
    // sqrt(2 / NUM_BANDS)
    const SCALING: f32 = 0.301511345;

    debug_assert!(!ptr::eq(input.as_ptr(), output.as_ptr()));
    debug_assert!(input.len() <= NUM_BANDS);
    debug_assert!(!output.is_empty());
    debug_assert!(output.len() <= input.len());

    for (i, out) in output.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (j, &value) in input.iter().enumerate() {
            sum += value * dct_table[j * NUM_BANDS + i];
        }
        *out = sum * SCALING;
    }
}

/// Spectral features of one non-silent frame.
#[derive(Debug)]
pub(crate) struct SpectralFeatures {
    pub(crate) average: [f32; NUM_LOWER_BANDS],
    pub(crate) higher_bands_cepstrum: [f32; NUM_HIGHER_BANDS],
    pub(crate) first_derivative: [f32; NUM_LOWER_BANDS],
    pub(crate) second_derivative: [f32; NUM_LOWER_BANDS],
    pub(crate) cross_correlation_cepstrum: [f32; NUM_LOWER_BANDS],
    pub(crate) variability: f32,
}

/// Spectral feature extractor for 20 ms frames at 24 kHz.
#[derive(derive_more::Debug)]
pub(crate) struct SpectralFeaturesExtractor {
    fft: WindowedFft,
    #[debug(skip)]
    reference_spectrum: Vec<Complex<f32>>,
    #[debug(skip)]
    lagged_spectrum: Vec<Complex<f32>>,
    band_boundaries: [usize; NUM_FOLDED_BANDS],
    reference_band_energy: [f32; NUM_FOLDED_BANDS],
    lagged_band_energy: [f32; NUM_FOLDED_BANDS],
    #[debug(skip)]
    dct_table: [f32; NUM_BANDS * NUM_BANDS],
    cepstrum_history: RingBuffer<NUM_BANDS, CEPSTRUM_HISTORY_SIZE>,
    cepstrum_distances: SymmetricMatrixBuffer<CEPSTRUM_HISTORY_SIZE>,
}

impl Default for SpectralFeaturesExtractor {
    fn default() -> Self {
        let fft = WindowedFft::new(FRAME_SIZE_20MS_24K);
        let reference_spectrum = vec![Complex::default(); fft.output_len()];
        let lagged_spectrum = vec![Complex::default(); fft.output_len()];
        Self {
            fft,
            reference_spectrum,
            lagged_spectrum,
            band_boundaries: compute_band_boundaries(
                SAMPLE_RATE_24K as usize,
                FRAME_SIZE_20MS_24K,
            ),
            reference_band_energy: [0.0; NUM_FOLDED_BANDS],
            lagged_band_energy: [0.0; NUM_FOLDED_BANDS],
            dct_table: compute_dct_table(),
            cepstrum_history: RingBuffer::default(),
            cepstrum_distances: SymmetricMatrixBuffer::default(),
        }
    }
}

impl SpectralFeaturesExtractor {
    /// Clears the cepstral history.
    pub(crate) fn reset(&mut self) {
        self.cepstrum_history.reset();
        self.cepstrum_distances.reset();
    }

    /// Analyzes a reference and a pitch-lagged frame.
    ///
    /// Returns `None` when the reference frame is classified as silence; no
    /// further spectral work is done for that frame.
    pub(crate) fn check_silence_compute_features(
        &mut self,
        reference_frame: &[f32],
        lagged_frame: &[f32],
    ) -> Option<SpectralFeatures> {
        debug_assert_eq!(reference_frame.len(), FRAME_SIZE_20MS_24K);
        debug_assert_eq!(lagged_frame.len(), FRAME_SIZE_20MS_24K);

        self.fft.forward(reference_frame, &mut self.reference_spectrum);
        fold_band_coefficients(
            &self.reference_spectrum,
            &self.reference_spectrum,
            &self.band_boundaries,
            &mut self.reference_band_energy,
        );

        let total_energy: f32 = self.reference_band_energy.iter().sum();
        if total_energy < SILENCE_THRESHOLD {
            return None;
        }

        self.fft.forward(lagged_frame, &mut self.lagged_spectrum);
        fold_band_coefficients(
            &self.lagged_spectrum,
            &self.lagged_spectrum,
            &self.band_boundaries,
            &mut self.lagged_band_energy,
        );

        // Reference frame cepstrum.
        let mut log_bands_energy = [0.0_f32; NUM_BANDS];
        compute_smoothed_log_band_energies(&self.reference_band_energy, &mut log_bands_energy);
        let mut cepstrum = [0.0_f32; NUM_BANDS];
        compute_dct(&log_bands_energy, &self.dct_table, &mut cepstrum);
        // Distribution-centering offsets for the first two coefficients.
        cepstrum[0] -= 12.0;
        cepstrum[1] -= 4.0;

        self.update_cepstrum_history(&cepstrum);

        let mut features = SpectralFeatures {
            average: [0.0; NUM_LOWER_BANDS],
            higher_bands_cepstrum: [0.0; NUM_HIGHER_BANDS],
            first_derivative: [0.0; NUM_LOWER_BANDS],
            second_derivative: [0.0; NUM_LOWER_BANDS],
            cross_correlation_cepstrum: [0.0; NUM_LOWER_BANDS],
            variability: 0.0,
        };
        features
            .higher_bands_cepstrum
            .copy_from_slice(&cepstrum[NUM_LOWER_BANDS..]);
        self.compute_average_and_derivatives(
            &mut features.average,
            &mut features.first_derivative,
            &mut features.second_derivative,
        );
        self.compute_cross_correlation_cepstrum(&mut features.cross_correlation_cepstrum);
        features.variability = self.compute_variability();
        Some(features)
    }

    /// Pushes a new cepstrum and refreshes its distances to the history.
    fn update_cepstrum_history(&mut self, cepstrum: &[f32; NUM_BANDS]) {
        self.cepstrum_history.push(cepstrum);
        let mut distances = [0.0_f32; CEPSTRUM_HISTORY_SIZE - 1];
        for (i, distance) in distances.iter_mut().enumerate() {
            let older = self.cepstrum_history.get(i + 1);
            *distance = cepstrum
                .iter()
                .zip(older.iter())
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum();
        }
        self.cepstrum_distances.push(&distances);
    }

    /// 3-tap finite-difference estimates of the cepstral trajectory.
    fn compute_average_and_derivatives(
        &self,
        average: &mut [f32; NUM_LOWER_BANDS],
        first_derivative: &mut [f32; NUM_LOWER_BANDS],
        second_derivative: &mut [f32; NUM_LOWER_BANDS],
    ) {
        let curr = self.cepstrum_history.get(0);
        let prev1 = self.cepstrum_history.get(1);
        let prev2 = self.cepstrum_history.get(2);
        for i in 0..NUM_LOWER_BANDS {
            // Average, kernel [1, 1, 1].
            average[i] = curr[i] + prev1[i] + prev2[i];
            // First derivative, kernel [1, 0, -1].
            first_derivative[i] = curr[i] - prev2[i];
            // Second derivative, Laplacian kernel [1, -2, 1].
            second_derivative[i] = curr[i] - 2.0 * prev1[i] + prev2[i];
        }
    }

    /// Band-wise correlation between the reference and lagged spectra,
    /// normalized and DCT-decorrelated.
    fn compute_cross_correlation_cepstrum(&mut self, output: &mut [f32; NUM_LOWER_BANDS]) {
        let mut bands_cross_corr = [0.0_f32; NUM_FOLDED_BANDS];
        fold_band_coefficients(
            &self.reference_spectrum,
            &self.lagged_spectrum,
            &self.band_boundaries,
            &mut bands_cross_corr,
        );
        for (i, cross) in bands_cross_corr.iter_mut().enumerate() {
            *cross /= (0.001
                + self.reference_band_energy[i] * self.lagged_band_energy[i])
                .sqrt();
        }
        compute_dct(&bands_cross_corr, &self.dct_table, output);
        // Distribution-centering offsets for the first two coefficients.
        output[0] -= 1.3;
        output[1] -= 0.9;
    }

    /// Spectral variability score over the cepstral history.
    ///
    /// For each history entry, the minimum distance to any other entry
    /// measures its novelty; the sum is high while the spectrum is changing
    /// and low when it is stationary.
    fn compute_variability(&self) -> f32 {
        let mut variability = 0.0_f32;
        for delay1 in 0..CEPSTRUM_HISTORY_SIZE {
            let mut min_distance = f32::MAX;
            for delay2 in 0..CEPSTRUM_HISTORY_SIZE {
                if delay1 == delay2 {
                    continue;
                }
                min_distance = min_distance.min(self.cepstrum_distances.get(delay1, delay2));
            }
            variability += min_distance;
        }
        variability / CEPSTRUM_HISTORY_SIZE as f32 - 2.1
    }
}
