//! Feature extraction joining the pitch and spectral stages.
//!
//! Consumes 10 ms frames at 24 kHz and maintains the 20 ms + max-pitch
//! sliding buffer both stages read from. Produces the 42-element feature
//! vector fed to the classifier, or a silence flag that short-circuits the
//! remaining work.

use crate::buffers::SequenceBuffer;
use crate::common::{
    FEATURE_VECTOR_SIZE, FRAME_SIZE_10MS_24K, FRAME_SIZE_20MS_24K, MAX_PITCH_PERIOD_24K,
    NUM_HIGHER_BANDS, NUM_LOWER_BANDS, PITCH_BUF_SIZE_24K,
};
use crate::lp_residual::{NUM_LPC_COEFFICIENTS, compute_lp_residual, compute_lpc_coefficients};
use crate::pitch::PitchEstimator;
use crate::spectral::SpectralFeaturesExtractor;
use std::mem;

/// Feature vector consumed by the classifier.
///
/// `#[repr(C)]` with only `f32` fields, so the flat view handed to the
/// network is a plain reinterpretation of this struct.
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub(crate) struct FeatureVector {
    pub(crate) average: [f32; NUM_LOWER_BANDS],
    pub(crate) higher_bands_cepstrum: [f32; NUM_HIGHER_BANDS],
    pub(crate) first_derivative: [f32; NUM_LOWER_BANDS],
    pub(crate) second_derivative: [f32; NUM_LOWER_BANDS],
    pub(crate) cross_correlation_cepstrum: [f32; NUM_LOWER_BANDS],
    pub(crate) pitch_period: f32,
    pub(crate) variability: f32,
}

const _: () = assert!(
    mem::size_of::<FeatureVector>() == FEATURE_VECTOR_SIZE * mem::size_of::<f32>()
);

impl FeatureVector {
    /// Flat view of the feature vector.
    pub(crate) fn as_array(&self) -> &[f32; FEATURE_VECTOR_SIZE] {
        bytemuck::cast_ref(self)
    }
}

/// Feature extractor over 10 ms frames at 24 kHz.
#[derive(derive_more::Debug)]
pub(crate) struct FeaturesExtractor {
    pitch_buffer: SequenceBuffer<PITCH_BUF_SIZE_24K, FRAME_SIZE_10MS_24K>,
    #[debug(skip)]
    lp_residual: Vec<f32>,
    pitch_estimator: PitchEstimator,
    spectral_extractor: SpectralFeaturesExtractor,
}

impl Default for FeaturesExtractor {
    fn default() -> Self {
        Self {
            pitch_buffer: SequenceBuffer::default(),
            lp_residual: vec![0.0; PITCH_BUF_SIZE_24K],
            pitch_estimator: PitchEstimator::default(),
            spectral_extractor: SpectralFeaturesExtractor::default(),
        }
    }
}

impl FeaturesExtractor {
    /// Clears the sliding buffer, the cepstral history and the pitch
    /// hysteresis.
    pub(crate) fn reset(&mut self) {
        self.pitch_buffer.reset();
        self.pitch_estimator.reset();
        self.spectral_extractor.reset();
    }

    /// Analyzes one 10 ms frame and fills `features`.
    ///
    /// Returns `true` when silence is detected; in that case `features` is
    /// only partially written and must not be fed to the classifier.
    pub(crate) fn check_silence_compute_features(
        &mut self,
        samples: &[f32; FRAME_SIZE_10MS_24K],
        features: &mut FeatureVector,
    ) -> bool {
        self.pitch_buffer.push(samples);
        let pitch_buffer = self.pitch_buffer.as_slice();

        // Estimate pitch on the LP residual of the pitch buffer.
        let mut lpc = [0.0_f32; NUM_LPC_COEFFICIENTS];
        compute_lpc_coefficients(pitch_buffer, &mut lpc);
        compute_lp_residual(&lpc, pitch_buffer, &mut self.lp_residual);
        let pitch = self.pitch_estimator.estimate(&self.lp_residual);
        // Normalization based on training data statistics.
        features.pitch_period = 0.01 * (pitch.period - 300) as f32;

        // The lagged frame starts one estimated period before the reference
        // frame (both on the unfiltered buffer).
        debug_assert!(pitch.period / 2 <= MAX_PITCH_PERIOD_24K as i32);
        let lag_offset = MAX_PITCH_PERIOD_24K - pitch.period as usize / 2;
        let lagged_frame = &pitch_buffer[lag_offset..lag_offset + FRAME_SIZE_20MS_24K];
        let reference_frame: &[f32; FRAME_SIZE_20MS_24K] = self.pitch_buffer.most_recent();

        let Some(spectral) = self
            .spectral_extractor
            .check_silence_compute_features(reference_frame, lagged_frame)
        else {
            return true;
        };

        features.average = spectral.average;
        features.higher_bands_cepstrum = spectral.higher_bands_cepstrum;
        features.first_derivative = spectral.first_derivative;
        features.second_derivative = spectral.second_derivative;
        features.cross_correlation_cepstrum = spectral.cross_correlation_cepstrum;
        features.variability = spectral.variability;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{INITIAL_MIN_PITCH_PERIOD_24K, SAMPLE_RATE_24K};
    use bytemuck::Zeroable;
    use std::f32::consts::TAU;

    /// 10 ms frames required to fill the pitch buffer.
    const WARM_UP_FRAMES: usize = PITCH_BUF_SIZE_24K.div_ceil(FRAME_SIZE_10MS_24K);

    fn feed_tone(
        extractor: &mut FeaturesExtractor,
        freq_hz: f32,
        amplitude: f32,
        features: &mut FeatureVector,
    ) -> bool {
        let mut is_silence = true;
        for frame_index in 0..WARM_UP_FRAMES {
            let mut frame = [0.0_f32; FRAME_SIZE_10MS_24K];
            for (i, sample) in frame.iter_mut().enumerate() {
                let t = (frame_index * FRAME_SIZE_10MS_24K + i) as f32;
                *sample = amplitude * (TAU * freq_hz * t / SAMPLE_RATE_24K as f32).sin();
            }
            is_silence = extractor.check_silence_compute_features(&frame, features);
        }
        is_silence
    }

    #[test]
    fn feature_vector_layout_is_flat() {
        let mut features = FeatureVector::zeroed();
        features.average[0] = 1.0;
        features.pitch_period = 2.0;
        features.variability = 3.0;
        let flat = features.as_array();
        assert_eq!(flat[0], 1.0);
        assert_eq!(flat[FEATURE_VECTOR_SIZE - 2], 2.0);
        assert_eq!(flat[FEATURE_VECTOR_SIZE - 1], 3.0);
    }

    #[test]
    fn silence_flag_for_zero_frames() {
        let mut extractor = FeaturesExtractor::default();
        let mut features = FeatureVector::zeroed();
        let frame = [0.0_f32; FRAME_SIZE_10MS_24K];
        for _ in 0..WARM_UP_FRAMES {
            assert!(extractor.check_silence_compute_features(&frame, &mut features));
        }
    }

    #[test]
    fn pitch_feature_orders_low_and_high_tones() {
        let amplitude = 1000.0;
        let low_hz = 150.0;
        let high_hz = 250.0;
        // Both tones must fall in the admissible pitch period range.
        for freq in [low_hz, high_hz] {
            let period = (SAMPLE_RATE_24K as f32 / freq) as usize;
            assert!((INITIAL_MIN_PITCH_PERIOD_24K..=MAX_PITCH_PERIOD_24K).contains(&period));
        }

        let mut extractor = FeaturesExtractor::default();
        let mut features = FeatureVector::zeroed();

        assert!(!feed_tone(&mut extractor, low_hz, amplitude, &mut features));
        let low_tone_period = features.pitch_period;

        extractor.reset();
        assert!(!feed_tone(&mut extractor, high_hz, amplitude, &mut features));
        let high_tone_period = features.pitch_period;

        // Higher frequency, shorter period.
        assert!(
            high_tone_period < low_tone_period,
            "period feature for {high_hz} Hz ({high_tone_period}) not below {low_hz} Hz \
             ({low_tone_period})"
        );
    }
}
