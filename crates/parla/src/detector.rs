//! Public per-frame voice activity detector.

use crate::common::{FRAME_SIZE_10MS_24K, FRAME_SIZE_10MS_48K};
use crate::features::{FeatureVector, FeaturesExtractor};
use crate::nn::VadNetwork;
use bytemuck::Zeroable;
use parla_dsp::biquad::{BiQuadFilter, BiQuadFilterCoefficients};
use parla_dsp::decimator::decimate_2x;
use tracing::{debug, trace};

/// High-pass pre-emphasis at 48 kHz.
///
/// Computed as `butter(N=2, Wn=2*30/48000, btype='highpass')`.
const HIGH_PASS_30HZ_48K: BiQuadFilterCoefficients = BiQuadFilterCoefficients {
    b: [0.99722705, -1.9944541, 0.99722705],
    a: [-1.99444641, 0.99446179],
};

/// Default period of the recurrent state reset, in 10 ms frames (1.5 s).
const DEFAULT_RESET_PERIOD_FRAMES: u32 = 150;

/// Detector configuration.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// Every this many frames the recurrent memory (GRU state) is cleared so
    /// stale context cannot accumulate over long sessions. `None` disables
    /// the periodic reset.
    pub reset_period_frames: Option<u32>,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            reset_period_frames: Some(DEFAULT_RESET_PERIOD_FRAMES),
        }
    }
}

/// Per-frame detector output.
#[derive(Debug, Clone, Copy)]
pub struct VadResult {
    /// Voice probability in `[0, 1]`; exactly 0.0 for silence-flagged
    /// frames.
    pub probability: f32,
    /// Whether the frame was classified as silence by the spectral gate
    /// (in which case pitch search and classification were skipped).
    pub is_silence: bool,
}

/// RNN-based voice activity detector.
///
/// Feed mono 10 ms frames at 48 kHz (480 samples, linear PCM in S16 float
/// range). Internally each frame is high-pass filtered, decimated to the
/// 24 kHz analysis rate and run through pitch and spectral analysis before
/// the recurrent classifier.
///
/// One instance serves exactly one audio stream: all mutable state (filter
/// memory, analysis buffers, recurrent state) is private to the instance and
/// frames must be delivered sequentially.
#[derive(Debug)]
pub struct VoiceActivityDetector {
    config: VadConfig,
    high_pass: BiQuadFilter,
    filtered_48k: [f32; FRAME_SIZE_10MS_48K],
    frame_24k: [f32; FRAME_SIZE_10MS_24K],
    features_extractor: FeaturesExtractor,
    features: FeatureVector,
    network: VadNetwork,
    frames_until_reset: u32,
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new(VadConfig::default())
    }
}

impl VoiceActivityDetector {
    /// Creates a detector with the given configuration.
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            high_pass: BiQuadFilter::new(HIGH_PASS_30HZ_48K),
            filtered_48k: [0.0; FRAME_SIZE_10MS_48K],
            frame_24k: [0.0; FRAME_SIZE_10MS_24K],
            features_extractor: FeaturesExtractor::default(),
            features: FeatureVector::zeroed(),
            network: VadNetwork::default(),
            frames_until_reset: config.reset_period_frames.unwrap_or(u32::MAX),
        }
    }

    /// Resets the whole detector to its initial state.
    pub fn reset(&mut self) {
        self.high_pass.reset();
        self.features_extractor.reset();
        self.network.reset();
        self.frames_until_reset = self.config.reset_period_frames.unwrap_or(u32::MAX);
    }

    /// Analyzes one 10 ms frame and returns the voice probability.
    pub fn process(&mut self, frame: &[f32; FRAME_SIZE_10MS_48K]) -> VadResult {
        if let Some(period) = self.config.reset_period_frames {
            self.frames_until_reset = self.frames_until_reset.saturating_sub(1);
            if self.frames_until_reset == 0 {
                debug!("periodic recurrent state reset");
                self.network.reset();
                self.frames_until_reset = period.max(1);
            }
        }

        self.high_pass.process(frame, &mut self.filtered_48k);
        decimate_2x(&self.filtered_48k, &mut self.frame_24k);

        let is_silence = self
            .features_extractor
            .check_silence_compute_features(&self.frame_24k, &mut self.features);
        let probability = self.network.compute_probability(&self.features, is_silence);
        trace!(probability, is_silence, "frame analyzed");
        VadResult {
            probability,
            is_silence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn tone_frame(frame_index: usize, freq_hz: f32, amplitude: f32) -> [f32; FRAME_SIZE_10MS_48K] {
        let mut frame = [0.0_f32; FRAME_SIZE_10MS_48K];
        for (i, sample) in frame.iter_mut().enumerate() {
            let t = (frame_index * FRAME_SIZE_10MS_48K + i) as f32;
            *sample = amplitude * (TAU * freq_hz * t / 48000.0).sin();
        }
        frame
    }

    #[test]
    fn zero_frames_are_silence_with_zero_probability() {
        let mut vad = VoiceActivityDetector::default();
        let frame = [0.0_f32; FRAME_SIZE_10MS_48K];
        for _ in 0..20 {
            let result = vad.process(&frame);
            assert!(result.is_silence);
            assert_eq!(result.probability, 0.0);
        }
    }

    #[test]
    fn tone_frames_are_not_silence() {
        let mut vad = VoiceActivityDetector::default();
        let mut seen_non_silence = false;
        for frame_index in 0..20 {
            let frame = tone_frame(frame_index, 200.0, 1000.0);
            let result = vad.process(&frame);
            assert!((0.0..=1.0).contains(&result.probability));
            seen_non_silence |= !result.is_silence;
        }
        assert!(seen_non_silence, "a loud tone must not be gated as silence");
    }

    #[test]
    fn processing_is_deterministic() {
        let mut first = VoiceActivityDetector::default();
        let mut second = VoiceActivityDetector::default();
        for frame_index in 0..30 {
            let frame = tone_frame(frame_index, 150.0, 1000.0);
            let a = first.process(&frame);
            let b = second.process(&frame);
            assert_eq!(a.probability, b.probability);
            assert_eq!(a.is_silence, b.is_silence);
        }
    }

    #[test]
    fn reset_restores_initial_sequence() {
        let mut vad = VoiceActivityDetector::default();
        let mut first_run = Vec::new();
        for frame_index in 0..15 {
            let frame = tone_frame(frame_index, 150.0, 1000.0);
            first_run.push(vad.process(&frame).probability);
        }
        vad.reset();
        let mut second_run = Vec::new();
        for frame_index in 0..15 {
            let frame = tone_frame(frame_index, 150.0, 1000.0);
            second_run.push(vad.process(&frame).probability);
        }
        assert_eq!(first_run, second_run);
    }

    #[test]
    fn silence_after_speech_returns_exactly_zero() {
        let mut vad = VoiceActivityDetector::default();
        for frame_index in 0..20 {
            vad.process(&tone_frame(frame_index, 200.0, 1000.0));
        }
        let silent = [0.0_f32; FRAME_SIZE_10MS_48K];
        // The high-pass filter state decays within a frame or two; after
        // that every zero frame is gated as silence.
        let mut results = Vec::new();
        for _ in 0..10 {
            results.push(vad.process(&silent));
        }
        let tail = &results[5..];
        assert!(tail.iter().all(|r| r.is_silence));
        assert!(tail.iter().all(|r| r.probability == 0.0));
    }

    #[test]
    fn periodic_reset_keeps_running() {
        let mut vad = VoiceActivityDetector::new(VadConfig {
            reset_period_frames: Some(3),
        });
        for frame_index in 0..30 {
            let frame = tone_frame(frame_index, 200.0, 1000.0);
            let result = vad.process(&frame);
            assert!((0.0..=1.0).contains(&result.probability));
        }
    }

    #[test]
    fn disabled_periodic_reset_matches_long_period() {
        let mut no_reset = VoiceActivityDetector::new(VadConfig {
            reset_period_frames: None,
        });
        let mut long_period = VoiceActivityDetector::new(VadConfig {
            reset_period_frames: Some(10_000),
        });
        for frame_index in 0..50 {
            let frame = tone_frame(frame_index, 150.0, 1000.0);
            let a = no_reset.process(&frame).probability;
            let b = long_period.process(&frame).probability;
            assert_eq!(a, b);
        }
    }
}
