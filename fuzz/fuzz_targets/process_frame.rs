#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use parla::{FRAME_SIZE_10MS_48K, VadConfig, VoiceActivityDetector};

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Periodic reset cadence in frames; 0 disables it.
    reset_period: u16,
    /// Audio samples, split into 10 ms frames.
    samples: Vec<f32>,
}

/// Clamp to the S16 float range, replacing NaN/inf with 0.
fn sanitize_sample(s: f32) -> f32 {
    if s.is_finite() {
        s.clamp(-32768.0, 32767.0)
    } else {
        0.0
    }
}

fuzz_target!(|input: FuzzInput| {
    let config = VadConfig {
        reset_period_frames: match input.reset_period {
            0 => None,
            n => Some(n as u32),
        },
    };
    let mut vad = VoiceActivityDetector::new(config);

    let sanitized: Vec<f32> = input.samples.iter().copied().map(sanitize_sample).collect();
    for chunk in sanitized.chunks_exact(FRAME_SIZE_10MS_48K) {
        let frame: &[f32; FRAME_SIZE_10MS_48K] = chunk.try_into().unwrap();
        let result = vad.process(frame);
        assert!(result.probability.is_finite());
        assert!((0.0..=1.0).contains(&result.probability));
    }
});
