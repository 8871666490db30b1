//! Benchmarks for the per-frame detection pipeline.
//!
//! The real-time budget is 10 ms per frame; the full pipeline must stay well
//! under that on any target hardware.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use parla::{FRAME_SIZE_10MS_48K, VoiceActivityDetector};
use std::f32::consts::TAU;

fn tone_frames(num_frames: usize, freq_hz: f32) -> Vec<[f32; FRAME_SIZE_10MS_48K]> {
    (0..num_frames)
        .map(|frame_index| {
            let mut frame = [0.0_f32; FRAME_SIZE_10MS_48K];
            for (i, sample) in frame.iter_mut().enumerate() {
                let t = (frame_index * FRAME_SIZE_10MS_48K + i) as f32;
                *sample = 1000.0 * (TAU * freq_hz * t / 48_000.0).sin();
            }
            frame
        })
        .collect()
}

fn bench_process_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_frame");

    // Voiced input: the full pipeline runs (pitch search, spectral
    // features, network).
    {
        let frames = tone_frames(100, 220.0);
        let mut vad = VoiceActivityDetector::default();
        // Warm up so we bench steady-state.
        for frame in &frames {
            vad.process(frame);
        }
        let mut i = 0;
        group.bench_function("voiced", |b| {
            b.iter(|| {
                let result = vad.process(black_box(&frames[i % frames.len()]));
                i += 1;
                black_box(result.probability)
            })
        });
    }

    // Silent input: the spectral gate short-circuits the classifier, but
    // filtering, decimation and pitch search still run.
    {
        let silent = [0.0_f32; FRAME_SIZE_10MS_48K];
        let mut vad = VoiceActivityDetector::default();
        group.bench_function("silent", |b| {
            b.iter(|| {
                let result = vad.process(black_box(&silent));
                black_box(result.probability)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_process_frame);
criterion_main!(benches);
