//! Run the detector over a WAV file and print per-frame probabilities.
//!
//! Expects mono 48 kHz input; 16-bit integer and 32-bit float WAV files are
//! supported. The trailing partial frame, if any, is discarded.
//!
//! ```sh
//! cargo run -p parla --features examples --example wav_probabilities -- input.wav
//! ```

use anyhow::{Context, Result, bail};
use clap::Parser;
use parla::{FRAME_SIZE_10MS_48K, SAMPLE_RATE_48K, VadConfig, VoiceActivityDetector};

#[derive(Parser, Debug)]
#[command(about = "Print per-frame voice probabilities for a WAV file")]
struct Args {
    /// Input WAV file (mono, 48 kHz).
    input: String,

    /// Only print frames whose probability is at least this value.
    #[arg(long, default_value_t = 0.0)]
    threshold: f32,

    /// Disable the periodic recurrent state reset.
    #[arg(long)]
    no_periodic_reset: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let mut reader = hound::WavReader::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input))?;
    let spec = reader.spec();
    if spec.channels != 1 {
        bail!("expected mono input, got {} channels", spec.channels);
    }
    if spec.sample_rate != SAMPLE_RATE_48K as u32 {
        bail!("expected 48 kHz input, got {} Hz", spec.sample_rate);
    }

    // Normalize to the S16 float range the detector expects.
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(f32::from))
            .collect::<Result<_, _>>()
            .context("failed to read samples")?,
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| v * 32768.0))
            .collect::<Result<_, _>>()
            .context("failed to read samples")?,
    };

    let config = VadConfig {
        reset_period_frames: if args.no_periodic_reset {
            None
        } else {
            VadConfig::default().reset_period_frames
        },
    };
    let mut vad = VoiceActivityDetector::new(config);

    println!("frame\ttime_s\tprobability\tsilence");
    for (frame_index, frame) in samples.chunks_exact(FRAME_SIZE_10MS_48K).enumerate() {
        let frame: &[f32; FRAME_SIZE_10MS_48K] = frame.try_into().expect("chunks are exact");
        let result = vad.process(frame);
        if result.probability >= args.threshold {
            println!(
                "{frame_index}\t{:.2}\t{:.4}\t{}",
                frame_index as f32 * 0.01,
                result.probability,
                if result.is_silence { "yes" } else { "no" },
            );
        }
    }
    Ok(())
}
