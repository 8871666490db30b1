#![doc = include_str!("../README.md")]

pub(crate) mod buffers;
pub(crate) mod common;
mod detector;
pub(crate) mod features;
pub(crate) mod lp_residual;
pub(crate) mod nn;
pub(crate) mod pitch;
pub(crate) mod spectral;
pub(crate) mod weights;

pub use common::{FRAME_SIZE_10MS_48K, SAMPLE_RATE_48K};
pub use detector::{VadConfig, VadResult, VoiceActivityDetector};
