#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

pub mod biquad;
pub mod decimator;
pub mod fft;
pub mod math;
