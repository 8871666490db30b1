//! Windowed real-input forward FFT.
//!
//! Applies the first half of a Vorbis window (mirrored onto the second half
//! of the frame) and computes the forward transform, producing
//! `frame_size / 2 + 1` complex coefficients.

pub use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

/// Windowed forward FFT over frames of a fixed even length.
#[derive(derive_more::Debug)]
pub struct WindowedFft {
    frame_size: usize,
    half_window: Vec<f32>,
    #[debug(skip)]
    fft: Arc<dyn RealToComplex<f32>>,
    #[debug(skip)]
    input: Vec<f32>,
    #[debug(skip)]
    scratch: Vec<Complex<f32>>,
}

impl WindowedFft {
    /// Creates a transform for frames of `frame_size` samples.
    ///
    /// The analysis window embeds a `1 / frame_size` scaling so that the
    /// spectral coefficients are already normalized.
    pub fn new(frame_size: usize) -> Self {
        assert!(frame_size.is_multiple_of(2), "the frame size must be even");
        let scaling = 1.0 / frame_size as f32;
        let fft = RealFftPlanner::<f32>::new().plan_fft_forward(frame_size);
        let input = fft.make_input_vec();
        let scratch = fft.make_scratch_vec();
        Self {
            frame_size,
            half_window: compute_scaled_half_vorbis_window(frame_size / 2, scaling),
            fft,
            input,
            scratch,
        }
    }

    /// Number of complex coefficients produced per frame.
    pub fn output_len(&self) -> usize {
        self.frame_size / 2 + 1
    }

    /// Windows `frame` and writes its forward FFT into `out`.
    ///
    /// The Nyquist coefficient is real-valued; its imaginary part is forced
    /// to zero after the transform.
    pub fn forward(&mut self, frame: &[f32], out: &mut [Complex<f32>]) {
        debug_assert_eq!(frame.len(), self.frame_size);
        debug_assert_eq!(out.len(), self.output_len());

        let half_size = self.frame_size / 2;
        for i in 0..half_size {
            let j = self.frame_size - 1 - i;
            self.input[i] = frame[i] * self.half_window[i];
            self.input[j] = frame[j] * self.half_window[i];
        }

        self.fft
            .process_with_scratch(&mut self.input, out, &mut self.scratch)
            .expect("buffer sizes are fixed at construction");
        out[half_size].im = 0.0;
    }
}

/// First half of the Vorbis window, scaled.
fn compute_scaled_half_vorbis_window(half_size: usize, scaling: f32) -> Vec<f32> {
    let mut half_window = vec![0.0_f32; half_size];
    for (i, w) in half_window.iter_mut().enumerate() {
        let sin_arg = FRAC_PI_2 * (i as f32 + 0.5) / half_size as f32;
        *w = scaling * (FRAC_PI_2 * sin_arg.sin() * sin_arg.sin()).sin();
    }
    half_window
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    const FRAME_SIZE: usize = 480;

    #[test]
    fn output_has_expected_length() {
        let fft = WindowedFft::new(FRAME_SIZE);
        assert_eq!(fft.output_len(), FRAME_SIZE / 2 + 1);
    }

    #[test]
    fn zero_frame_zero_spectrum() {
        let mut fft = WindowedFft::new(FRAME_SIZE);
        let frame = [0.0_f32; FRAME_SIZE];
        let mut out = vec![Complex::default(); fft.output_len()];
        fft.forward(&frame, &mut out);
        assert!(out.iter().all(|c| c.re == 0.0 && c.im == 0.0));
    }

    #[test]
    fn nyquist_bin_is_real() {
        let mut fft = WindowedFft::new(FRAME_SIZE);
        let frame: Vec<f32> = (0..FRAME_SIZE)
            .map(|i| (TAU * 1000.0 * i as f32 / 24000.0).sin())
            .collect();
        let mut out = vec![Complex::default(); fft.output_len()];
        fft.forward(&frame, &mut out);
        assert_eq!(out[FRAME_SIZE / 2].im, 0.0);
    }

    #[test]
    fn tone_peaks_at_expected_bin() {
        // 1 kHz at 24 kHz with 480-point frames -> bin 20.
        let mut fft = WindowedFft::new(FRAME_SIZE);
        let frame: Vec<f32> = (0..FRAME_SIZE)
            .map(|i| (TAU * 1000.0 * i as f32 / 24000.0).sin())
            .collect();
        let mut out = vec![Complex::default(); fft.output_len()];
        fft.forward(&frame, &mut out);

        let peak_bin = out
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.norm_sqr().total_cmp(&b.norm_sqr()))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak_bin, 20);
    }

    #[test]
    fn window_symmetry_preserved() {
        // A symmetric input frame keeps a symmetric windowed frame, which
        // makes the spectrum of a real even sequence (almost) real.
        let mut fft = WindowedFft::new(64);
        let mut frame = [0.0_f32; 64];
        for i in 0..32 {
            let v = (i as f32 * 0.1).cos();
            frame[i] = v;
            frame[63 - i] = v;
        }
        let mut out = vec![Complex::default(); fft.output_len()];
        fft.forward(&frame, &mut out);
        // DC stays real by definition.
        assert_eq!(out[0].im, 0.0);
    }
}
