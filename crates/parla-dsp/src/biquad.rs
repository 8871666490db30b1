//! Second-order IIR (biquad) filter.
//!
//! Transposed direct-form-II with double-precision internal state, used for
//! the high-pass pre-emphasis stage of the analysis pipeline.

/// Biquad filter coefficients.
///
/// Transfer function:
/// `H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)`
#[derive(Debug, Clone, Copy)]
pub struct BiQuadFilterCoefficients {
    /// Feedforward coefficients `[b0, b1, b2]`.
    pub b: [f32; 3],
    /// Feedback coefficients `[a1, a2]`.
    pub a: [f32; 2],
}

/// Stateful second-order IIR filter.
///
/// The two delay elements are kept in `f64` to control error accumulation
/// over long streams; the output is cast back to `f32`.
#[derive(Debug)]
pub struct BiQuadFilter {
    coefficients: BiQuadFilterCoefficients,
    /// Transposed direct-form-II state `[m0, m1]`.
    state: [f64; 2],
}

impl BiQuadFilter {
    /// Creates a new filter with zeroed state.
    pub fn new(coefficients: BiQuadFilterCoefficients) -> Self {
        Self {
            coefficients,
            state: [0.0; 2],
        }
    }

    /// Resets the filter state to zero.
    pub fn reset(&mut self) {
        self.state = [0.0; 2];
    }

    /// Overwrites the filter state, for deterministic seeding.
    pub fn set_state(&mut self, state: [f32; 2]) {
        self.state = [state[0] as f64, state[1] as f64];
    }

    /// Filters `x` into `y` sample by sample.
    ///
    /// `x` and `y` must have the same length; they may alias (see
    /// [`Self::process_in_place`]).
    pub fn process(&mut self, x: &[f32], y: &mut [f32]) {
        debug_assert_eq!(x.len(), y.len());
        for (x_k, y_k) in x.iter().zip(y.iter_mut()) {
            *y_k = self.step(*x_k);
        }
    }

    /// Filters `samples` in place.
    pub fn process_in_place(&mut self, samples: &mut [f32]) {
        for sample in samples.iter_mut() {
            *sample = self.step(*sample);
        }
    }

    #[inline]
    fn step(&mut self, x: f32) -> f32 {
        let b = &self.coefficients.b;
        let a = &self.coefficients.a;
        let x = x as f64;
        let y = b[0] as f64 * x + self.state[0];
        self.state[0] = self.state[1] + b[1] as f64 * x - a[0] as f64 * y;
        self.state[1] = b[2] as f64 * x - a[1] as f64 * y;
        y as f32
    }
}
