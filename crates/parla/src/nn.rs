//! Recurrent network classifying the feature vector into a voice
//! probability.
//!
//! Architecture: FC(42 -> 24, tansig) -> GRU(24 -> 24) -> FC(24 -> 1,
//! sigmoid). Weights are int8-quantized with a single global scale and baked
//! in as data; layers re-layout them at construction so that each output
//! unit reads a contiguous row.

use crate::common::FEATURE_VECTOR_SIZE;
use crate::features::FeatureVector;
use crate::weights::{
    GRU_BIAS, GRU_RECURRENT_WEIGHTS, GRU_WEIGHTS, HIDDEN_LAYER_SIZE, INPUT_BIAS, INPUT_LAYER_SIZE,
    INPUT_WEIGHTS, OUTPUT_BIAS, OUTPUT_LAYER_SIZE, OUTPUT_WEIGHTS, WEIGHTS_SCALE,
};
use parla_dsp::math::dot_product;

/// Lookup table for the tanh approximation, sampled every 0.04 in `[0, 8]`.
const TANSIG_TABLE: [f32; 201] = [
    0.000000, 0.039979, 0.079830, 0.119427, 0.158649, 0.197375, 0.235496, 0.272905, 0.309507,
    0.345214, 0.379949, 0.413644, 0.446244, 0.477700, 0.507977, 0.537050, 0.564900, 0.591519,
    0.616909, 0.641077, 0.664037, 0.685809, 0.706419, 0.725897, 0.744277, 0.761594, 0.777888,
    0.793199, 0.807569, 0.821040, 0.833655, 0.845456, 0.856485, 0.866784, 0.876393, 0.885352,
    0.893698, 0.901468, 0.908698, 0.915420, 0.921669, 0.927473, 0.932862, 0.937863, 0.942503,
    0.946806, 0.950795, 0.954492, 0.957917, 0.961090, 0.964028, 0.966747, 0.969265, 0.971594,
    0.973749, 0.975743, 0.977587, 0.979293, 0.980869, 0.982327, 0.983675, 0.984921, 0.986072,
    0.987136, 0.988119, 0.989027, 0.989867, 0.990642, 0.991359, 0.992020, 0.992631, 0.993196,
    0.993718, 0.994199, 0.994644, 0.995055, 0.995434, 0.995784, 0.996108, 0.996407, 0.996682,
    0.996937, 0.997172, 0.997389, 0.997590, 0.997775, 0.997946, 0.998104, 0.998249, 0.998384,
    0.998508, 0.998623, 0.998728, 0.998826, 0.998916, 0.999000, 0.999076, 0.999147, 0.999213,
    0.999273, 0.999329, 0.999381, 0.999428, 0.999472, 0.999513, 0.999550, 0.999585, 0.999617,
    0.999646, 0.999673, 0.999699, 0.999722, 0.999743, 0.999763, 0.999781, 0.999798, 0.999813,
    0.999828, 0.999841, 0.999853, 0.999865, 0.999875, 0.999885, 0.999893, 0.999902, 0.999909,
    0.999916, 0.999923, 0.999929, 0.999934, 0.999939, 0.999944, 0.999948, 0.999952, 0.999956,
    0.999959, 0.999962, 0.999965, 0.999968, 0.999970, 0.999973, 0.999975, 0.999977, 0.999978,
    0.999980, 0.999982, 0.999983, 0.999984, 0.999986, 0.999987, 0.999988, 0.999989, 0.999990,
    0.999990, 0.999991, 0.999992, 0.999992, 0.999993, 0.999994, 0.999994, 0.999994, 0.999995,
    0.999995, 0.999996, 0.999996, 0.999996, 0.999997, 0.999997, 0.999997, 0.999997, 0.999997,
    0.999998, 0.999998, 0.999998, 0.999998, 0.999998, 0.999998, 0.999999, 0.999999, 0.999999,
    0.999999, 0.999999, 0.999999, 0.999999, 0.999999, 0.999999, 0.999999, 0.999999, 0.999999,
    0.999999, 1.000000, 1.000000, 1.000000, 1.000000, 1.000000, 1.000000, 1.000000, 1.000000,
    1.000000, 1.000000, 1.000000,
];

/// Approximated tanh via table lookup with linear interpolation and a
/// closed-form correction term.
#[inline]
pub(crate) fn tansig_approximated(x: f32) -> f32 {
    // Tests are reversed to saturate on NaN input.
    #[allow(
        clippy::neg_cmp_op_on_partial_ord,
        reason = "intentional NaN saturation"
    )]
    if !(x < 8.0) {
        return 1.0;
    }
    #[allow(
        clippy::neg_cmp_op_on_partial_ord,
        reason = "intentional NaN saturation"
    )]
    if !(x > -8.0) {
        return -1.0;
    }
    let (x_abs, sign) = if x < 0.0 { (-x, -1.0_f32) } else { (x, 1.0_f32) };
    let i = (0.5 + 25.0 * x_abs) as usize;
    let y = TANSIG_TABLE[i];
    // Map the index back to x's scale and correct towards the true curve.
    let residual = x_abs - 0.04 * i as f32;
    let y = y + residual * (1.0 - y * y) * (1.0 - y * residual);
    sign * y
}

/// Approximated sigmoid: `0.5 + 0.5 * tansig(0.5 * x)`.
#[inline]
pub(crate) fn sigmoid_approximated(x: f32) -> f32 {
    0.5 + 0.5 * tansig_approximated(0.5 * x)
}

/// The closed set of activation functions used by the network layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Activation {
    Tansig,
    Sigmoid,
    Relu,
}

impl Activation {
    #[inline]
    fn apply(self, x: f32) -> f32 {
        match self {
            Self::Tansig => tansig_approximated(x),
            Self::Sigmoid => sigmoid_approximated(x),
            Self::Relu => x.max(0.0),
        }
    }
}

/// Upper bound on layer widths, for statically sized scratch buffers.
const MAX_UNITS: usize = 24;

/// Number of GRU gates (update, reset, candidate).
const NUM_GRU_GATES: usize = 3;

/// Fully-connected layer.
///
/// Stateless between frames: the output is a pure function of the current
/// input.
#[derive(derive_more::Debug)]
pub(crate) struct FullyConnectedLayer {
    input_size: usize,
    output_size: usize,
    #[debug(skip)]
    bias: Vec<f32>,
    #[debug(skip)]
    weights: Vec<f32>,
    activation: Activation,
    #[debug(skip)]
    output: [f32; MAX_UNITS],
}

impl FullyConnectedLayer {
    /// Creates a layer from int8-quantized parameters.
    ///
    /// `weights` is column-major (`input_size` rows of `output_size`
    /// columns); it is transposed and scaled by [`WEIGHTS_SCALE`] here so
    /// every output unit reads a contiguous row at inference time.
    pub(crate) fn new(
        input_size: usize,
        output_size: usize,
        bias: &[i8],
        weights: &[i8],
        activation: Activation,
    ) -> Self {
        debug_assert!(output_size <= MAX_UNITS);
        debug_assert_eq!(bias.len(), output_size);
        debug_assert_eq!(weights.len(), input_size * output_size);

        let scaled_bias = bias.iter().map(|&b| WEIGHTS_SCALE * b as f32).collect();
        let mut scaled_weights = vec![0.0_f32; weights.len()];
        for o in 0..output_size {
            for i in 0..input_size {
                scaled_weights[o * input_size + i] =
                    WEIGHTS_SCALE * weights[i * output_size + o] as f32;
            }
        }

        Self {
            input_size,
            output_size,
            bias: scaled_bias,
            weights: scaled_weights,
            activation,
            output: [0.0; MAX_UNITS],
        }
    }

    pub(crate) fn input_size(&self) -> usize {
        self.input_size
    }

    pub(crate) fn size(&self) -> usize {
        self.output_size
    }

    pub(crate) fn output(&self) -> &[f32] {
        &self.output[..self.output_size]
    }

    /// Computes the layer output for `input`.
    pub(crate) fn compute_output(&mut self, input: &[f32]) {
        debug_assert_eq!(input.len(), self.input_size);
        for o in 0..self.output_size {
            let row = &self.weights[o * self.input_size..(o + 1) * self.input_size];
            self.output[o] = self.activation.apply(self.bias[o] + dot_product(input, row));
        }
    }
}

/// Gated recurrent layer.
///
/// Sigmoid update and reset gates, with the configured activation on the
/// candidate state. The state vector is the only cross-frame memory of the
/// classifier.
#[derive(derive_more::Debug)]
pub(crate) struct GatedRecurrentLayer {
    input_size: usize,
    output_size: usize,
    #[debug(skip)]
    bias: Vec<f32>,
    #[debug(skip)]
    weights: Vec<f32>,
    #[debug(skip)]
    recurrent_weights: Vec<f32>,
    activation: Activation,
    #[debug(skip)]
    state: [f32; MAX_UNITS],
}

impl GatedRecurrentLayer {
    /// Creates a layer from int8-quantized parameters.
    ///
    /// The source tensors are laid out `[n, gate, output]`; they are
    /// rearranged to `[gate, output, n]` and scaled by [`WEIGHTS_SCALE`].
    pub(crate) fn new(
        input_size: usize,
        output_size: usize,
        bias: &[i8],
        weights: &[i8],
        recurrent_weights: &[i8],
        activation: Activation,
    ) -> Self {
        debug_assert!(output_size <= MAX_UNITS);
        debug_assert_eq!(bias.len(), NUM_GRU_GATES * output_size);
        debug_assert_eq!(weights.len(), NUM_GRU_GATES * input_size * output_size);
        debug_assert_eq!(
            recurrent_weights.len(),
            NUM_GRU_GATES * output_size * output_size
        );

        let mut layer = Self {
            input_size,
            output_size,
            bias: rearrange_gru_tensor(bias, output_size),
            weights: rearrange_gru_tensor(weights, output_size),
            recurrent_weights: rearrange_gru_tensor(recurrent_weights, output_size),
            activation,
            state: [0.0; MAX_UNITS],
        };
        layer.reset();
        layer
    }

    pub(crate) fn input_size(&self) -> usize {
        self.input_size
    }

    pub(crate) fn size(&self) -> usize {
        self.output_size
    }

    pub(crate) fn output(&self) -> &[f32] {
        &self.state[..self.output_size]
    }

    /// Zeroes the recurrent state.
    pub(crate) fn reset(&mut self) {
        self.state.fill(0.0);
    }

    /// Advances the recurrent state by one step.
    pub(crate) fn compute_output(&mut self, input: &[f32]) {
        debug_assert_eq!(input.len(), self.input_size);

        // Update and reset gates, both sigmoid.
        let mut update = [0.0_f32; MAX_UNITS];
        self.compute_gate(input, 0, &mut update);
        let mut reset = [0.0_f32; MAX_UNITS];
        self.compute_gate(input, 1, &mut reset);

        // Candidate state from the reset-modulated memory.
        let mut gated_state = [0.0_f32; MAX_UNITS];
        for o in 0..self.output_size {
            gated_state[o] = self.state[o] * reset[o];
        }
        let stride_w = self.input_size * self.output_size;
        let stride_r = self.output_size * self.output_size;
        for o in 0..self.output_size {
            let w = &self.weights[2 * stride_w + o * self.input_size..][..self.input_size];
            let r = &self.recurrent_weights[2 * stride_r + o * self.output_size..]
                [..self.output_size];
            let candidate = self.activation.apply(
                self.bias[2 * self.output_size + o]
                    + dot_product(input, w)
                    + dot_product(&gated_state[..self.output_size], r),
            );
            // Blend the previous state with the candidate.
            self.state[o] = update[o] * self.state[o] + (1.0 - update[o]) * candidate;
        }
    }

    /// Computes one sigmoid gate: `g = sigmoid(W*input + R*state + b)`.
    fn compute_gate(&self, input: &[f32], gate_index: usize, gate: &mut [f32; MAX_UNITS]) {
        let stride_w = self.input_size * self.output_size;
        let stride_r = self.output_size * self.output_size;
        let bias_offset = gate_index * self.output_size;
        let state = &self.state[..self.output_size];
        for o in 0..self.output_size {
            let w = &self.weights[gate_index * stride_w + o * self.input_size..][..self.input_size];
            let r = &self.recurrent_weights[gate_index * stride_r + o * self.output_size..]
                [..self.output_size];
            gate[o] = sigmoid_approximated(
                self.bias[bias_offset + o] + dot_product(input, w) + dot_product(state, r),
            );
        }
    }
}

/// Rearranges a GRU tensor from `[n, gate, output]` to `[gate, output, n]`
/// and scales it.
fn rearrange_gru_tensor(tensor: &[i8], output_size: usize) -> Vec<f32> {
    let n = tensor.len() / (output_size * NUM_GRU_GATES);
    debug_assert_eq!(tensor.len(), n * output_size * NUM_GRU_GATES);

    let stride_src = NUM_GRU_GATES * output_size;
    let stride_dst = n * output_size;
    let mut rearranged = vec![0.0_f32; tensor.len()];
    for g in 0..NUM_GRU_GATES {
        for o in 0..output_size {
            for i in 0..n {
                rearranged[g * stride_dst + o * n + i] =
                    WEIGHTS_SCALE * tensor[i * stride_src + g * output_size + o] as f32;
            }
        }
    }
    rearranged
}

/// The VAD classifier network.
#[derive(Debug)]
pub(crate) struct VadNetwork {
    input: FullyConnectedLayer,
    hidden: GatedRecurrentLayer,
    output: FullyConnectedLayer,
}

impl Default for VadNetwork {
    fn default() -> Self {
        let input = FullyConnectedLayer::new(
            FEATURE_VECTOR_SIZE,
            INPUT_LAYER_SIZE,
            &INPUT_BIAS,
            &INPUT_WEIGHTS,
            Activation::Tansig,
        );
        let hidden = GatedRecurrentLayer::new(
            INPUT_LAYER_SIZE,
            HIDDEN_LAYER_SIZE,
            &GRU_BIAS,
            &GRU_WEIGHTS,
            &GRU_RECURRENT_WEIGHTS,
            Activation::Relu,
        );
        let output = FullyConnectedLayer::new(
            HIDDEN_LAYER_SIZE,
            OUTPUT_LAYER_SIZE,
            &OUTPUT_BIAS,
            &OUTPUT_WEIGHTS,
            Activation::Sigmoid,
        );
        debug_assert_eq!(input.size(), hidden.input_size());
        debug_assert_eq!(hidden.size(), output.input_size());
        Self {
            input,
            hidden,
            output,
        }
    }
}

impl VadNetwork {
    /// Zeroes the recurrent state.
    pub(crate) fn reset(&mut self) {
        self.hidden.reset();
    }

    /// Returns the voice probability for the given features.
    ///
    /// A silent frame resets the recurrent state and yields exactly 0.0
    /// without evaluating any layer, so stale memory cannot leak across
    /// silence gaps.
    pub(crate) fn compute_probability(
        &mut self,
        features: &FeatureVector,
        is_silence: bool,
    ) -> f32 {
        if is_silence {
            self.reset();
            return 0.0;
        }
        self.input.compute_output(features.as_array());
        self.hidden.compute_output(self.input.output());
        self.output.compute_output(self.hidden.output());
        debug_assert_eq!(self.output.size(), 1);
        self.output.output()[0]
    }

    #[cfg(test)]
    pub(crate) fn hidden_state(&self) -> &[f32] {
        self.hidden.output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[test]
    fn tansig_tracks_exact_tanh() {
        let mut x = -7.99_f32;
        while x <= 7.99 {
            let approx = tansig_approximated(x);
            let exact = x.tanh();
            assert!(
                (approx - exact).abs() < 1e-4,
                "x = {x}: approx {approx}, exact {exact}"
            );
            x += 0.013;
        }
    }

    #[test]
    fn tansig_saturation_and_nan() {
        assert_eq!(tansig_approximated(0.0), 0.0);
        assert_eq!(tansig_approximated(8.0), 1.0);
        assert_eq!(tansig_approximated(100.0), 1.0);
        assert_eq!(tansig_approximated(-8.0), -1.0);
        assert_eq!(tansig_approximated(-100.0), -1.0);
        assert_eq!(tansig_approximated(f32::NAN), 1.0);
    }

    #[test]
    fn tansig_is_odd() {
        for &x in &[0.1_f32, 0.5, 1.0, 2.5, 6.0] {
            let pos = tansig_approximated(x);
            let neg = tansig_approximated(-x);
            assert!((pos + neg).abs() < 1e-6, "asymmetry at {x}");
        }
    }

    #[test]
    fn sigmoid_bounds_and_midpoint() {
        assert!((sigmoid_approximated(0.0) - 0.5).abs() < 1e-6);
        assert!((sigmoid_approximated(100.0) - 1.0).abs() < 1e-4);
        assert!(sigmoid_approximated(-100.0).abs() < 1e-4);
        let mut x = -20.0_f32;
        while x <= 20.0 {
            let s = sigmoid_approximated(x);
            assert!((0.0..=1.0).contains(&s), "sigmoid({x}) = {s}");
            x += 0.37;
        }
    }

    #[test]
    fn relu_clamps_negative_values() {
        assert_eq!(Activation::Relu.apply(-1.5), 0.0);
        assert_eq!(Activation::Relu.apply(0.0), 0.0);
        assert_eq!(Activation::Relu.apply(2.5), 2.5);
    }

    #[test]
    fn fully_connected_matches_direct_computation() {
        const INPUT_SIZE: usize = 3;
        const OUTPUT_SIZE: usize = 2;
        // Column-major: weights[i * OUTPUT_SIZE + o].
        let weights: [i8; 6] = [64, -32, 16, 8, -128, 127];
        let bias: [i8; 2] = [10, -20];
        let input = [0.5_f32, -1.25, 2.0];

        let mut layer = FullyConnectedLayer::new(
            INPUT_SIZE,
            OUTPUT_SIZE,
            &bias,
            &weights,
            Activation::Tansig,
        );
        layer.compute_output(&input);

        for o in 0..OUTPUT_SIZE {
            let mut sum = WEIGHTS_SCALE * bias[o] as f32;
            for i in 0..INPUT_SIZE {
                sum += input[i] * (WEIGHTS_SCALE * weights[i * OUTPUT_SIZE + o] as f32);
            }
            let expected = tansig_approximated(sum);
            let actual = layer.output()[o];
            assert!(
                (expected - actual).abs() < 3e-6,
                "output[{o}]: expected {expected}, got {actual}"
            );
        }
    }

    fn small_gru() -> GatedRecurrentLayer {
        const INPUT_SIZE: usize = 2;
        const OUTPUT_SIZE: usize = 2;
        let bias: [i8; 6] = [12, -34, 56, -78, 90, -12];
        let weights: [i8; 12] = [64, -3, 50, 21, -6, 27, -39, 62, 31, -83, -52, -48];
        let recurrent: [i8; 12] = [-6, 83, -19, 104, 105, 48, 23, 68, 23, 40, 7, -120];
        GatedRecurrentLayer::new(
            INPUT_SIZE,
            OUTPUT_SIZE,
            &bias,
            &weights,
            &recurrent,
            Activation::Relu,
        )
    }

    #[test]
    fn gru_state_starts_and_resets_to_zero() {
        let mut gru = small_gru();
        assert!(gru.output().iter().all(|&s| s == 0.0));
        gru.compute_output(&[0.9, -0.4]);
        gru.compute_output(&[0.1, 0.8]);
        gru.reset();
        assert!(gru.output().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn gru_is_deterministic_from_reset() {
        let inputs = [[0.9_f32, -0.4], [0.1, 0.8], [-0.7, 0.2]];
        let mut first = small_gru();
        let mut second = small_gru();
        for input in &inputs {
            first.compute_output(input);
            second.compute_output(input);
        }
        assert_eq!(first.output(), second.output());
    }

    #[test]
    fn gru_state_stays_non_negative_with_relu_candidate() {
        // From a zero state, every new state value is a convex blend of the
        // previous (non-negative) value and a ReLU output.
        let mut gru = small_gru();
        for step in 0..20 {
            let x = step as f32 * 0.1 - 1.0;
            gru.compute_output(&[x, -x]);
            assert!(
                gru.output().iter().all(|&s| s >= 0.0),
                "negative state at step {step}"
            );
        }
    }

    fn voiced_features() -> FeatureVector {
        let mut features = FeatureVector::zeroed();
        features.average = [-1.0, -0.6, -7.8, 7.9, -2.9, 3.3];
        features.higher_bands_cepstrum[0] = -0.65;
        features.higher_bands_cepstrum[1] = 0.53;
        features.first_derivative = [-8.3, 3.1, 1.4, -0.9, -0.2, -0.8];
        features.second_derivative = [2.1, -2.0, -0.7, -0.9, -0.5, 0.6];
        features.cross_correlation_cepstrum = [-0.6, -0.04, 0.57, 0.44, 0.42, 0.16];
        features.pitch_period = -2.13;
        features.variability = 10.0;
        features
    }

    #[test]
    fn silence_resets_state_and_returns_zero() {
        let mut network = VadNetwork::default();
        for _ in 0..10 {
            network.compute_probability(&voiced_features(), false);
        }
        assert_eq!(network.compute_probability(&voiced_features(), true), 0.0);
        assert!(network.hidden_state().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn probability_is_in_unit_interval() {
        let mut network = VadNetwork::default();
        for _ in 0..20 {
            let p = network.compute_probability(&voiced_features(), false);
            assert!((0.0..=1.0).contains(&p), "probability {p} out of range");
        }
    }

    #[test]
    fn reset_restores_initial_behavior() {
        let mut network = VadNetwork::default();
        let mut first_run = Vec::new();
        for _ in 0..5 {
            first_run.push(network.compute_probability(&voiced_features(), false));
        }
        network.reset();
        let mut second_run = Vec::new();
        for _ in 0..5 {
            second_run.push(network.compute_probability(&voiced_features(), false));
        }
        assert_eq!(first_run, second_run);
    }

    #[test]
    fn silence_gap_does_not_leak_memory() {
        let mut network = VadNetwork::default();
        let mut reference = Vec::new();
        for _ in 0..5 {
            reference.push(network.compute_probability(&voiced_features(), false));
        }
        // A silent frame fully clears the recurrent memory, so the next
        // voiced run repeats the reference sequence.
        network.compute_probability(&voiced_features(), true);
        let mut after_gap = Vec::new();
        for _ in 0..5 {
            after_gap.push(network.compute_probability(&voiced_features(), false));
        }
        assert_eq!(reference, after_gap);
    }
}
