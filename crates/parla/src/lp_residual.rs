//! Linear-prediction residual of the pitch buffer.
//!
//! Pitch is estimated on the LP residual rather than on the raw signal: the
//! inverse filter flattens the spectral envelope so the autocorrelation peaks
//! at the fundamental period instead of at formant-driven lags.

use parla_dsp::math::dot_product;

/// Order of the inverse filter (including the implicit leading 1).
pub(crate) const NUM_LPC_COEFFICIENTS: usize = 5;

/// Computes inverse-filter coefficients tailored for pitch estimation.
///
/// An all-zero frame yields all-zero coefficients.
pub(crate) fn compute_lpc_coefficients(x: &[f32], lpc: &mut [f32; NUM_LPC_COEFFICIENTS]) {
    debug_assert!(x.len() > NUM_LPC_COEFFICIENTS);

    let mut auto_corr = [0.0_f32; NUM_LPC_COEFFICIENTS];
    for (lag, coeff) in auto_corr.iter_mut().enumerate() {
        *coeff = dot_product(&x[..x.len() - lag], &x[lag..]);
    }

    if auto_corr[0] == 0.0 {
        // Empty frame.
        lpc.fill(0.0);
        return;
    }

    denoise_auto_correlation(&mut auto_corr);
    let mut lpc_pre = [0.0_f32; NUM_LPC_COEFFICIENTS - 1];
    levinson_durbin(&auto_corr, &mut lpc_pre);

    // Bandwidth expansion.
    lpc_pre[0] *= 0.9;
    lpc_pre[1] *= 0.9 * 0.9;
    lpc_pre[2] *= 0.9 * 0.9 * 0.9;
    lpc_pre[3] *= 0.9 * 0.9 * 0.9 * 0.9;

    // Fold a first-order pre-emphasis filter into the coefficients.
    const C: f32 = 0.8;
    lpc[0] = lpc_pre[0] + C;
    lpc[1] = lpc_pre[1] + C * lpc_pre[0];
    lpc[2] = lpc_pre[2] + C * lpc_pre[1];
    lpc[3] = lpc_pre[3] + C * lpc_pre[2];
    lpc[4] = C * lpc_pre[3];
}

/// Inverse-filters `x` into `y`.
pub(crate) fn compute_lp_residual(lpc: &[f32; NUM_LPC_COEFFICIENTS], x: &[f32], y: &mut [f32]) {
    debug_assert!(x.len() > NUM_LPC_COEFFICIENTS);
    debug_assert_eq!(x.len(), y.len());

    // y[i] = x[i] + sum_k lpc[k] * x[i - 1 - k], with the first taps clipped.
    y[0] = x[0];
    for i in 1..NUM_LPC_COEFFICIENTS {
        let mut sum = x[i];
        for k in 0..i {
            sum += lpc[k] * x[i - 1 - k];
        }
        y[i] = sum;
    }
    for i in NUM_LPC_COEFFICIENTS..x.len() {
        let mut sum = x[i];
        for (k, &c) in lpc.iter().enumerate() {
            sum += c * x[i - 1 - k];
        }
        y[i] = sum;
    }
}

/// Assumes a -40 dB white noise floor.
fn denoise_auto_correlation(auto_corr: &mut [f32; NUM_LPC_COEFFICIENTS]) {
    auto_corr[0] *= 1.0001;
    // (0.008 * 0.008 * i * i) for i in 1..5.
    auto_corr[1] -= auto_corr[1] * 0.000064;
    auto_corr[2] -= auto_corr[2] * 0.000256;
    auto_corr[3] -= auto_corr[3] * 0.000576;
    auto_corr[4] -= auto_corr[4] * 0.001024;
}

/// Levinson-Durbin recursion for the initial inverse-filter coefficients.
fn levinson_durbin(
    auto_corr: &[f32; NUM_LPC_COEFFICIENTS],
    lpc: &mut [f32; NUM_LPC_COEFFICIENTS - 1],
) {
    let mut error = auto_corr[0];
    for i in 0..NUM_LPC_COEFFICIENTS - 1 {
        let mut reflection = 0.0_f32;
        for j in 0..i {
            reflection += lpc[j] * auto_corr[i - j];
        }
        reflection += auto_corr[i + 1];

        // Avoid division by values close to zero.
        const MIN_ERROR_MAGNITUDE: f32 = 1e-6;
        if error.abs() < MIN_ERROR_MAGNITUDE {
            error = error.signum() * MIN_ERROR_MAGNITUDE;
        }

        reflection /= -error;
        lpc[i] = reflection;
        for j in 0..(i + 1) >> 1 {
            let tmp1 = lpc[j];
            let tmp2 = lpc[i - 1 - j];
            lpc[j] = tmp1 + reflection * tmp2;
            lpc[i - 1 - j] = tmp2 + reflection * tmp1;
        }
        error -= reflection * reflection * error;
        if error < 0.001 * auto_corr[0] {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    #[test]
    fn empty_frame_is_well_behaved() {
        let frame = [0.0_f32; 480];
        let mut lpc = [0.0_f32; NUM_LPC_COEFFICIENTS];
        compute_lpc_coefficients(&frame, &mut lpc);
        assert_eq!(lpc, [0.0; NUM_LPC_COEFFICIENTS]);

        let mut residual = [0.0_f32; 480];
        compute_lp_residual(&lpc, &frame, &mut residual);
        assert!(residual.iter().all(|&r| r == 0.0));
    }

    #[test]
    fn residual_is_finite_for_tonal_input() {
        let frame: Vec<f32> = (0..480)
            .map(|i| (TAU * 200.0 * i as f32 / 24000.0).sin())
            .collect();
        let mut lpc = [0.0_f32; NUM_LPC_COEFFICIENTS];
        compute_lpc_coefficients(&frame, &mut lpc);
        assert!(lpc.iter().any(|&c| c != 0.0));
        assert!(lpc.iter().all(|c| c.is_finite()));

        let mut residual = vec![0.0_f32; 480];
        compute_lp_residual(&lpc, &frame, &mut residual);
        assert!(residual.iter().all(|r| r.is_finite()));
    }

    #[test]
    fn residual_whitens_predictable_input() {
        // A strongly autocorrelated signal must lose energy through the
        // inverse filter at the lags the filter covers.
        let frame: Vec<f32> = (0..480)
            .map(|i| (TAU * 150.0 * i as f32 / 24000.0).sin())
            .collect();
        let mut lpc = [0.0_f32; NUM_LPC_COEFFICIENTS];
        compute_lpc_coefficients(&frame, &mut lpc);

        let mut residual = vec![0.0_f32; frame.len()];
        compute_lp_residual(&lpc, &frame, &mut residual);

        let energy = |x: &[f32]| dot_product(x, x);
        assert!(energy(&residual[NUM_LPC_COEFFICIENTS..]) < energy(&frame[NUM_LPC_COEFFICIENTS..]));
    }
}
