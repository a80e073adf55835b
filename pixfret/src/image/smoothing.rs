//! Recursive (IIR) Gaussian approximation with mirror boundary conditions.
//!
//! The Gaussian is approximated by `POLE_COUNT` cascaded first-order causal and
//! anti-causal filters sharing one real pole. Each pass is seeded with the exact
//! response of the mirror-extended signal, so borders need no padding.

/// Number of cascaded pole pairs.
pub const POLE_COUNT: usize = 3;

/// Relative weight below which terms of the causal seed sum are dropped.
const SEED_TOLERANCE: f64 = 1e-6;

/// Poles and overall gain of the recursive filter for one `sigma`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianPoles {
    pub poles: [f64; POLE_COUNT],
    pub gain: f64,
}

/// Filter coefficients for `sigma`, or `None` when `sigma` is not a positive finite
/// value (smoothing is then a no-op).
pub fn gaussian_poles(sigma: f64) -> Option<GaussianPoles> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return None;
    }

    let n = POLE_COUNT as f64;
    let s2 = sigma * sigma;
    let pole = 1.0 + n / s2 - (n * n + 2.0 * n * s2).sqrt() / s2;
    // Underflows to 0 for vanishing sigma.
    if !(pole > 0.0 && pole < 1.0) {
        return None;
    }

    let poles = [pole; POLE_COUNT];
    let gain = poles
        .iter()
        .map(|&z| (1.0 - z) * (1.0 - 1.0 / z))
        .product();

    Some(GaussianPoles { poles, gain })
}

/// Smooths one row or column in place. Lines shorter than 2 samples are untouched.
pub fn smooth_line(line: &mut [f32], poles: &GaussianPoles) {
    let len = line.len();
    if len < 2 {
        return;
    }

    let mut signal: Vec<f64> = line.iter().map(|&v| v as f64 * poles.gain).collect();

    for &z in &poles.poles {
        signal[0] = causal_seed(&signal, z);
        for n in 1..len {
            signal[n] += z * signal[n - 1];
        }

        signal[len - 1] = anti_causal_seed(&signal, z);
        for n in (0..len - 1).rev() {
            signal[n] = z * (signal[n + 1] - signal[n]);
        }
    }

    for (dst, &src) in line.iter_mut().zip(&signal) {
        *dst = src as f32;
    }
}

/// Steady-state causal output at sample 0 of the mirror-extended signal.
fn causal_seed(signal: &[f64], z: f64) -> f64 {
    let len = signal.len();
    let horizon = (2 + (SEED_TOLERANCE.ln() / z.abs().ln()) as usize).min(len);

    let mut z1 = z;
    let mut zn = z.powi(len as i32 - 1);
    let mut sum = signal[0] + zn * signal[len - 1];
    zn *= zn;

    for &c in &signal[1..horizon.saturating_sub(1).max(1)] {
        zn /= z;
        sum += (z1 + zn) * c;
        z1 *= z;
    }

    sum / (1.0 - z.powi(2 * len as i32 - 2))
}

/// Anti-causal output at the last sample, given the completed causal pass.
fn anti_causal_seed(signal: &[f64], z: f64) -> f64 {
    let len = signal.len();
    (z * signal[len - 2] + signal[len - 1]) * z / (z * z - 1.0)
}
