//! Constant, linear and exponential fits of the ratio-vs-intensity scatter.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::scatter::ScatterSamples;
use crate::math::lm_optimizer::{optimize, LmConfig};
use crate::math::regression::fit_line;
use crate::model::{FittedModel, ModelKind};

/// Linear fits with a smaller absolute slope are rejected.
pub const MIN_LINEAR_SLOPE: f64 = 1e-5;

/// The low bucket must hold more samples than this to provide the exponential offset.
const MIN_LOW_BUCKET: usize = 2;

/// The log-linear warm start needs at least this many high-bucket samples.
const MIN_HIGH_BUCKET: usize = 2;

/// Optimizer outcome of an exponential fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerReport {
    pub iterations: usize,
    pub converged: bool,
    pub chi2: f64,
}

/// All three bleed-through models fitted to one scatter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BleedThroughFit {
    pub constant: FittedModel,
    pub linear: FittedModel,
    pub exponential: FittedModel,
    /// Present when the exponential fit reached the optimizer.
    pub optimizer: Option<OptimizerReport>,
}

impl BleedThroughFit {
    pub fn model(&self, kind: ModelKind) -> FittedModel {
        match kind {
            ModelKind::Constant => self.constant,
            ModelKind::Linear => self.linear,
            ModelKind::Exponential => self.exponential,
        }
    }
}

/// Mean ratio; no fit on an empty scatter.
pub fn fit_constant(samples: &ScatterSamples) -> FittedModel {
    if samples.is_empty() {
        return FittedModel::no_fit(ModelKind::Constant);
    }
    let sum: f64 = samples.ratio.iter().map(|&r| r as f64).sum();
    FittedModel::constant((sum / samples.len() as f64) as f32)
}

/// Least-squares line through the scatter. Needs a fitted constant model.
pub fn fit_linear(samples: &ScatterSamples, constant: &FittedModel) -> FittedModel {
    let no_fit = FittedModel::no_fit(ModelKind::Linear);
    if !constant.fitted {
        return no_fit;
    }

    let Some(line) = fit_line(samples.iter().map(|(c, r)| (c as f64, r as f64))) else {
        return no_fit;
    };
    if line.slope.abs() < MIN_LINEAR_SLOPE {
        debug!(slope = line.slope, "Linear bleed-through slope too small");
        return no_fit;
    }

    FittedModel::linear(line.intercept as f32, line.slope as f32)
}

/// Exponential through the linear fit's values at both ends of the channel range,
/// with a rate of one e-fold per range.
fn seed_from_linear(samples: &ScatterSamples, linear: &FittedModel) -> Option<[f64; 3]> {
    let (lo, hi) = samples.channel_range()?;
    let (lo, hi) = (lo as f64, hi as f64);
    let span = hi - lo;
    if span <= 0.0 {
        return None;
    }

    let [intercept, slope, _] = linear.params.map(f64::from);
    let (r_lo, r_hi) = (intercept + slope * lo, intercept + slope * hi);
    let e = 1.0 / span;
    let b = (r_hi - r_lo) / ((e * hi).exp() - (e * lo).exp());
    let a = r_lo - b * (e * lo).exp();

    let seed = [a, b, e];
    seed.iter().all(|v| v.is_finite()).then_some(seed)
}

/// `a + b * exp(e * x)` fit. Needs fitted constant and linear models.
///
/// The samples are split at `channel_mid`. The offset `a` starts at the mean ratio
/// of the low half (or the constant fit when that half is nearly empty); `b` and `e`
/// start from a line through `ln(ratio - a)` over the high half. When that line is
/// degenerate (all high samples share one channel) the start is taken from the
/// linear fit over the channel range instead. All three are then refined by
/// Levenberg-Marquardt.
pub fn fit_exponential(
    samples: &ScatterSamples,
    constant: &FittedModel,
    linear: &FittedModel,
    channel_mid: f32,
    config: &LmConfig,
) -> (FittedModel, Option<OptimizerReport>) {
    let no_fit = FittedModel::no_fit(ModelKind::Exponential);
    if !constant.fitted || !linear.fitted {
        return (no_fit, None);
    }

    let (low_sum, low_count) = samples
        .iter()
        .filter(|&(c, _)| c < channel_mid)
        .fold((0.0f64, 0usize), |(s, n), (_, r)| (s + r as f64, n + 1));
    let offset = if low_count > MIN_LOW_BUCKET {
        low_sum / low_count as f64
    } else {
        constant.params[0] as f64
    };

    let high: Vec<(f64, f64)> = samples
        .iter()
        .filter(|&(c, r)| c > channel_mid && r as f64 - offset > 0.0)
        .map(|(c, r)| (c as f64, (r as f64 - offset).ln()))
        .collect();
    if high.len() < MIN_HIGH_BUCKET {
        debug!(
            high = high.len(),
            "Too few samples above the midpoint for an exponential fit"
        );
        return (no_fit, None);
    }
    let start = match fit_line(high) {
        Some(warm) => [offset, warm.intercept.exp(), warm.slope],
        None => match seed_from_linear(samples, linear) {
            Some(seed) => seed,
            None => return (no_fit, None),
        },
    };

    let x: Vec<f64> = samples.channel.iter().map(|&c| c as f64).collect();
    let y: Vec<f64> = samples.ratio.iter().map(|&r| r as f64).collect();
    let sigma = vec![1.0; x.len()];

    let result = match optimize(
        &ModelKind::Exponential,
        &x,
        &y,
        &sigma,
        &start,
        &[true; 3],
        config,
    ) {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Exponential bleed-through fit failed");
            return (no_fit, None);
        }
    };

    let report = OptimizerReport {
        iterations: result.iterations,
        converged: result.converged,
        chi2: result.chi2,
    };
    if !result.converged {
        warn!(
            iterations = result.iterations,
            chi2 = result.chi2,
            "Exponential fit stopped on the iteration limit, keeping the best parameters"
        );
    }

    let [a, b, e] = [result.params[0], result.params[1], result.params[2]];
    if !(a.is_finite() && b.is_finite() && e.is_finite()) {
        warn!("Exponential fit produced non-finite parameters");
        return (no_fit, Some(report));
    }

    debug!(a, b, e, iterations = result.iterations, "Exponential bleed-through fit");
    (
        FittedModel::exponential(a as f32, b as f32, e as f32),
        Some(report),
    )
}
