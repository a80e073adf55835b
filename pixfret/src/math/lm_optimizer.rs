//! Levenberg-Marquardt optimizer for weighted nonlinear least squares.
//!
//! Minimizes `chi2 = sum(((y_i - f(x_i; p)) / sigma_i)^2)` over the active subset of
//! the parameters. Uses f64 throughout.

use thiserror::Error;
use tracing::{trace, warn};

use super::cholesky::{decompose, solve_decomposed};
use super::SquareMatrix;

/// Configuration for Levenberg-Marquardt optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct LmConfig {
    /// Maximum iterations, accepted and rejected steps alike.
    pub max_iterations: usize,
    /// Initial damping parameter.
    pub initial_lambda: f64,
    /// Factor to increase lambda on a rejected step.
    pub lambda_up: f64,
    /// Factor to decrease lambda on an accepted step.
    pub lambda_down: f64,
    /// Chi-square change at or below which an iteration counts as settled.
    pub chi2_tolerance: f64,
    /// Consecutive settled iterations that end the run.
    pub settle_iterations: usize,
}

impl Default for LmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            initial_lambda: 0.001,
            lambda_up: 10.0,
            lambda_down: 0.1,
            chi2_tolerance: 0.001,
            settle_iterations: 4,
        }
    }
}

impl LmConfig {
    pub fn validate(&self) {
        assert!(self.max_iterations > 0, "max_iterations must be positive");
        assert!(
            self.initial_lambda > 0.0,
            "initial_lambda must be positive, got {}",
            self.initial_lambda
        );
        assert!(
            self.lambda_up > 1.0 && self.lambda_down > 0.0 && self.lambda_down < 1.0,
            "lambda factors must satisfy lambda_up > 1 and 0 < lambda_down < 1"
        );
        assert!(
            self.chi2_tolerance >= 0.0,
            "chi2_tolerance must be non-negative"
        );
        assert!(
            self.settle_iterations > 0,
            "settle_iterations must be positive"
        );
    }
}

/// Result of L-M optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct LmResult {
    pub params: Vec<f64>,
    pub chi2: f64,
    /// `false` when the run stopped on `max_iterations`.
    pub converged: bool,
    pub iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LmError {
    #[error("Normal matrix is not positive definite at iteration {iteration}")]
    NotPositiveDefinite { iteration: usize },
}

/// Model that can be fit with L-M optimization.
pub trait LmModel {
    /// Number of parameters the model takes.
    fn param_count(&self) -> usize;

    /// Model value at `x`.
    fn evaluate(&self, x: f64, params: &[f64]) -> f64;

    /// Partial derivatives at `x` with respect to every parameter.
    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]);
}

/// Run L-M optimization of `model` against the samples `(x, y)` with per-sample
/// standard deviations `sigma`. Parameters whose `active` flag is false are held
/// at their initial value.
pub fn optimize<M: LmModel + ?Sized>(
    model: &M,
    x: &[f64],
    y: &[f64],
    sigma: &[f64],
    initial_params: &[f64],
    active: &[bool],
    config: &LmConfig,
) -> Result<LmResult, LmError> {
    assert_eq!(x.len(), y.len(), "x and y must have the same length");
    assert_eq!(x.len(), sigma.len(), "sigma must have one entry per sample");
    assert_eq!(
        initial_params.len(),
        model.param_count(),
        "initial parameter count must match the model"
    );
    assert_eq!(
        active.len(),
        initial_params.len(),
        "active mask must have one flag per parameter"
    );

    let mut params = initial_params.to_vec();
    let active: Vec<usize> = active
        .iter()
        .enumerate()
        .filter(|(_, &on)| on)
        .map(|(i, _)| i)
        .collect();
    let mfit = active.len();

    let mut scratch = NormalEquations::new(model.param_count(), mfit);
    let mut chi2 = scratch.build(model, x, y, sigma, &params, &active);
    if mfit == 0 {
        return Ok(LmResult {
            params,
            chi2,
            converged: true,
            iterations: 0,
        });
    }

    let mut trial_eq = NormalEquations::new(model.param_count(), mfit);
    let mut damped = SquareMatrix::zeros(mfit);
    let mut diagonal = vec![0.0; mfit];
    let mut delta = vec![0.0; mfit];
    let mut trial = params.clone();

    let mut lambda = config.initial_lambda;
    let mut settled = 0;
    let mut iterations = 0;

    while iterations < config.max_iterations && settled < config.settle_iterations {
        damped.clone_from(&scratch.alpha);
        for j in 0..mfit {
            damped[(j, j)] *= 1.0 + lambda;
        }
        if !decompose(&mut damped, &mut diagonal) {
            return Err(LmError::NotPositiveDefinite {
                iteration: iterations,
            });
        }
        solve_decomposed(&damped, &diagonal, &scratch.beta, &mut delta);

        trial.copy_from_slice(&params);
        for (j, &p) in active.iter().enumerate() {
            trial[p] += delta[j];
        }

        let trial_chi2 = trial_eq.build(model, x, y, sigma, &trial, &active);
        let change = (trial_chi2 - chi2).abs();

        if trial_chi2 < chi2 {
            lambda *= config.lambda_down;
            params.copy_from_slice(&trial);
            chi2 = trial_chi2;
            std::mem::swap(&mut scratch, &mut trial_eq);
        } else {
            lambda *= config.lambda_up;
        }

        iterations += 1;
        trace!(iterations, chi2, lambda, "L-M step");
        if change <= config.chi2_tolerance {
            settled += 1;
        } else {
            settled = 0;
        }
    }

    let converged = iterations < config.max_iterations;
    if !converged {
        warn!(iterations, chi2, "L-M hit the iteration cap, keeping the best parameters");
    }

    Ok(LmResult {
        params,
        chi2,
        converged,
        iterations,
    })
}

/// Weighted normal matrix `alpha = J^T W J` and gradient `beta = J^T W r`,
/// restricted to the active parameters.
struct NormalEquations {
    alpha: SquareMatrix,
    beta: Vec<f64>,
    dyda: Vec<f64>,
}

impl NormalEquations {
    fn new(param_count: usize, mfit: usize) -> Self {
        Self {
            alpha: SquareMatrix::zeros(mfit),
            beta: vec![0.0; mfit],
            dyda: vec![0.0; param_count],
        }
    }

    /// Rebuilds the system at `params` and returns chi-square.
    fn build<M: LmModel + ?Sized>(
        &mut self,
        model: &M,
        x: &[f64],
        y: &[f64],
        sigma: &[f64],
        params: &[f64],
        active: &[usize],
    ) -> f64 {
        let mfit = active.len();
        for j in 0..mfit {
            self.beta[j] = 0.0;
            for k in 0..mfit {
                self.alpha[(j, k)] = 0.0;
            }
        }

        let mut chi2 = 0.0;
        for i in 0..x.len() {
            let residual = y[i] - model.evaluate(x[i], params);
            model.gradient(x[i], params, &mut self.dyda);
            let weight = 1.0 / (sigma[i] * sigma[i]);

            for (l, &pl) in active.iter().enumerate() {
                let wt = self.dyda[pl] * weight;
                for (m, &pm) in active[..=l].iter().enumerate() {
                    self.alpha[(l, m)] += wt * self.dyda[pm];
                }
                self.beta[l] += residual * wt;
            }
            chi2 += residual * residual * weight;
        }

        // Lower triangle was accumulated; mirror it into the upper one.
        for l in 1..mfit {
            for m in 0..l {
                self.alpha[(m, l)] = self.alpha[(l, m)];
            }
        }
        chi2
    }
}
