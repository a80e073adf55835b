//! Bleed-through models.
//!
//! A model describes the fraction of a channel's intensity that leaks into the FRET
//! channel as a function of that intensity:
//!
//! - Constant: `ratio(x) = a`
//! - Linear: `ratio(x) = a + b * x`
//! - Exponential: `ratio(x) = a + b * exp(e * x)`
//!
//! The correction subtracted from a FRET pixel is `ratio(i) * i`.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

use crate::math::lm_optimizer::LmModel;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumIter, Serialize, Deserialize,
)]
pub enum ModelKind {
    #[default]
    Constant,
    Linear,
    Exponential,
}

impl ModelKind {
    /// Index used by the persisted settings.
    pub fn index(self) -> usize {
        match self {
            ModelKind::Constant => 0,
            ModelKind::Linear => 1,
            ModelKind::Exponential => 2,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ModelKind::Constant),
            1 => Some(ModelKind::Linear),
            2 => Some(ModelKind::Exponential),
            _ => None,
        }
    }

    /// Ratio at intensity `x`; unused parameters are ignored.
    #[inline]
    pub fn ratio(self, x: f64, params: &[f64]) -> f64 {
        match self {
            ModelKind::Constant => params[0],
            ModelKind::Linear => params[0] + params[1] * x,
            ModelKind::Exponential => params[0] + params[1] * (params[2] * x).exp(),
        }
    }
}

impl LmModel for ModelKind {
    fn param_count(&self) -> usize {
        match self {
            ModelKind::Constant => 1,
            ModelKind::Linear => 2,
            ModelKind::Exponential => 3,
        }
    }

    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        self.ratio(x, params)
    }

    fn gradient(&self, x: f64, params: &[f64], out: &mut [f64]) {
        match self {
            ModelKind::Constant => out[0] = 1.0,
            ModelKind::Linear => {
                out[0] = 1.0;
                out[1] = x;
            }
            ModelKind::Exponential => {
                let ex = (params[2] * x).exp();
                out[0] = 1.0;
                out[1] = ex;
                out[2] = params[1] * x * ex;
            }
        }
    }
}

/// A model kind with its `(a, b, e)` parameters. `fitted == false` means the
/// calibration could not determine the model; such a model corrects nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub kind: ModelKind,
    pub params: [f32; 3],
    pub fitted: bool,
}

impl FittedModel {
    pub fn no_fit(kind: ModelKind) -> Self {
        Self {
            kind,
            params: [0.0; 3],
            fitted: false,
        }
    }

    pub fn constant(a: f32) -> Self {
        Self {
            kind: ModelKind::Constant,
            params: [a, 0.0, 0.0],
            fitted: true,
        }
    }

    pub fn linear(a: f32, b: f32) -> Self {
        Self {
            kind: ModelKind::Linear,
            params: [a, b, 0.0],
            fitted: true,
        }
    }

    pub fn exponential(a: f32, b: f32, e: f32) -> Self {
        Self {
            kind: ModelKind::Exponential,
            params: [a, b, e],
            fitted: true,
        }
    }

    /// Bleed-through ratio at `intensity`; 0 for an unfitted model.
    pub fn ratio(&self, intensity: f32) -> f32 {
        if !self.fitted {
            return 0.0;
        }
        let [a, b, e] = self.params;
        match self.kind {
            ModelKind::Constant => a,
            ModelKind::Linear => a + b * intensity,
            ModelKind::Exponential => a + b * (e * intensity).exp(),
        }
    }

    /// Intensity leaking into the FRET channel from a channel at `intensity`.
    #[inline]
    pub fn correction(&self, intensity: f32) -> f32 {
        self.ratio(intensity) * intensity
    }
}

impl fmt::Display for FittedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.fitted {
            return write!(f, "No fit");
        }
        let [a, b, e] = self.params;
        match self.kind {
            ModelKind::Constant => write!(f, "y = {a:.5}"),
            ModelKind::Linear => write!(f, "y = {a:.5} + {b:.5} * x"),
            ModelKind::Exponential => write!(f, "y = {a:.5} + {b:.5} * exp({e:.5} * x)"),
        }
    }
}
