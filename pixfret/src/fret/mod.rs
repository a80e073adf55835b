//! Per-pixel FRET and normalized-FRET computation.
//!
//! Each pixel is gated on the 3x3 local means of the donor, acceptor and FRET
//! channels against their backgrounds, corrected for donor and acceptor
//! bleed-through, normalized, and written only when the donor/acceptor geometric
//! mean clears the background noise level.

mod pipeline;


use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use tracing::warn;

use crate::background::FretBackgrounds;
use crate::image::PixelBuffer;
use crate::model::FittedModel;
use crate::stack::FretStack;

pub use pipeline::{run_pipeline, spawn_pipeline, PipelineStatus, StatusCallback};

/// Side of the square neighborhood averaged by the intensity gates.
const GATE_WINDOW: usize = 3;

/// Scale applied to normalized FRET.
const NORMALIZED_SCALE: f32 = 100.0;

/// Denominator used for normalized FRET. Labels match the persisted settings.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
pub enum Normalization {
    #[default]
    #[strum(to_string = "FRET/Donor")]
    Donor,
    #[strum(to_string = "FRET/Acceptor")]
    Acceptor,
    #[strum(to_string = "FRET/(Donor*Acceptor)")]
    DonorTimesAcceptor,
    #[strum(to_string = "FRET/sqrt(Donor*Acceptor)")]
    SqrtDonorTimesAcceptor,
    #[strum(to_string = "FRET Efficiency")]
    Efficiency,
}

impl Normalization {
    /// Normalization term for background-corrected donor `d`, acceptor `a` and
    /// bleed-through-corrected FRET `fret`.
    #[inline]
    pub fn term(self, d: f32, a: f32, fret: f32) -> f32 {
        match self {
            Normalization::Donor => d.abs(),
            Normalization::Acceptor => a.abs(),
            Normalization::DonorTimesAcceptor => (d * a).abs(),
            Normalization::SqrtDonorTimesAcceptor => (d * a).abs().sqrt(),
            Normalization::Efficiency => (d + fret).abs(),
        }
    }

    /// Title of the normalized output image.
    pub fn output_title(self) -> &'static str {
        match self {
            Normalization::Efficiency => "FRET Efficiency (%)",
            _ => "NFRET (x100)",
        }
    }
}

/// Parameters of the FRET computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FretConfig {
    /// Gaussian smoothing sigma applied to all channels; the absolute value is used
    /// and 0 disables smoothing.
    pub blur_sigma: f32,
    /// Multiplier on background levels for the intensity gates and the noise gate.
    pub correction_factor: f32,
    pub normalization: Normalization,
    /// Return copies of the smoothed donor and acceptor channels.
    pub keep_smoothed: bool,
}

impl Default for FretConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 3.0,
            correction_factor: 1.0,
            normalization: Normalization::default(),
            keep_smoothed: true,
        }
    }
}

impl FretConfig {
    pub fn validate(&self) {
        assert!(
            self.blur_sigma.is_finite(),
            "blur_sigma must be finite, got {}",
            self.blur_sigma
        );
        assert!(
            self.correction_factor.is_finite() && self.correction_factor >= 0.0,
            "correction_factor must be a non-negative finite value, got {}",
            self.correction_factor
        );
    }
}

/// Everything the pixel loop needs besides the images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FretParameters {
    pub config: FretConfig,
    pub backgrounds: FretBackgrounds,
    pub donor_model: FittedModel,
    pub acceptor_model: FittedModel,
}

/// Result images. Pixels rejected by a gate hold 0.
#[derive(Debug, Clone, PartialEq)]
pub struct FretOutput {
    pub fret: PixelBuffer,
    pub normalized_fret: PixelBuffer,
    pub smoothed_donor: Option<PixelBuffer>,
    pub smoothed_acceptor: Option<PixelBuffer>,
}

/// Runs the pixel loop on an already smoothed stack and returns
/// `(fret, normalized_fret)`.
pub fn compute_fret(stack: &FretStack, params: &FretParameters) -> (PixelBuffer, PixelBuffer) {
    let (width, height) = (stack.width(), stack.height());
    let mut fret_out = PixelBuffer::new(width, height);
    let mut normalized_out = PixelBuffer::new(width, height);

    if !params.donor_model.fitted {
        warn!(kind = %params.donor_model.kind, "Donor bleed-through model not fitted, no donor correction applied");
    }
    if !params.acceptor_model.fitted {
        warn!(kind = %params.acceptor_model.kind, "Acceptor bleed-through model not fitted, no acceptor correction applied");
    }

    let factor = params.config.correction_factor;
    let bg_fret = params.backgrounds.fret.value;
    let bg_donor = params.backgrounds.donor.value;
    let bg_acceptor = params.backgrounds.acceptor.value;
    let noise_threshold = (bg_donor * bg_acceptor).sqrt() * factor;
    let normalization = params.config.normalization;

    let (fret, donor, acceptor) = (stack.fret(), stack.donor(), stack.acceptor());

    for y in 0..height {
        for x in 0..width {
            if !(donor.local_mean::<GATE_WINDOW>(x, y) > bg_donor * factor) {
                continue;
            }
            let d = donor.get(x, y) - bg_donor;

            if !(acceptor.local_mean::<GATE_WINDOW>(x, y) > bg_acceptor * factor) {
                continue;
            }
            let a = acceptor.get(x, y) - bg_acceptor;

            if !(fret.local_mean::<GATE_WINDOW>(x, y) > bg_fret * factor) {
                continue;
            }
            let f = fret.get(x, y) - bg_fret;

            let corrected = f - params.donor_model.correction(d) - params.acceptor_model.correction(a);

            let signal = (d * a).abs().sqrt();
            if signal > noise_threshold {
                let term = normalization.term(d, a, corrected);
                let normalized = if term != 0.0 {
                    corrected * NORMALIZED_SCALE / term
                } else {
                    0.0
                };
                fret_out.put(x as isize, y as isize, corrected);
                normalized_out.put(x as isize, y as isize, normalized);
            }
        }
    }

    (fret_out, normalized_out)
}
