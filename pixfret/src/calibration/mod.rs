//! Spectral bleed-through calibration.
//!
//! A calibration stack images a single fluorophore: the FRET channel then only holds
//! bleed-through, so `signal / channel` per pixel samples the bleed-through ratio as
//! a function of channel intensity. The ratios are binned, deduplicated, and fitted
//! with constant, linear and exponential models.

mod fit;
mod scatter;

#[cfg(test)]
mod tests;

use tracing::info;

use crate::background::CalibrationBackgrounds;
use crate::error::{Error, Result};
use crate::image::Roi;
use crate::math::lm_optimizer::LmConfig;
use crate::stack::CalibrationStack;

pub use fit::{
    fit_constant, fit_exponential, fit_linear, BleedThroughFit, OptimizerReport, MIN_LINEAR_SLOPE,
};
pub use scatter::{CropWindow, ScatterBinning, ScatterHistogram, ScatterSamples};

/// Calibration parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    /// Gaussian sigma applied to copies of both channels before sampling. 0 disables.
    pub smoothing_sigma: f32,
    pub binning: ScatterBinning,
    /// Optimizer settings for the exponential fit.
    pub lm: LmConfig,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            smoothing_sigma: 2.0,
            binning: ScatterBinning::default(),
            lm: LmConfig::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) {
        assert!(
            self.smoothing_sigma.is_finite() && self.smoothing_sigma >= 0.0,
            "smoothing_sigma must be a non-negative finite value, got {}",
            self.smoothing_sigma
        );
        assert!(
            self.binning.ratio_max > 0.0,
            "ratio_max must be positive, got {}",
            self.binning.ratio_max
        );
        assert!(
            self.binning.ratio_bins_per_unit > 0.0,
            "ratio_bins_per_unit must be positive, got {}",
            self.binning.ratio_bins_per_unit
        );
        assert!(
            self.binning.channel_step > 0.0,
            "channel_step must be positive, got {}",
            self.binning.channel_step
        );
        self.lm.validate();
    }
}

/// Derives bleed-through models from calibration stacks.
#[derive(Debug, Clone, Default)]
pub struct CalibrationEngine {
    config: CalibrationConfig,
    backgrounds: CalibrationBackgrounds,
}

impl CalibrationEngine {
    pub fn new(config: CalibrationConfig) -> Self {
        config.validate();
        Self {
            config,
            backgrounds: CalibrationBackgrounds::default(),
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn backgrounds(&self) -> &CalibrationBackgrounds {
        &self.backgrounds
    }

    pub fn set_backgrounds(&mut self, backgrounds: CalibrationBackgrounds) {
        self.backgrounds = backgrounds;
    }

    /// Merges the mean of `roi` into the stored background levels.
    pub fn accumulate_background(&mut self, stack: &CalibrationStack, roi: Option<&Roi>) -> Result<()> {
        self.backgrounds.accumulate(stack, roi)
    }

    pub fn reset_background(&mut self) {
        self.backgrounds.reset();
    }

    /// Bins the `(channel, ratio)` scatter of `roi`. The stack is left untouched;
    /// smoothing, if configured, runs on copies.
    pub fn extract_scatter(&self, stack: &CalibrationStack, roi: Option<&Roi>) -> Result<ScatterHistogram> {
        let roi = roi.ok_or(Error::MissingRoi {
            operation: "extract calibration samples",
        })?;
        roi.validate(stack.width(), stack.height())?;

        let histogram = if self.config.smoothing_sigma > 0.0 {
            let mut signal = stack.signal().clone();
            let mut channel = stack.channel().clone();
            signal.smooth_gaussian(self.config.smoothing_sigma);
            channel.smooth_gaussian(self.config.smoothing_sigma);
            ScatterHistogram::build(&signal, &channel, roi, &self.backgrounds, self.config.binning)
        } else {
            ScatterHistogram::build(
                stack.signal(),
                stack.channel(),
                roi,
                &self.backgrounds,
                self.config.binning,
            )
        };

        info!(
            pixels = histogram.total_count(),
            samples = histogram.occupied_cells(),
            "Extracted calibration scatter"
        );
        Ok(histogram)
    }

    /// Fits all three models to `samples`, restricted to `window` when given.
    pub fn fit(&self, samples: &ScatterSamples, window: Option<&CropWindow>) -> BleedThroughFit {
        let cropped;
        let samples = match window {
            Some(window) => {
                cropped = samples.crop(window);
                &cropped
            }
            None => samples,
        };

        let channel_mid = match (window, samples.channel_range()) {
            (Some(window), _) => window.channel_midpoint(),
            (None, Some((lo, hi))) => 0.5 * (lo + hi),
            (None, None) => 0.0,
        };

        let constant = fit_constant(samples);
        let linear = fit_linear(samples, &constant);
        let (exponential, optimizer) =
            fit_exponential(samples, &constant, &linear, channel_mid, &self.config.lm);

        info!(
            samples = samples.len(),
            constant = %constant,
            linear = %linear,
            exponential = %exponential,
            "Bleed-through fits"
        );

        BleedThroughFit {
            constant,
            linear,
            exponential,
            optimizer,
        }
    }

    /// Scatter extraction followed by the fits.
    pub fn calibrate(
        &self,
        stack: &CalibrationStack,
        roi: Option<&Roi>,
        window: Option<&CropWindow>,
    ) -> Result<BleedThroughFit> {
        let histogram = self.extract_scatter(stack, roi)?;
        Ok(self.fit(&histogram.samples(), window))
    }
}
