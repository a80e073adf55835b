//! PixFRET - pixel-by-pixel FRET computation.
//!
//! Computes sensitized-emission FRET from a three-channel stack (FRET, donor,
//! acceptor) and corrects it for spectral bleed-through of the donor and acceptor
//! into the FRET channel:
//! - Background estimation over regions of interest
//! - Bleed-through calibration with constant, linear and exponential models
//! - Recursive Gaussian smoothing with mirror boundaries
//! - FRET and normalized FRET images with five normalization modes
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pixfret::prelude::*;
//!
//! let stack = FretStack::from_images(&images)?;
//! let settings = Settings::from_properties(&std::fs::read_to_string("PixFRET.properties")?)?;
//!
//! let mut backgrounds = FretBackgrounds::default();
//! backgrounds.accumulate(&stack, Some(&background_roi))?;
//!
//! let output = run_pipeline(stack, &settings.fret_parameters(backgrounds), None);
//! println!("{}", settings.normalization.output_title());
//! ```

pub mod background;
pub mod calibration;
mod error;
pub mod fret;
pub mod image;
pub mod math;
pub mod model;
pub mod prelude;
pub mod settings;
pub mod stack;

// ============================================================================
// Errors
// ============================================================================

pub use error::{Error, Result};

// ============================================================================
// Images and stacks
// ============================================================================

pub use image::{Mask, PixelBuffer, PixelData, PixelDepth, Roi, RoiRect, SourceImage};
pub use stack::{CalibrationStack, FretStack};

// ============================================================================
// Background and calibration
// ============================================================================

pub use background::{BackgroundLevel, CalibrationBackgrounds, FretBackgrounds};
pub use calibration::{
    BleedThroughFit, CalibrationConfig, CalibrationEngine, CropWindow, ScatterHistogram,
    ScatterSamples,
};
pub use model::{FittedModel, ModelKind};

// ============================================================================
// FRET computation
// ============================================================================

pub use fret::{
    compute_fret, run_pipeline, spawn_pipeline, FretConfig, FretOutput, FretParameters,
    Normalization, PipelineStatus, StatusCallback,
};
pub use settings::Settings;

#[cfg(test)]
pub(crate) mod testing;
