//! Common imports for FRET processing.

pub use crate::background::{BackgroundLevel, CalibrationBackgrounds, FretBackgrounds};
pub use crate::calibration::{BleedThroughFit, CalibrationConfig, CalibrationEngine, CropWindow};
pub use crate::error::{Error, Result};
pub use crate::fret::{run_pipeline, spawn_pipeline, FretConfig, FretOutput, Normalization};
pub use crate::image::{Mask, PixelBuffer, PixelData, Roi, RoiRect, SourceImage};
pub use crate::model::{FittedModel, ModelKind};
pub use crate::settings::Settings;
pub use crate::stack::{CalibrationStack, FretStack};
