//! Error types for FRET computation and calibration.

use thiserror::Error;

use crate::image::PixelDepth;

/// Errors raised while validating inputs or running the FRET pipeline.
///
/// Numeric degeneracy (an empty background, a fit that cannot be computed) is not an
/// error: it surfaces as an empty `BackgroundLevel` or an unfitted `FittedModel`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Expected a stack of {expected} images, got {actual}")]
    ChannelCount { expected: usize, actual: usize },

    #[error("Unsupported pixel depth {depth}: 8-bit, 16-bit or 32-bit grayscale is required")]
    UnsupportedPixelDepth { depth: PixelDepth },

    #[error("A region of interest is required to {operation}")]
    MissingRoi { operation: &'static str },

    #[error("Pixel data holds {actual} values, {width}x{height} image needs {expected}")]
    PixelCount {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Mask is {mask_width}x{mask_height} but the image is {image_width}x{image_height}"
    )]
    MaskDimensionMismatch {
        mask_width: usize,
        mask_height: usize,
        image_width: usize,
        image_height: usize,
    },

    #[error("ROI ({x}, {y}, {width}x{height}) does not fit inside the {image_width}x{image_height} image")]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        image_width: usize,
        image_height: usize,
    },

    #[error(
        "Dimension mismatch for {channel} channel: expected {expected_width}x{expected_height}, got {actual_width}x{actual_height}"
    )]
    DimensionMismatch {
        channel: &'static str,
        expected_width: usize,
        expected_height: usize,
        actual_width: usize,
        actual_height: usize,
    },

    #[error("Invalid value for setting '{key}': '{value}'")]
    InvalidSetting { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, Error>;
