use common::Buffer2;

use crate::error::{Error, Result};

/// Per-pixel selection with the same dimensions as the image it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    bits: Buffer2<bool>,
}

impl Mask {
    pub fn new(width: usize, height: usize, bits: Vec<bool>) -> Self {
        Self {
            bits: Buffer2::new(width, height, bits),
        }
    }

    /// Mask with only the pixels inside `rect` set.
    pub fn from_rect(width: usize, height: usize, rect: RoiRect) -> Self {
        let mut bits = Buffer2::new_filled(width, height, false);
        for y in rect.y..(rect.y + rect.height).min(height) {
            for x in rect.x..(rect.x + rect.width).min(width) {
                bits[(x, y)] = true;
            }
        }
        Self { bits }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.bits.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.bits.height()
    }

    #[inline]
    pub fn is_set(&self, x: usize, y: usize) -> bool {
        self.bits[(x, y)]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }
}

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoiRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl RoiRect {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// Region of interest used for background measurement and calibration sampling.
#[derive(Debug, Clone, PartialEq)]
pub enum Roi {
    Rect(RoiRect),
    Mask(Mask),
}

impl Roi {
    /// The whole `width x height` image.
    pub fn full(width: usize, height: usize) -> Self {
        Roi::Rect(RoiRect::new(0, 0, width, height))
    }

    /// Checks that the region lies inside a `width x height` image.
    pub fn validate(&self, width: usize, height: usize) -> Result<()> {
        match self {
            Roi::Rect(r) => {
                if r.x + r.width > width || r.y + r.height > height {
                    return Err(Error::RoiOutOfBounds {
                        x: r.x,
                        y: r.y,
                        width: r.width,
                        height: r.height,
                        image_width: width,
                        image_height: height,
                    });
                }
            }
            Roi::Mask(m) => {
                if m.width() != width || m.height() != height {
                    return Err(Error::MaskDimensionMismatch {
                        mask_width: m.width(),
                        mask_height: m.height(),
                        image_width: width,
                        image_height: height,
                    });
                }
            }
        }
        Ok(())
    }

    /// Row-major indices of the selected pixels in an image of the given width.
    /// The region must have been validated against that image.
    pub fn indices(&self, image_width: usize) -> Box<dyn Iterator<Item = usize> + '_> {
        match self {
            Roi::Rect(r) => {
                let r = *r;
                Box::new(
                    (r.y..r.y + r.height)
                        .flat_map(move |y| (r.x..r.x + r.width).map(move |x| y * image_width + x)),
                )
            }
            Roi::Mask(m) => Box::new(
                m.bits
                    .iter()
                    .enumerate()
                    .filter(|(_, &set)| set)
                    .map(|(i, _)| i),
            ),
        }
    }

    /// Number of selected pixels.
    pub fn pixel_count(&self) -> usize {
        match self {
            Roi::Rect(r) => r.width * r.height,
            Roi::Mask(m) => m.count(),
        }
    }
}
