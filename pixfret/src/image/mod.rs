//! Floating-point image buffers and their sources.

mod roi;
mod smoothing;


use common::Buffer2;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::error::{Error, Result};

pub use roi::{Mask, Roi, RoiRect};
pub use smoothing::{gaussian_poles, smooth_line, GaussianPoles};

/// Bit depth of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum PixelDepth {
    #[strum(to_string = "8-bit grayscale")]
    Gray8,
    #[strum(to_string = "16-bit grayscale")]
    Gray16,
    #[strum(to_string = "32-bit float grayscale")]
    Gray32,
    #[strum(to_string = "RGB")]
    Rgb,
}

/// Raw pixel storage as delivered by the acquisition side.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Gray8(Vec<u8>),
    Gray16(Vec<u16>),
    Gray32(Vec<f32>),
    /// Packed 0xRRGGBB samples. Never accepted for computation.
    Rgb(Vec<u32>),
}

impl PixelData {
    pub fn depth(&self) -> PixelDepth {
        match self {
            PixelData::Gray8(_) => PixelDepth::Gray8,
            PixelData::Gray16(_) => PixelDepth::Gray16,
            PixelData::Gray32(_) => PixelDepth::Gray32,
            PixelData::Rgb(_) => PixelDepth::Rgb,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PixelData::Gray8(v) => v.len(),
            PixelData::Gray16(v) => v.len(),
            PixelData::Gray32(v) => v.len(),
            PixelData::Rgb(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One slice of an input stack before conversion to floating point.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pub width: usize,
    pub height: usize,
    pub data: PixelData,
}

impl SourceImage {
    pub fn new(width: usize, height: usize, data: PixelData) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    pub fn depth(&self) -> PixelDepth {
        self.data.depth()
    }
}

/// Single-channel `f32` image.
///
/// Neighborhood reads reflect about the borders; `put` ignores coordinates outside
/// the image. `Clone` produces the independent duplicate used before smoothing.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    grid: Buffer2<f32>,
}

impl PixelBuffer {
    /// Zero-filled buffer. Panics when either dimension is 0.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            grid: Buffer2::new_filled(width, height, 0.0),
        }
    }

    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            grid: Buffer2::new_filled(width, height, value),
        }
    }

    /// Wraps row-major pixels. Panics when the length is not `width * height`.
    pub fn from_vec(width: usize, height: usize, pixels: Vec<f32>) -> Self {
        Self {
            grid: Buffer2::new(width, height, pixels),
        }
    }

    /// Widens 8-bit and 16-bit samples by value; 32-bit samples are copied.
    pub fn from_source(source: &SourceImage) -> Result<Self> {
        let (width, height) = (source.width, source.height);
        let expected = width * height;
        if expected == 0 || source.data.len() != expected {
            return Err(Error::PixelCount {
                width,
                height,
                expected,
                actual: source.data.len(),
            });
        }

        let pixels: Vec<f32> = match &source.data {
            PixelData::Gray8(v) => v.iter().map(|&p| p as f32).collect(),
            PixelData::Gray16(v) => v.iter().map(|&p| p as f32).collect(),
            PixelData::Gray32(v) => v.clone(),
            PixelData::Rgb(_) => {
                return Err(Error::UnsupportedPixelDepth {
                    depth: PixelDepth::Rgb,
                })
            }
        };

        Ok(Self::from_vec(width, height, pixels))
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.grid.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.grid.height()
    }

    #[inline]
    pub fn pixels(&self) -> &[f32] {
        self.grid.pixels()
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [f32] {
        self.grid.pixels_mut()
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.grid[(x, y)]
    }

    /// Writes `value` at `(x, y)`; out-of-bounds writes are silently dropped.
    #[inline]
    pub fn put(&mut self, x: isize, y: isize, value: f32) {
        if self.grid.contains(x, y) {
            self.grid[(x as usize, y as usize)] = value;
        }
    }

    pub fn row(&self, y: usize) -> &[f32] {
        self.grid.row(y)
    }

    pub fn put_row(&mut self, y: usize, row: &[f32]) {
        self.grid.set_row(y, row);
    }

    pub fn copy_column(&self, x: usize, out: &mut [f32]) {
        self.grid.copy_column(x, out);
    }

    pub fn put_column(&mut self, x: usize, column: &[f32]) {
        self.grid.set_column(x, column);
    }

    /// `K x K` block centered on `(x, y)`, indexed `[row][column]`: entry `[j][i]` is
    /// the pixel at `(x + i - K/2, y + j - K/2)` with mirror extension at the borders.
    pub fn neighborhood<const K: usize>(&self, x: usize, y: usize) -> [[f32; K]; K] {
        let half = (K / 2) as isize;
        let mut block = [[0.0f32; K]; K];
        for (j, block_row) in block.iter_mut().enumerate() {
            let sy = y as isize + j as isize - half;
            for (i, v) in block_row.iter_mut().enumerate() {
                let sx = x as isize + i as isize - half;
                *v = *self.grid.get_mirrored(sx, sy);
            }
        }
        block
    }

    /// Mean of the mirror-extended `K x K` neighborhood of `(x, y)`.
    pub fn local_mean<const K: usize>(&self, x: usize, y: usize) -> f32 {
        let block = self.neighborhood::<K>(x, y);
        let sum: f32 = block.iter().flatten().sum();
        sum / (K * K) as f32
    }

    /// Smallest and largest pixel value.
    pub fn min_max(&self) -> (f32, f32) {
        self.pixels()
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }

    /// In-place recursive Gaussian smoothing: every row from an untouched copy of the
    /// source, then every column of the result. Non-positive or non-finite `sigma`
    /// leaves the buffer unchanged.
    pub fn smooth_gaussian(&mut self, sigma: f32) {
        let Some(poles) = gaussian_poles(sigma as f64) else {
            return;
        };

        let source = self.clone();
        let (width, height) = (self.width(), self.height());

        let mut line = vec![0.0f32; width];
        for y in 0..height {
            line.copy_from_slice(source.row(y));
            smooth_line(&mut line, &poles);
            self.put_row(y, &line);
        }

        let mut column = vec![0.0f32; height];
        for x in 0..width {
            self.copy_column(x, &mut column);
            smooth_line(&mut column, &poles);
            self.put_column(x, &column);
        }
    }
}
