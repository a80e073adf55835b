//! Background level estimation over a region of interest.
//!
//! Levels are accumulated across measurements: each new ROI mean is merged into the
//! stored level weighted by pixel count, so several small background regions can be
//! combined into one estimate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::image::{PixelBuffer, Roi};
use crate::stack::{CalibrationStack, FretStack};

/// Mean background intensity and the number of pixels it was averaged over.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BackgroundLevel {
    pub value: f32,
    pub sample_count: u64,
}

impl BackgroundLevel {
    pub fn new(value: f32, sample_count: u64) -> Self {
        Self {
            value,
            sample_count,
        }
    }

    /// Mean of `buffer` over `roi`. An ROI selecting no pixel yields the empty level.
    pub fn measure(buffer: &PixelBuffer, roi: &Roi) -> Result<Self> {
        roi.validate(buffer.width(), buffer.height())?;

        let pixels = buffer.pixels();
        let (sum, count) = roi
            .indices(buffer.width())
            .fold((0.0f64, 0u64), |(sum, count), i| (sum + pixels[i] as f64, count + 1));

        if count == 0 {
            return Ok(Self::default());
        }
        Ok(Self::new((sum / count as f64) as f32, count))
    }

    /// Pixel-count weighted average of two levels.
    pub fn merge(self, other: Self) -> Self {
        let total = self.sample_count + other.sample_count;
        if total == 0 {
            return Self::default();
        }
        let weighted = self.value as f64 * self.sample_count as f64
            + other.value as f64 * other.sample_count as f64;
        Self::new((weighted / total as f64) as f32, total)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }
}

fn require_roi<'a>(roi: Option<&'a Roi>, operation: &'static str) -> Result<&'a Roi> {
    roi.ok_or(Error::MissingRoi { operation })
}

/// Accumulated background of the three FRET channels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FretBackgrounds {
    pub fret: BackgroundLevel,
    pub donor: BackgroundLevel,
    pub acceptor: BackgroundLevel,
}

impl FretBackgrounds {
    /// Background with fixed per-channel values, as typed in by a user.
    pub fn from_values(fret: f32, donor: f32, acceptor: f32) -> Self {
        Self {
            fret: BackgroundLevel::new(fret, 1),
            donor: BackgroundLevel::new(donor, 1),
            acceptor: BackgroundLevel::new(acceptor, 1),
        }
    }

    /// Measures all channels over `roi` and merges the result into the stored levels.
    pub fn accumulate(&mut self, stack: &FretStack, roi: Option<&Roi>) -> Result<()> {
        let roi = require_roi(roi, "measure the background")?;
        let fret = BackgroundLevel::measure(stack.fret(), roi)?;
        let donor = BackgroundLevel::measure(stack.donor(), roi)?;
        let acceptor = BackgroundLevel::measure(stack.acceptor(), roi)?;

        self.fret = self.fret.merge(fret);
        self.donor = self.donor.merge(donor);
        self.acceptor = self.acceptor.merge(acceptor);

        debug!(
            fret = self.fret.value,
            donor = self.donor.value,
            acceptor = self.acceptor.value,
            samples = self.fret.sample_count,
            "Accumulated FRET background"
        );
        Ok(())
    }

    pub fn reset(&mut self) {
        self.fret.reset();
        self.donor.reset();
        self.acceptor.reset();
    }
}

/// Accumulated background of a calibration stack.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CalibrationBackgrounds {
    pub signal: BackgroundLevel,
    pub channel: BackgroundLevel,
}

impl CalibrationBackgrounds {
    pub fn from_values(signal: f32, channel: f32) -> Self {
        Self {
            signal: BackgroundLevel::new(signal, 1),
            channel: BackgroundLevel::new(channel, 1),
        }
    }

    pub fn accumulate(&mut self, stack: &CalibrationStack, roi: Option<&Roi>) -> Result<()> {
        let roi = require_roi(roi, "measure the background")?;
        let signal = BackgroundLevel::measure(stack.signal(), roi)?;
        let channel = BackgroundLevel::measure(stack.channel(), roi)?;

        self.signal = self.signal.merge(signal);
        self.channel = self.channel.merge(channel);

        debug!(
            signal = self.signal.value,
            channel = self.channel.value,
            samples = self.signal.sample_count,
            "Accumulated calibration background"
        );
        Ok(())
    }

    pub fn reset(&mut self) {
        self.signal.reset();
        self.channel.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{Mask, RoiRect};

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_measure_full_roi() {
        let buf = PixelBuffer::from_vec(2, 2, vec![1.0, 2.0, 3.0, 6.0]);
        let level = BackgroundLevel::measure(&buf, &Roi::full(2, 2)).unwrap();
        assert!(approx(level.value, 3.0));
        assert_eq!(level.sample_count, 4);
    }

    #[test]
    fn test_measure_masked_roi() {
        let buf = PixelBuffer::from_vec(2, 2, vec![1.0, 2.0, 3.0, 6.0]);
        let roi = Roi::Mask(Mask::new(2, 2, vec![false, true, false, true]));
        let level = BackgroundLevel::measure(&buf, &roi).unwrap();
        assert!(approx(level.value, 4.0));
        assert_eq!(level.sample_count, 2);
    }

    #[test]
    fn test_measure_empty_mask_is_empty_level() {
        let buf = PixelBuffer::filled(2, 2, 5.0);
        let roi = Roi::Mask(Mask::new(2, 2, vec![false; 4]));
        let level = BackgroundLevel::measure(&buf, &roi).unwrap();
        assert!(level.is_empty());
        assert_eq!(level.value, 0.0);
    }

    #[test]
    fn test_measure_rejects_roi_outside_image() {
        let buf = PixelBuffer::filled(2, 2, 5.0);
        let roi = Roi::Rect(RoiRect::new(1, 1, 2, 2));
        assert!(BackgroundLevel::measure(&buf, &roi).is_err());
    }

    #[test]
    fn test_merge_weights_by_count() {
        let a = BackgroundLevel::new(10.0, 3);
        let b = BackgroundLevel::new(20.0, 1);
        let merged = a.merge(b);
        assert!(approx(merged.value, 12.5));
        assert_eq!(merged.sample_count, 4);
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let a = BackgroundLevel::new(7.0, 5);
        assert_eq!(a.merge(BackgroundLevel::default()), a);
        assert_eq!(BackgroundLevel::default().merge(a), a);
        assert!(BackgroundLevel::default()
            .merge(BackgroundLevel::default())
            .is_empty());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = BackgroundLevel::new(3.5, 12);
        let b = BackgroundLevel::new(100.25, 4);
        let c = BackgroundLevel::new(-2.0, 9);

        let left = a.merge(b).merge(c);
        let right = a.merge(c.merge(b));
        let swapped = c.merge(a).merge(b);
        assert!(approx(left.value, right.value));
        assert!(approx(left.value, swapped.value));
        assert_eq!(left.sample_count, 25);
        assert_eq!(right.sample_count, 25);
    }

    #[test]
    fn test_reset_clears_level() {
        let mut level = BackgroundLevel::new(7.0, 5);
        level.reset();
        assert_eq!(level, BackgroundLevel::default());
    }

    #[test]
    fn test_fret_backgrounds_accumulate_two_regions() {
        let fret = PixelBuffer::from_vec(2, 1, vec![10.0, 30.0]);
        let donor = PixelBuffer::from_vec(2, 1, vec![1.0, 3.0]);
        let acceptor = PixelBuffer::from_vec(2, 1, vec![5.0, 5.0]);
        let stack = FretStack::new(fret, donor, acceptor).unwrap();

        let mut bg = FretBackgrounds::default();
        bg.accumulate(&stack, Some(&Roi::Rect(RoiRect::new(0, 0, 1, 1))))
            .unwrap();
        assert!(approx(bg.fret.value, 10.0));

        bg.accumulate(&stack, Some(&Roi::Rect(RoiRect::new(1, 0, 1, 1))))
            .unwrap();
        assert!(approx(bg.fret.value, 20.0));
        assert!(approx(bg.donor.value, 2.0));
        assert!(approx(bg.acceptor.value, 5.0));
        assert_eq!(bg.donor.sample_count, 2);

        bg.reset();
        assert_eq!(bg, FretBackgrounds::default());
    }

    #[test]
    fn test_accumulate_requires_roi() {
        let stack = CalibrationStack::new(PixelBuffer::new(2, 2), PixelBuffer::new(2, 2)).unwrap();
        let mut bg = CalibrationBackgrounds::default();
        let err = bg.accumulate(&stack, None).unwrap_err();
        assert!(matches!(err, Error::MissingRoi { .. }));
        assert_eq!(bg, CalibrationBackgrounds::default());
    }
}
