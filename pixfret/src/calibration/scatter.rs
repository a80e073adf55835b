//! Channel-intensity vs bleed-through-ratio scatter data.

use std::collections::BTreeMap;

use crate::background::CalibrationBackgrounds;
use crate::image::{PixelBuffer, Roi};

/// Parallel arrays of `(channel intensity, ratio)` samples.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScatterSamples {
    pub channel: Vec<f32>,
    pub ratio: Vec<f32>,
}

impl ScatterSamples {
    pub fn new(channel: Vec<f32>, ratio: Vec<f32>) -> Self {
        assert_eq!(
            channel.len(),
            ratio.len(),
            "channel and ratio must have the same length"
        );
        Self { channel, ratio }
    }

    pub fn len(&self) -> usize {
        self.channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f32, f32)> + '_ {
        self.channel.iter().copied().zip(self.ratio.iter().copied())
    }

    /// Smallest and largest channel intensity.
    pub fn channel_range(&self) -> Option<(f32, f32)> {
        if self.is_empty() {
            return None;
        }
        Some(self.channel.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY),
            |(lo, hi), &c| (lo.min(c), hi.max(c)),
        ))
    }

    /// Samples inside `window`.
    pub fn crop(&self, window: &CropWindow) -> Self {
        let (channel, ratio) = self.iter().filter(|&(c, r)| window.contains(c, r)).unzip();
        Self { channel, ratio }
    }
}

/// Half-open selection `[channel_min, channel_max) x [ratio_min, ratio_max)` of the
/// scatter plane used to restrict the fits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropWindow {
    pub channel_min: f32,
    pub channel_max: f32,
    pub ratio_min: f32,
    pub ratio_max: f32,
}

impl CropWindow {
    pub fn new(channel_min: f32, channel_max: f32, ratio_min: f32, ratio_max: f32) -> Self {
        Self {
            channel_min,
            channel_max,
            ratio_min,
            ratio_max,
        }
    }

    #[inline]
    pub fn contains(&self, channel: f32, ratio: f32) -> bool {
        channel >= self.channel_min
            && channel < self.channel_max
            && ratio >= self.ratio_min
            && ratio < self.ratio_max
    }

    pub fn channel_midpoint(&self) -> f32 {
        0.5 * (self.channel_min + self.channel_max)
    }
}

/// Binning of the scatter plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScatterBinning {
    /// Exclusive upper bound on accepted ratios.
    pub ratio_max: f32,
    /// Ratio bins per unit ratio.
    pub ratio_bins_per_unit: f32,
    /// Channel intensity covered by one bin.
    pub channel_step: f32,
}

impl Default for ScatterBinning {
    fn default() -> Self {
        Self {
            ratio_max: 2.0,
            ratio_bins_per_unit: 512.0,
            channel_step: 1.0,
        }
    }
}

/// Sparse 2-D histogram of the scatter plane, keyed by `(channel bin, ratio bin)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterHistogram {
    binning: ScatterBinning,
    channel_origin: f32,
    cells: BTreeMap<(u32, u32), u32>,
}

impl ScatterHistogram {
    /// Bins every ROI pixel whose background-corrected channel intensity is positive
    /// and whose ratio lies in `(0, ratio_max)`. The channel axis starts at the
    /// smallest positive corrected intensity inside the ROI.
    pub(crate) fn build(
        signal: &PixelBuffer,
        channel: &PixelBuffer,
        roi: &Roi,
        backgrounds: &CalibrationBackgrounds,
        binning: ScatterBinning,
    ) -> Self {
        let width = signal.width();
        let signal = signal.pixels();
        let channel = channel.pixels();
        let bg_signal = backgrounds.signal.value;
        let bg_channel = backgrounds.channel.value;

        let channel_origin = roi
            .indices(width)
            .map(|i| channel[i] - bg_channel)
            .filter(|&c| c > 0.0)
            .fold(f32::INFINITY, f32::min);

        let mut cells = BTreeMap::new();
        if channel_origin.is_finite() {
            for i in roi.indices(width) {
                let chan = channel[i] - bg_channel;
                if chan <= 0.0 {
                    continue;
                }
                let ratio = (signal[i] - bg_signal) / chan;
                if !(ratio > 0.0 && ratio < binning.ratio_max) {
                    continue;
                }
                let c = ((chan - channel_origin) / binning.channel_step).round() as u32;
                let r = (ratio * binning.ratio_bins_per_unit).round() as u32;
                *cells.entry((c, r)).or_insert(0) += 1;
            }
        }

        Self {
            binning,
            channel_origin: if channel_origin.is_finite() {
                channel_origin
            } else {
                0.0
            },
            cells,
        }
    }

    pub fn binning(&self) -> ScatterBinning {
        self.binning
    }

    /// Number of occupied cells.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of pixels binned.
    pub fn total_count(&self) -> u64 {
        self.cells.values().map(|&n| n as u64).sum()
    }

    /// Occupied cells as `(channel, ratio, pixel count)`, ordered by channel then ratio.
    pub fn weighted_samples(&self) -> impl Iterator<Item = (f32, f32, u32)> + '_ {
        self.cells.iter().map(|(&(c, r), &n)| {
            (
                self.channel_origin + c as f32 * self.binning.channel_step,
                r as f32 / self.binning.ratio_bins_per_unit,
                n,
            )
        })
    }

    /// One sample per occupied cell.
    pub fn samples(&self) -> ScatterSamples {
        let (channel, ratio) = self.weighted_samples().map(|(c, r, _)| (c, r)).unzip();
        ScatterSamples { channel, ratio }
    }
}
