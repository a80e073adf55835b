//! Validated multi-channel inputs.
//!
//! Stack order follows the acquisition order: FRET, Donor, Acceptor for the FRET
//! stack; bleed-through signal (the FRET channel) and the excited channel for
//! calibration stacks.

use tracing::debug;

use crate::error::{Error, Result};
use crate::image::{PixelBuffer, PixelDepth, SourceImage};

pub const FRET_CHANNEL_COUNT: usize = 3;
pub const CALIBRATION_CHANNEL_COUNT: usize = 2;

fn check_dimensions(reference: &PixelBuffer, other: &PixelBuffer, channel: &'static str) -> Result<()> {
    if reference.width() != other.width() || reference.height() != other.height() {
        return Err(Error::DimensionMismatch {
            channel,
            expected_width: reference.width(),
            expected_height: reference.height(),
            actual_width: other.width(),
            actual_height: other.height(),
        });
    }
    Ok(())
}

fn convert_all<const N: usize>(images: &[SourceImage]) -> Result<[PixelBuffer; N]> {
    if images.len() != N {
        return Err(Error::ChannelCount {
            expected: N,
            actual: images.len(),
        });
    }
    // Reject unsupported depths before converting anything.
    if let Some(image) = images
        .iter()
        .find(|image| image.depth() == PixelDepth::Rgb)
    {
        return Err(Error::UnsupportedPixelDepth {
            depth: image.depth(),
        });
    }

    let buffers = images
        .iter()
        .map(PixelBuffer::from_source)
        .collect::<Result<Vec<_>>>()?;
    let count = buffers.len();
    buffers.try_into().map_err(|_| Error::ChannelCount {
        expected: N,
        actual: count,
    })
}

/// Three equally sized channels: FRET, donor, acceptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FretStack {
    fret: PixelBuffer,
    donor: PixelBuffer,
    acceptor: PixelBuffer,
}

impl FretStack {
    pub fn new(fret: PixelBuffer, donor: PixelBuffer, acceptor: PixelBuffer) -> Result<Self> {
        check_dimensions(&fret, &donor, "donor")?;
        check_dimensions(&fret, &acceptor, "acceptor")?;
        Ok(Self {
            fret,
            donor,
            acceptor,
        })
    }

    /// Builds the stack from source slices in FRET, donor, acceptor order.
    pub fn from_images(images: &[SourceImage]) -> Result<Self> {
        let [fret, donor, acceptor] = convert_all::<FRET_CHANNEL_COUNT>(images)?;
        debug!(
            width = fret.width(),
            height = fret.height(),
            depth = %images[0].depth(),
            "Loaded FRET stack"
        );
        Self::new(fret, donor, acceptor)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.fret.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.fret.height()
    }

    pub fn fret(&self) -> &PixelBuffer {
        &self.fret
    }

    pub fn donor(&self) -> &PixelBuffer {
        &self.donor
    }

    pub fn acceptor(&self) -> &PixelBuffer {
        &self.acceptor
    }

    /// Smooths all three channels in place.
    pub fn smooth(&mut self, sigma: f32) {
        self.fret.smooth_gaussian(sigma);
        self.donor.smooth_gaussian(sigma);
        self.acceptor.smooth_gaussian(sigma);
    }

    pub fn into_channels(self) -> (PixelBuffer, PixelBuffer, PixelBuffer) {
        (self.fret, self.donor, self.acceptor)
    }
}

/// Two equally sized channels from a single-fluorophore sample: the bleed-through
/// signal seen in the FRET channel and the directly excited channel.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationStack {
    signal: PixelBuffer,
    channel: PixelBuffer,
}

impl CalibrationStack {
    pub fn new(signal: PixelBuffer, channel: PixelBuffer) -> Result<Self> {
        check_dimensions(&signal, &channel, "calibration")?;
        Ok(Self { signal, channel })
    }

    /// Builds the stack from source slices in signal, channel order.
    pub fn from_images(images: &[SourceImage]) -> Result<Self> {
        let [signal, channel] = convert_all::<CALIBRATION_CHANNEL_COUNT>(images)?;
        Self::new(signal, channel)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.signal.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.signal.height()
    }

    pub fn signal(&self) -> &PixelBuffer {
        &self.signal
    }

    pub fn channel(&self) -> &PixelBuffer {
        &self.channel
    }
}
