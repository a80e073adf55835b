//! Testing utilities for pixfret.

#![allow(dead_code)]

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::image::PixelBuffer;

/// Initialize tracing subscriber for tests.
/// Safe to call multiple times - will only initialize once.
/// Respects RUST_LOG env var, defaults to "info".
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Deterministic uniform noise source.
pub struct Noise {
    rng: StdRng,
    amplitude: f32,
}

impl Noise {
    /// Noise uniform in `[-amplitude, amplitude)`.
    pub fn new(seed: u64, amplitude: f32) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            amplitude,
        }
    }

    pub fn sample(&mut self) -> f32 {
        if self.amplitude == 0.0 {
            return 0.0;
        }
        self.rng.random_range(-self.amplitude..self.amplitude)
    }
}

/// Buffer whose pixel `(x, y)` is `f(x, y)` plus noise.
pub fn synthetic_buffer(
    width: usize,
    height: usize,
    noise: &mut Noise,
    f: impl Fn(usize, usize) -> f32,
) -> PixelBuffer {
    let mut pixels = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            pixels.push(f(x, y) + noise.sample());
        }
    }
    PixelBuffer::from_vec(width, height, pixels)
}
