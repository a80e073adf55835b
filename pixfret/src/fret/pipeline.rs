use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{compute_fret, FretOutput, FretParameters, Normalization};
use crate::error::Result;
use crate::image::SourceImage;
use crate::stack::FretStack;

/// Progress notifications emitted while the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PipelineStatus {
    Smoothing { sigma: f32 },
    Computing { normalization: Normalization },
    Finished { elapsed: Duration },
}

pub type StatusCallback = Arc<dyn Fn(PipelineStatus) + Send + Sync>;

fn report(status: Option<&StatusCallback>, value: PipelineStatus) {
    if let Some(callback) = status {
        callback(value);
    }
}

/// Smooths the stack when configured, then computes FRET and normalized FRET.
pub fn run_pipeline(
    mut stack: FretStack,
    params: &FretParameters,
    status: Option<&StatusCallback>,
) -> FretOutput {
    params.config.validate();
    let start = Instant::now();

    let sigma = params.config.blur_sigma.abs();
    let smoothed = sigma > 0.0;
    if smoothed {
        report(status, PipelineStatus::Smoothing { sigma });
        debug!(sigma, "Smoothing FRET stack");
        stack.smooth(sigma);
    }

    let (smoothed_donor, smoothed_acceptor) = if smoothed && params.config.keep_smoothed {
        (Some(stack.donor().clone()), Some(stack.acceptor().clone()))
    } else {
        (None, None)
    };

    report(
        status,
        PipelineStatus::Computing {
            normalization: params.config.normalization,
        },
    );
    let (fret, normalized_fret) = compute_fret(&stack, params);

    let elapsed = start.elapsed();
    info!(
        width = stack.width(),
        height = stack.height(),
        normalization = %params.config.normalization,
        elapsed_ms = elapsed.as_millis() as u64,
        "FRET computation finished"
    );
    report(status, PipelineStatus::Finished { elapsed });

    FretOutput {
        fret,
        normalized_fret,
        smoothed_donor,
        smoothed_acceptor,
    }
}

/// Validates `images` and runs the pipeline on a dedicated worker thread that owns
/// every buffer it touches.
pub fn spawn_pipeline(
    images: Vec<SourceImage>,
    params: FretParameters,
    status: Option<StatusCallback>,
) -> std::io::Result<JoinHandle<Result<FretOutput>>> {
    std::thread::Builder::new()
        .name("pixfret-worker".to_string())
        .spawn(move || {
            let stack = FretStack::from_images(&images)?;
            drop(images);
            Ok(run_pipeline(stack, &params, status.as_ref()))
        })
}
