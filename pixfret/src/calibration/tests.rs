use super::*;
use crate::background::{BackgroundLevel, CalibrationBackgrounds};
use crate::image::{Mask, PixelBuffer, Roi};
use crate::model::{FittedModel, ModelKind};
use crate::stack::CalibrationStack;

/// Calibration stack whose channel intensity runs `1..=columns` along x (repeated on
/// every row) and whose signal is `ratio(channel) * channel + bg_signal`.
fn synthetic_stack(
    columns: usize,
    rows: usize,
    bg_signal: f32,
    bg_channel: f32,
    ratio: impl Fn(f32) -> f32,
) -> CalibrationStack {
    let mut signal = Vec::with_capacity(columns * rows);
    let mut channel = Vec::with_capacity(columns * rows);
    for _ in 0..rows {
        for x in 0..columns {
            let c = (x + 1) as f32;
            channel.push(c + bg_channel);
            signal.push(ratio(c) * c + bg_signal);
        }
    }
    CalibrationStack::new(
        PixelBuffer::from_vec(columns, rows, signal),
        PixelBuffer::from_vec(columns, rows, channel),
    )
    .unwrap()
}

fn unsmoothed_engine() -> CalibrationEngine {
    CalibrationEngine::new(CalibrationConfig {
        smoothing_sigma: 0.0,
        ..CalibrationConfig::default()
    })
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_default_config() {
    let config = CalibrationConfig::default();
    config.validate();
    assert_eq!(config.smoothing_sigma, 2.0);
    assert_eq!(config.binning.ratio_max, 2.0);
    assert_eq!(config.binning.ratio_bins_per_unit, 512.0);
    assert_eq!(config.binning.channel_step, 1.0);
    assert_eq!(config.lm.max_iterations, 100);
}

#[test]
#[should_panic(expected = "channel_step must be positive")]
fn test_config_rejects_zero_channel_step() {
    CalibrationEngine::new(CalibrationConfig {
        binning: ScatterBinning {
            channel_step: 0.0,
            ..ScatterBinning::default()
        },
        ..CalibrationConfig::default()
    });
}

// ============================================================================
// Scatter extraction
// ============================================================================

#[test]
fn test_extract_requires_roi() {
    let stack = synthetic_stack(4, 1, 0.0, 0.0, |_| 0.5);
    let err = unsmoothed_engine().extract_scatter(&stack, None).unwrap_err();
    assert!(matches!(err, crate::Error::MissingRoi { .. }));
}

#[test]
fn test_extract_deduplicates_identical_pixels() {
    let stack = synthetic_stack(10, 4, 0.0, 0.0, |_| 0.25);
    let histogram = unsmoothed_engine()
        .extract_scatter(&stack, Some(&Roi::full(10, 4)))
        .unwrap();

    assert_eq!(histogram.total_count(), 40);
    assert_eq!(histogram.occupied_cells(), 10);
    assert!(histogram.weighted_samples().all(|(_, _, n)| n == 4));

    let samples = histogram.samples();
    assert_eq!(samples.len(), 10);
    for (i, (c, r)) in samples.iter().enumerate() {
        assert!((c - (i + 1) as f32).abs() < 1e-4);
        assert!((r - 0.25).abs() < 1e-6);
    }
}

#[test]
fn test_extract_quantizes_ratio() {
    // 0.3 * 512 = 153.6 rounds to bin 154.
    let stack = synthetic_stack(5, 1, 0.0, 0.0, |_| 0.3);
    let samples = unsmoothed_engine()
        .extract_scatter(&stack, Some(&Roi::full(5, 1)))
        .unwrap()
        .samples();
    for &r in &samples.ratio {
        assert!((r - 154.0 / 512.0).abs() < 1e-6);
    }
}

#[test]
fn test_extract_subtracts_background() {
    let stack = synthetic_stack(20, 1, 30.0, 100.0, |_| 0.5);
    let mut engine = unsmoothed_engine();
    engine.set_backgrounds(CalibrationBackgrounds::from_values(30.0, 100.0));
    let samples = engine
        .extract_scatter(&stack, Some(&Roi::full(20, 1)))
        .unwrap()
        .samples();

    assert_eq!(samples.len(), 20);
    assert_eq!(samples.channel_range(), Some((1.0, 20.0)));
    assert!(samples.ratio.iter().all(|&r| (r - 0.5).abs() < 1e-3));
}

#[test]
fn test_extract_drops_out_of_range_ratios() {
    // Ratios 3.0, 0.0, -0.5 and 1.0 at channels 1, 2, 3, 4.
    let signal = PixelBuffer::from_vec(4, 1, vec![3.0, 0.0, -1.5, 4.0]);
    let channel = PixelBuffer::from_vec(4, 1, vec![1.0, 2.0, 3.0, 4.0]);
    let stack = CalibrationStack::new(signal, channel).unwrap();
    let samples = unsmoothed_engine()
        .extract_scatter(&stack, Some(&Roi::full(4, 1)))
        .unwrap()
        .samples();

    assert_eq!(samples.len(), 1);
    assert!((samples.channel[0] - 4.0).abs() < 1e-6);
    assert!((samples.ratio[0] - 1.0).abs() < 1e-6);
}

#[test]
fn test_extract_skips_non_positive_channel() {
    let signal = PixelBuffer::from_vec(3, 1, vec![1.0, 1.0, 1.0]);
    let channel = PixelBuffer::from_vec(3, 1, vec![0.0, -2.0, 2.0]);
    let stack = CalibrationStack::new(signal, channel).unwrap();
    let histogram = unsmoothed_engine()
        .extract_scatter(&stack, Some(&Roi::full(3, 1)))
        .unwrap();
    assert_eq!(histogram.total_count(), 1);
}

#[test]
fn test_extract_empty_when_no_positive_channel() {
    let stack = CalibrationStack::new(PixelBuffer::filled(3, 3, 5.0), PixelBuffer::new(3, 3)).unwrap();
    let histogram = unsmoothed_engine()
        .extract_scatter(&stack, Some(&Roi::full(3, 3)))
        .unwrap();
    assert_eq!(histogram.occupied_cells(), 0);
    assert!(histogram.samples().is_empty());
}

#[test]
fn test_extract_respects_mask() {
    let stack = synthetic_stack(4, 1, 0.0, 0.0, |c| 0.1 * c);
    let roi = Roi::Mask(Mask::new(4, 1, vec![false, true, false, true]));
    let samples = unsmoothed_engine()
        .extract_scatter(&stack, Some(&roi))
        .unwrap()
        .samples();
    assert_eq!(samples.len(), 2);
    // Channel origin is the smallest selected intensity (2).
    assert!((samples.channel[0] - 2.0).abs() < 1e-6);
    assert!((samples.channel[1] - 4.0).abs() < 1e-6);
}

#[test]
fn test_extract_smoothing_leaves_stack_untouched() {
    let stack = synthetic_stack(16, 16, 0.0, 0.0, |_| 0.4);
    let before = stack.clone();
    let engine = CalibrationEngine::default();
    let histogram = engine
        .extract_scatter(&stack, Some(&Roi::full(16, 16)))
        .unwrap();
    assert_eq!(stack, before);
    assert!(histogram.total_count() > 0);
}

#[test]
fn test_background_accumulation_through_engine() {
    let stack = synthetic_stack(4, 1, 0.0, 0.0, |_| 0.5);
    let mut engine = unsmoothed_engine();
    engine
        .accumulate_background(&stack, Some(&Roi::full(4, 1)))
        .unwrap();
    assert_eq!(engine.backgrounds().channel, BackgroundLevel::new(2.5, 4));

    engine.reset_background();
    assert_eq!(*engine.backgrounds(), CalibrationBackgrounds::default());
}

// ============================================================================
// Fits
// ============================================================================

#[test]
fn test_constant_fit_is_mean_ratio() {
    let samples = ScatterSamples::new(vec![1.0, 2.0, 3.0], vec![0.2, 0.4, 0.6]);
    let model = fit_constant(&samples);
    assert!(model.fitted);
    assert_eq!(model.kind, ModelKind::Constant);
    assert!((model.params[0] - 0.4).abs() < 1e-6);
}

#[test]
fn test_constant_fit_without_samples() {
    assert!(!fit_constant(&ScatterSamples::default()).fitted);
}

#[test]
fn test_linear_fit_recovers_line() {
    let channel: Vec<f32> = (0..20).map(|i| i as f32).collect();
    let ratio = channel.iter().map(|&x| 2.0 * x + 3.0).collect();
    let samples = ScatterSamples::new(channel, ratio);

    let model = fit_linear(&samples, &fit_constant(&samples));
    assert!(model.fitted);
    assert!((model.params[0] - 3.0).abs() < 1e-4, "intercept {}", model.params[0]);
    assert!((model.params[1] - 2.0).abs() < 1e-5, "slope {}", model.params[1]);
}

#[test]
fn test_linear_fit_rejects_flat_data() {
    let samples = ScatterSamples::new(vec![1.0, 2.0, 3.0, 4.0], vec![0.5; 4]);
    let model = fit_linear(&samples, &fit_constant(&samples));
    assert!(!model.fitted);
}

#[test]
fn test_linear_fit_requires_constant() {
    let samples = ScatterSamples::new(vec![1.0, 2.0], vec![1.0, 2.0]);
    assert!(!fit_linear(&samples, &FittedModel::no_fit(ModelKind::Constant)).fitted);
}

#[test]
fn test_exponential_requires_linear() {
    let samples = ScatterSamples::new(vec![1.0, 2.0, 3.0], vec![0.5; 3]);
    let constant = fit_constant(&samples);
    let (model, report) = fit_exponential(
        &samples,
        &constant,
        &FittedModel::no_fit(ModelKind::Linear),
        2.0,
        &Default::default(),
    );
    assert!(!model.fitted);
    assert!(report.is_none());
}

#[test]
fn test_exponential_needs_two_high_samples() {
    let samples = ScatterSamples::new(vec![1.0, 2.0, 3.0, 4.0], vec![0.1, 0.2, 0.3, 0.4]);
    let constant = fit_constant(&samples);
    let linear = fit_linear(&samples, &constant);
    assert!(linear.fitted);
    // Only channel 4 lies above the midpoint.
    let (model, _) = fit_exponential(&samples, &constant, &linear, 3.5, &Default::default());
    assert!(!model.fitted);
}

#[test]
fn test_exponential_seeds_from_linear_range_when_log_line_degenerates() {
    // Every sample above the midpoint sits at channel 10, so no line fits ln(ratio - a).
    let samples = ScatterSamples::new(
        vec![0.0, 1.0, 2.0, 3.0, 10.0, 10.0, 10.0],
        vec![0.10, 0.11, 0.12, 0.13, 0.5, 0.6, 0.7],
    );
    let constant = fit_constant(&samples);
    let linear = fit_linear(&samples, &constant);
    assert!(linear.fitted);

    let (_, report) = fit_exponential(&samples, &constant, &linear, 5.0, &Default::default());
    let report = report.expect("optimizer should run from the linear seed");
    assert!(report.iterations > 0);
    assert!(report.chi2.is_finite());
}

#[test]
fn test_exponential_without_channel_span_is_no_fit() {
    // Mean ratio 0.4 leaves two samples above it, both at the same channel.
    let samples = ScatterSamples::new(vec![4.0; 3], vec![0.1, 0.5, 0.6]);
    let constant = fit_constant(&samples);
    let linear = FittedModel::linear(0.1, 0.05);
    let (model, report) = fit_exponential(&samples, &constant, &linear, 2.0, &Default::default());
    assert!(!model.fitted);
    assert!(report.is_none());
}

#[test]
fn test_crop_window_is_half_open() {
    let samples = ScatterSamples::new(vec![1.0, 2.0, 3.0, 4.0], vec![0.1, 0.2, 0.3, 0.4]);
    let cropped = samples.crop(&CropWindow::new(2.0, 4.0, 0.0, 2.0));
    assert_eq!(cropped.channel, vec![2.0, 3.0]);

    let cropped = samples.crop(&CropWindow::new(0.0, 10.0, 0.15, 0.3));
    assert_eq!(cropped.ratio, vec![0.2]);
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_constant_bleed_through_calibration() {
    let stack = synthetic_stack(200, 2, 0.0, 0.0, |_| 0.3);
    let fit = unsmoothed_engine()
        .calibrate(&stack, Some(&Roi::full(200, 2)), None)
        .unwrap();

    assert!(fit.constant.fitted);
    assert!((fit.constant.params[0] - 0.3).abs() < 1e-3);
    assert!(!fit.linear.fitted);
    assert!(!fit.exponential.fitted);
    assert!(fit.optimizer.is_none());
}

#[test]
fn test_linear_bleed_through_calibration() {
    let stack = synthetic_stack(200, 2, 0.0, 0.0, |c| 0.1 + 0.002 * c);
    let fit = unsmoothed_engine()
        .calibrate(&stack, Some(&Roi::full(200, 2)), None)
        .unwrap();

    assert!(fit.linear.fitted);
    assert!((fit.linear.params[0] - 0.1).abs() < 5e-3);
    assert!((fit.linear.params[1] - 0.002).abs() < 5e-5);
    assert_eq!(fit.model(ModelKind::Linear), fit.linear);
}

#[test]
fn test_exponential_bleed_through_calibration() {
    let truth = |c: f32| 0.2 + 0.05 * (0.02 * c).exp();
    let stack = synthetic_stack(150, 1, 0.0, 0.0, truth);
    let fit = unsmoothed_engine()
        .calibrate(&stack, Some(&Roi::full(150, 1)), None)
        .unwrap();

    assert!(fit.exponential.fitted);
    let report = fit.optimizer.unwrap();
    assert!(report.iterations > 0);
    for c in [10.0f32, 75.0, 140.0] {
        let predicted = fit.exponential.ratio(c);
        assert!(
            (predicted - truth(c)).abs() < 0.01,
            "channel {c}: predicted {predicted}, expected {}",
            truth(c)
        );
    }
}

#[test]
fn test_crop_window_restricts_fit() {
    let stack = synthetic_stack(100, 1, 0.0, 0.0, |c| if c < 50.0 { 0.2 } else { 0.6 });
    let engine = unsmoothed_engine();
    let samples = engine
        .extract_scatter(&stack, Some(&Roi::full(100, 1)))
        .unwrap()
        .samples();

    let window = CropWindow::new(0.0, 40.0, 0.0, 2.0);
    let fit = engine.fit(&samples, Some(&window));
    assert!((fit.constant.params[0] - 0.2).abs() < 2e-3);

    let full = engine.fit(&samples, None);
    assert!(full.constant.params[0] > 0.3);
}
