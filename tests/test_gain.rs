// tests/test_gain.rs -- Gain transform fitting through the public API.
//
// Synthetic camera pairs: the destination frame is the source frame mapped
// through a known transform, optionally with noise, so every fit has a
// ground truth to compare against.

use lipflip::gain::{apply, GainConfig, KeypointConfig};
use lipflip::image::Image;
use lipflip::{
    solve_least_squares, BgrImage, ColorSample, ColorSampleSet, Correspondence, Error,
    FeatureMatcher, GainTransform, GainTransformEstimator, HomographyRansac, InlierFilter,
    KeypointSampler, SamplingMode, ScoredMatch,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn reference_transform() -> GainTransform {
    GainTransform::from_rows([
        [0.90, 0.05, 0.00, 0.0],
        [0.10, 1.10, 0.02, 0.0],
        [0.00, 0.03, 0.80, 0.0],
        [5.00, -3.0, 10.0, 1.0],
    ])
}

/// A frame with enough color variety for a full-rank fit.
fn textured_frame(w: usize, h: usize) -> BgrImage<f32> {
    BgrImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as f32, y as f32);
        [x * 3.0 + 10.0, y * 2.5 + 20.0, (x * y * 0.5) % 200.0 + 5.0]
    })
}

fn map_frame(frame: &BgrImage<f32>, t: &GainTransform) -> BgrImage<f32> {
    apply(frame, t).expect("non-empty frame")
}

fn max_coefficient_error(a: &GainTransform, b: &GainTransform) -> f64 {
    let mut worst = 0.0f64;
    for (ra, rb) in a.rows().iter().zip(b.rows()) {
        for j in 0..3 {
            worst = worst.max((ra[j] - rb[j]).abs());
        }
    }
    worst
}

// ===== Collaborators =====

/// Reports a fixed list of matches regardless of the images.
struct ScriptedMatcher(Vec<ScoredMatch>);

impl FeatureMatcher for ScriptedMatcher {
    fn match_features(&self, _: &Image<f32>, _: &Image<f32>) -> Vec<ScoredMatch> {
        self.0.clone()
    }
}

struct KeepAll;

impl InlierFilter for KeepAll {
    fn inlier_mask(&self, pairs: &[Correspondence]) -> Vec<bool> {
        vec![true; pairs.len()]
    }
}

/// `n` same-position matches on a grid, all with distance 1.
fn grid_matches(n: usize) -> Vec<ScoredMatch> {
    (0..n)
        .map(|i| {
            let p = [(3 + (i % 5) * 7) as f64, (2 + (i / 5) * 6) as f64];
            ScoredMatch { pair: Correspondence::new(p, p), distance: 1.0 }
        })
        .collect()
}

// ===== Dense fitting =====

#[test]
fn dense_fit_recovers_reference_without_noise() {
    let src = textured_frame(40, 30);
    let dst = map_frame(&src, &reference_transform());

    let t = GainTransformEstimator::default()
        .fit(&src, &dst, &SamplingMode::Dense)
        .expect("full-rank fit");
    assert!(max_coefficient_error(&t, &reference_transform()) < 1e-3);
}

#[test]
fn dense_fit_error_shrinks_with_more_samples() {
    let truth = reference_transform();
    let mut rng = StdRng::seed_from_u64(7);

    let mut fit_with = |n: usize| {
        let mut src = ColorSampleSet::with_capacity(n);
        let mut dst = ColorSampleSet::with_capacity(n);
        for _ in 0..n {
            let bgr = [rng.gen_range(0.0..255.0), rng.gen_range(0.0..255.0), rng.gen_range(0.0..255.0)];
            let mapped = truth.transform(bgr);
            let noisy = mapped.map(|v| v + rng.gen_range(-4.0..4.0));
            src.push(ColorSample([bgr[0], bgr[1], bgr[2], 1.0]));
            dst.push(ColorSample([noisy[0], noisy[1], noisy[2], 1.0]));
        }
        let t = solve_least_squares(&src, &dst).expect("noisy but full rank");
        max_coefficient_error(&t, &truth)
    };

    let coarse = fit_with(50);
    let fine = fit_with(20_000);
    assert!(fine < coarse, "more samples should help: {coarse} vs {fine}");
    assert!(fine < 0.5, "fine fit too far off: {fine}");
}

#[test]
fn dense_fit_error_falls_with_noise_amplitude() {
    let truth = reference_transform();
    let mut rng = StdRng::seed_from_u64(11);
    let colors: Vec<[f64; 3]> = (0..500)
        .map(|_| [rng.gen_range(0.0..255.0), rng.gen_range(0.0..255.0), rng.gen_range(0.0..255.0)])
        .collect();
    let jitter: Vec<[f64; 3]> = (0..500)
        .map(|_| [rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)])
        .collect();

    let errors: Vec<f64> = [8.0, 2.0, 0.5, 0.0]
        .iter()
        .map(|&amplitude| {
            let src: ColorSampleSet = colors.iter().map(|&[b, g, r]| ColorSample([b, g, r, 1.0])).collect();
            let dst: ColorSampleSet = colors
                .iter()
                .zip(&jitter)
                .map(|(&bgr, n)| {
                    let m = truth.transform(bgr);
                    ColorSample([m[0] + amplitude * n[0], m[1] + amplitude * n[1], m[2] + amplitude * n[2], 1.0])
                })
                .collect();
            let t = solve_least_squares(&src, &dst).expect("full rank");
            max_coefficient_error(&t, &truth)
        })
        .collect();

    for pair in errors.windows(2) {
        assert!(pair[1] < pair[0], "error should fall with noise: {errors:?}");
    }
    assert!(errors[3] < 1e-9, "noise-free fit should be exact: {errors:?}");
}

#[test]
fn solid_color_frames_map_exactly() {
    let src = BgrImage::filled(4, 4, [10u8, 20, 30]);
    let dst = BgrImage::filled(4, 4, [20u8, 30, 40]);

    let t = GainTransformEstimator::default()
        .fit(&src, &dst, &SamplingMode::Dense)
        .expect("consistent rank-deficient system");
    let mapped = apply(&src, &t).expect("apply");
    for px in mapped.pixels() {
        for (got, want) in px.iter().zip([20.0f32, 30.0, 40.0]) {
            assert!((got - want).abs() < 1e-6, "{got} != {want}");
        }
    }
}

#[test]
fn fit_rejects_mismatched_frames() {
    let result = GainTransformEstimator::default().fit(
        &BgrImage::<u8>::new(4, 4),
        &BgrImage::<u8>::new(5, 4),
        &SamplingMode::Dense,
    );
    assert!(matches!(
        result,
        Err(Error::SizeMismatch { expected: (4, 4), found: (5, 4) })
    ));
}

#[test]
fn identity_transform_leaves_frame_unchanged() {
    let src = BgrImage::from_fn(6, 5, |x, y| [(x * 40) as u8, (y * 50) as u8, 255]);
    let out = apply(&src, &GainTransform::identity()).expect("apply");
    for (a, b) in src.pixels().zip(out.pixels()) {
        assert_eq!(a.map(f32::from), b);
    }
}

// ===== Keypoint fitting =====

#[test]
fn keypoint_fit_needs_fifteen_inliers() {
    let src = textured_frame(40, 30);
    let dst = map_frame(&src, &reference_transform());
    let estimator = GainTransformEstimator::default();

    let fourteen = ScriptedMatcher(grid_matches(14));
    let mode = SamplingMode::Keypoint(KeypointSampler::new(&fourteen, &KeepAll));
    assert!(matches!(
        estimator.fit(&src, &dst, &mode),
        Err(Error::InsufficientInliers { found: 14, required: 15 })
    ));

    let fifteen = ScriptedMatcher(grid_matches(15));
    let mode = SamplingMode::Keypoint(KeypointSampler::new(&fifteen, &KeepAll));
    let t = estimator.fit(&src, &dst, &mode).expect("fifteen inliers are enough");
    assert!(max_coefficient_error(&t, &reference_transform()) < 1e-3);
}

#[test]
fn distance_filter_can_leave_too_few_matches() {
    let src = textured_frame(40, 30);
    let estimator = GainTransformEstimator::default();

    // 10 is not below 3 * 1, so only three survive.
    let mut matches = grid_matches(3);
    matches.push(ScoredMatch { distance: 10.0, ..matches[0] });
    let matcher = ScriptedMatcher(matches);
    let mode = SamplingMode::Keypoint(KeypointSampler::new(&matcher, &KeepAll));
    assert!(matches!(
        estimator.fit(&src, &src, &mode),
        Err(Error::InsufficientMatches { found: 3, required: 4 })
    ));

    // A zero minimum distance keeps nothing.
    let mut matches = grid_matches(20);
    matches[0].distance = 0.0;
    let matcher = ScriptedMatcher(matches);
    let mode = SamplingMode::Keypoint(KeypointSampler::new(&matcher, &KeepAll));
    assert!(matches!(
        estimator.fit(&src, &src, &mode),
        Err(Error::InsufficientMatches { found: 0, .. })
    ));
}

#[test]
fn keypoint_thresholds_come_from_config() {
    let src = textured_frame(40, 30);
    let dst = map_frame(&src, &reference_transform());
    let matcher = ScriptedMatcher(grid_matches(8));
    let config = KeypointConfig { min_inliers: 6, ..KeypointConfig::default() };
    let sampler = KeypointSampler::with_config(&matcher, &KeepAll, config.clone());
    assert_eq!(sampler.config().min_inliers, 6);

    let estimator = GainTransformEstimator::new(GainConfig { keypoint: config, ..GainConfig::default() });
    estimator
        .fit(&src, &dst, &estimator.keypoint_mode(&matcher, &KeepAll))
        .expect("eight inliers clear a threshold of six");

    let strict = GainTransformEstimator::default();
    assert!(matches!(
        strict.fit(&src, &dst, &strict.keypoint_mode(&matcher, &KeepAll)),
        Err(Error::InsufficientInliers { found: 8, required: 15 })
    ));
}

#[test]
fn keypoint_samples_each_frame_at_its_own_position() {
    // The second camera sees the scene shifted by (3, 2).
    let src = textured_frame(40, 30);
    let mapped = map_frame(&src, &reference_transform());
    let dst = BgrImage::from_fn(40, 30, |x, y| mapped.get(x.saturating_sub(3), y.saturating_sub(2)));

    let matches: Vec<ScoredMatch> = grid_matches(20)
        .into_iter()
        .map(|m| {
            let a = m.pair.a;
            ScoredMatch { pair: Correspondence::new(a, [a[0] + 3.0, a[1] + 2.0]), ..m }
        })
        .collect();
    let matcher = ScriptedMatcher(matches);
    let estimator = GainTransformEstimator::default();
    let t = estimator
        .fit(&src, &dst, &estimator.keypoint_mode(&matcher, &KeepAll))
        .expect("twenty shifted inliers");
    assert!(max_coefficient_error(&t, &reference_transform()) < 1e-3);
}

#[test]
fn keypoint_fit_with_homography_ransac_drops_outliers() {
    let src = textured_frame(64, 48);
    let dst = map_frame(&src, &reference_transform());

    // 30 good matches at identical positions plus 6 that point far away.
    let mut matches = Vec::new();
    for j in 0..5 {
        for i in 0..6 {
            let p = [(4 + i * 10) as f64, (3 + j * 9) as f64];
            matches.push(ScoredMatch { pair: Correspondence::new(p, p), distance: 1.0 });
        }
    }
    for k in 0..6 {
        let a = [(5 + k * 9) as f64, 40.0];
        let b = [(60 - k * 9) as f64, 2.0 + k as f64];
        matches.push(ScoredMatch { pair: Correspondence::new(a, b), distance: 1.5 });
    }

    let matcher = ScriptedMatcher(matches);
    let ransac = HomographyRansac::default();
    let mode = SamplingMode::Keypoint(KeypointSampler::new(&matcher, &ransac));
    let t = GainTransformEstimator::default()
        .fit(&src, &dst, &mode)
        .expect("outliers removed by RANSAC");
    assert!(max_coefficient_error(&t, &reference_transform()) < 1e-3);
}
