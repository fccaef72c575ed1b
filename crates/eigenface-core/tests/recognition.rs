//! End-to-end recognition on synthetic 48x64 faces.

use eigenface_core::{
    project, reconstruction_error, ColorRaster, EigenspaceTrainer, Euclidean, FaceLocator,
    FaceSample, GrayRaster, NoProgress, RecognitionContext, RecognizerConfig, TrainedModel,
};

const W: u32 = 48;
const H: u32 = 64;

/// Class "A" is a horizontal ramp, class "B" a vertical one. Each variant
/// brightens a different 4x4 patch (in a class-specific row band) so
/// samples of a class stay distinct.
fn synthetic(class: char, variant: u32) -> GrayRaster {
    let mut pixels = Vec::with_capacity((W * H) as usize);
    for y in 0..H {
        for x in 0..W {
            let base = match class {
                'A' => 40.0 + 3.0 * x as f64,
                _ => 40.0 + 3.0 * y as f64,
            };
            let px = 4 + variant * 8;
            let py = if class == 'A' { 10 } else { 40 };
            let in_patch = x >= px && x < px + 4 && y >= py && y < py + 4;
            pixels.push(if in_patch { base + 25.0 } else { base });
        }
    }
    GrayRaster::new(W, H, pixels).unwrap()
}

fn gallery() -> Vec<FaceSample> {
    [('A', 0), ('A', 1), ('B', 0), ('B', 1), ('B', 2)]
        .into_iter()
        .map(|(class, variant)| {
            FaceSample::new(synthetic(class, variant))
                .with_label(class.to_string())
                .with_description("synthetic face")
        })
        .collect()
}

#[test]
fn test_scenario_probe_b_copy() {
    let config = RecognizerConfig {
        neighbours: 3,
        ..RecognizerConfig::default()
    };
    let model = TrainedModel::build(gallery(), &config, &NoProgress).unwrap();
    assert_eq!(model.eigenspace().rank(), 4);

    let probe = synthetic('B', 1);
    let coefficients = model.project(&probe).unwrap();
    let store = model.store();

    assert_eq!(store.nearest_label(&coefficients, &Euclidean), Some("B"));
    assert_eq!(store.knn(&coefficients, &Euclidean, 3), Some("B"));
    assert_eq!(
        store.nearest_label(&coefficients, &Euclidean),
        store.knn(&coefficients, &Euclidean, 1)
    );

    let result = model.classify(&probe).unwrap();
    assert_eq!(result.nearest.as_deref(), Some("B"));
    assert_eq!(result.majority.as_deref(), Some("B"));
}

#[test]
fn test_probe_a_variant_outside_gallery() {
    let config = RecognizerConfig {
        neighbours: 2,
        ..RecognizerConfig::default()
    };
    let model = TrainedModel::build(gallery(), &config, &NoProgress).unwrap();
    let result = model.classify(&synthetic('A', 3)).unwrap();
    assert_eq!(result.nearest.as_deref(), Some("A"));
    assert_eq!(result.majority.as_deref(), Some("A"));
}

#[test]
fn test_distance_order_covers_gallery() {
    let model = TrainedModel::build(gallery(), &RecognizerConfig::default(), &NoProgress).unwrap();
    let probe = model.project(&synthetic('A', 0)).unwrap();
    let ranked = model.store().distance_order(&probe, &Euclidean);

    assert_eq!(ranked.len(), 5);
    assert_eq!(ranked[0].index, 0);
    assert!(ranked[0].distance < 1e-6);
    assert_eq!(ranked[1].label, "A");
    for pair in ranked.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
}

#[test]
fn test_backprojection_regression() {
    // Without mapping the proxy eigenvectors through A, training samples
    // would not reconstruct and the error would not shrink with k.
    let rasters: Vec<GrayRaster> = gallery().into_iter().map(|s| s.raster).collect();
    let space = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap();
    assert_eq!(space.eigenvectors().nrows(), (W * H) as usize);

    let probe = &rasters[4];
    let mut previous = f64::INFINITY;
    for k in 0..=space.rank() {
        let err = reconstruction_error(probe, &space, k).unwrap();
        assert!(err <= previous + 1e-9, "k={k}: {err} > {previous}");
        previous = err;
    }
    assert!(previous < 1e-6, "full-rank reconstruction error {previous}");

    let zero = project(&space.average_face(), &space, space.rank()).unwrap();
    assert!(zero.iter().all(|c| c.abs() < 1e-6));
}

#[test]
fn test_context_chart_after_training() {
    let ctx = RecognitionContext::new(RecognizerConfig::default());
    let model = ctx.train(gallery(), &NoProgress).unwrap();
    let probe = model.project(&synthetic('B', 0)).unwrap();

    let points = model.store().project_to_3d(Some(probe.as_slice()));
    assert_eq!(points.len(), 2 * 18 + 1);
    assert!(points
        .iter()
        .all(|p| p.position.iter().all(|&v| (0.0..=100.0).contains(&v))));
}

#[test]
fn test_locator_feeds_training() {
    // A skin-coloured square on a blue background, with a darker skin-tone
    // block whose position differs per photo.
    let photo = |variant: u32| {
        let (w, h, size) = (80u32, 80u32, 40u32);
        let lo = (w - size) / 2;
        let (bx, by) = (lo + 4 + 12 * variant, lo + 8);
        let mut pixels = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                let inside = x >= lo && x < lo + size && y >= lo && y < lo + size;
                let in_block = x >= bx && x < bx + 8 && y >= by && y < by + 8;
                pixels.push(match (inside, in_block) {
                    (true, true) => [180, 120, 90],
                    (true, false) => [200, 150, 120],
                    _ => [0, 0, 255],
                });
            }
        }
        ColorRaster::new(w, h, pixels).unwrap()
    };

    let locator = FaceLocator::default();
    let labels = ["left", "middle", "right"];
    let samples: Vec<FaceSample> = labels
        .iter()
        .zip(0u32..)
        .map(|(label, variant)| FaceSample::new(locator.prepare(&photo(variant), true)).with_label(*label))
        .collect();
    for sample in &samples {
        assert_eq!((sample.raster.width(), sample.raster.height()), (W, H));
    }
    assert_ne!(samples[0].raster.pixels(), samples[1].raster.pixels());

    let config = RecognizerConfig {
        neighbours: 1,
        ..RecognizerConfig::default()
    };
    let model = TrainedModel::build(samples, &config, &NoProgress).unwrap();
    assert_eq!(model.store().len(), 3);
    assert_eq!(model.eigenspace().rank(), 2);

    let result = model.classify(&locator.prepare(&photo(1), true)).unwrap();
    assert_eq!(result.nearest.as_deref(), Some("middle"));
    assert!(result.ranking[0].1 < 1e-6);
}
