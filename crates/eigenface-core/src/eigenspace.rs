//! PCA eigenspace training.
//!
//! Uses the small N x N covariance proxy `L = Aᵗ·A` instead of the full
//! P x P pixel covariance, then maps the proxy's eigenvectors back into
//! image space with `U = A·V`.

use crate::progress::{Progress, ProgressSink, TrainingStage};
use crate::types::{FaceSample, GrayRaster, RasterImage};
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

/// Eigenpairs whose normalized eigenvalue falls below this are discarded.
pub const EIGENVALUE_THRESHOLD: f64 = 1e-4;
const EIGEN_SOLVER_EPS: f64 = f64::EPSILON;
const EIGEN_SOLVER_MAX_ITERATIONS: usize = 10_000;

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("training needs at least 2 face samples, got {0}")]
    InsufficientData(usize),
    #[error(
        "sample {index} is {}x{}, expected {}x{} like the first sample",
        .actual.0, .actual.1, .expected.0, .expected.1
    )]
    DimensionMismatch {
        index: usize,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("numerical failure: {0}")]
    Numerical(String),
}

/// A trained PCA subspace: mean face plus ranked, orthonormal eigenfaces.
#[derive(Debug, Clone)]
pub struct Eigenspace {
    width: u32,
    height: u32,
    mean_face: Array1<f64>,
    /// P x k, one unit-length eigenface per column.
    eigenvectors: Array2<f64>,
    /// Length k, non-increasing.
    eigenvalues: Array1<f64>,
}

impl Eigenspace {
    /// Width of the rasters this space was trained on.
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixels per raster (P).
    pub fn pixel_count(&self) -> usize {
        self.mean_face.len()
    }

    /// Number of retained eigenvectors (k).
    pub fn rank(&self) -> usize {
        self.eigenvalues.len()
    }

    pub fn mean_face(&self) -> &Array1<f64> {
        &self.mean_face
    }

    pub fn eigenvectors(&self) -> &Array2<f64> {
        &self.eigenvectors
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    /// The mean face as a displayable raster.
    pub fn average_face(&self) -> GrayRaster {
        RasterImage::from_parts(self.width, self.height, self.mean_face.to_vec())
    }

    /// Eigenface `index` min-max scaled into 0..=255 for display.
    pub fn eigenface(&self, index: usize) -> Option<GrayRaster> {
        if index >= self.rank() {
            return None;
        }
        let column = self.eigenvectors.column(index);
        let min = column.iter().copied().fold(f64::INFINITY, f64::min);
        let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;

        let pixels = column
            .iter()
            .map(|&v| if range > 0.0 { (v - min) / range * 255.0 } else { 0.0 })
            .collect();
        Some(RasterImage::from_parts(self.width, self.height, pixels))
    }
}

/// Builds an [`Eigenspace`] from equally sized face rasters.
#[derive(Debug, Clone)]
pub struct EigenspaceTrainer {
    eigenvalue_threshold: f64,
}

impl Default for EigenspaceTrainer {
    fn default() -> Self {
        Self {
            eigenvalue_threshold: EIGENVALUE_THRESHOLD,
        }
    }
}

impl EigenspaceTrainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the retention cut-off for normalized eigenvalues.
    pub fn with_eigenvalue_threshold(mut self, threshold: f64) -> Self {
        self.eigenvalue_threshold = threshold;
        self
    }

    /// Train on the rasters of a labelled corpus.
    pub fn train_samples(
        &self,
        samples: &[FaceSample],
        progress: &dyn ProgressSink,
    ) -> Result<Eigenspace, TrainerError> {
        self.train(samples.iter().map(|s| &s.raster), progress)
    }

    /// Compute the eigenspace of `rasters`.
    ///
    /// Requires at least two rasters, all of the same size.
    pub fn train<'a, I>(&self, rasters: I, progress: &dyn ProgressSink) -> Result<Eigenspace, TrainerError>
    where
        I: IntoIterator<Item = &'a GrayRaster>,
    {
        let rasters: Vec<&GrayRaster> = rasters.into_iter().collect();
        let n = rasters.len();
        if n < 2 {
            return Err(TrainerError::InsufficientData(n));
        }

        let first = rasters[0];
        let (width, height) = (first.width(), first.height());
        if let Some((index, r)) = rasters
            .iter()
            .enumerate()
            .find(|(_, r)| !r.same_size(first))
        {
            return Err(TrainerError::DimensionMismatch {
                index,
                expected: (width, height),
                actual: (r.width(), r.height()),
            });
        }
        let p = first.len();

        progress.report(Progress::Stage(TrainingStage::ConstructingMatrix));
        let m = Array2::from_shape_fn((n, p), |(i, j)| rasters[i].pixels()[j]);
        if m.iter().any(|v| !v.is_finite()) {
            return Err(TrainerError::Numerical(
                "training rasters contain non-finite pixel values".into(),
            ));
        }

        progress.report(Progress::Stage(TrainingStage::ComputingAverages));
        let mean_face = m
            .mean_axis(Axis(0))
            .ok_or_else(|| TrainerError::Numerical("empty training matrix".into()))?;

        progress.report(Progress::Stage(TrainingStage::ComputingCovariance));
        // P x N: one centred sample per column.
        let a = (&m - &mean_face).reversed_axes();
        let l = a.t().dot(&a);

        progress.report(Progress::Stage(TrainingStage::CalculatingEigenvectors));
        let proxy = DMatrix::from_fn(n, n, |i, j| l[[i, j]]);
        let eigen = SymmetricEigen::try_new(proxy, EIGEN_SOLVER_EPS, EIGEN_SOLVER_MAX_ITERATIONS)
            .ok_or_else(|| {
                TrainerError::Numerical(format!(
                    "eigen-decomposition of {n}x{n} covariance proxy did not converge"
                ))
            })?;
        if eigen.eigenvalues.iter().any(|v| !v.is_finite())
            || eigen.eigenvectors.iter().any(|v| !v.is_finite())
        {
            return Err(TrainerError::Numerical(
                "eigen-decomposition produced non-finite values".into(),
            ));
        }

        progress.report(Progress::Stage(TrainingStage::SortingEigenvectors));
        // Stable sort: equal eigenvalues keep the solver's order.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));
        let v_sorted = Array2::from_shape_fn((n, n), |(row, col)| eigen.eigenvectors[(row, order[col])]);
        let u = a.dot(&v_sorted);

        progress.report(Progress::Stage(TrainingStage::ExtractingEigenvalues));
        let denom = (n - 1) as f64;
        let values: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i] / denom).collect();

        progress.report(Progress::Stage(TrainingStage::NormalizingEigenvectors));
        let retained: Vec<usize> = (0..n)
            .filter(|&i| values[i] >= self.eigenvalue_threshold)
            .collect();
        let k = retained.len();

        let mut eigenvectors = Array2::<f64>::zeros((p, k));
        for (dst, &src) in retained.iter().enumerate() {
            let column = u.column(src);
            let norm = column.dot(&column).sqrt();
            if !norm.is_finite() || norm <= 0.0 {
                return Err(TrainerError::Numerical(format!(
                    "eigenvector {src} has degenerate norm {norm}"
                )));
            }
            eigenvectors.column_mut(dst).assign(&(&column / norm));
        }
        let eigenvalues = Array1::from_iter(retained.iter().map(|&i| values[i]));

        progress.report(Progress::Finished);

        tracing::info!(
            samples = n,
            width,
            height,
            retained = k,
            discarded = n - k,
            leading_eigenvalue = eigenvalues.get(0).copied().unwrap_or(0.0),
            "trained eigenspace"
        );

        Ok(Eigenspace {
            width,
            height,
            mean_face,
            eigenvectors,
            eigenvalues,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use std::sync::mpsc;

    /// Deterministic pseudo-random raster (LCG), values in 0..256.
    pub(crate) fn noise_raster(width: u32, height: u32, seed: u64) -> GrayRaster {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let pixels = (0..width * height)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) % 256) as f64
            })
            .collect();
        GrayRaster::new(width, height, pixels).unwrap()
    }

    fn noise_set(count: u64) -> Vec<GrayRaster> {
        (0..count).map(|seed| noise_raster(8, 6, seed + 1)).collect()
    }

    #[test]
    fn test_insufficient_data() {
        let one = noise_set(1);
        let err = EigenspaceTrainer::new().train(&one, &NoProgress).unwrap_err();
        assert!(matches!(err, TrainerError::InsufficientData(1)));

        let none: Vec<GrayRaster> = Vec::new();
        let err = EigenspaceTrainer::new().train(&none, &NoProgress).unwrap_err();
        assert!(matches!(err, TrainerError::InsufficientData(0)));
    }

    #[test]
    fn test_dimension_mismatch() {
        let rasters = vec![noise_raster(8, 6, 1), noise_raster(8, 6, 2), noise_raster(6, 8, 3)];
        let err = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap_err();
        match err {
            TrainerError::DimensionMismatch { index, expected, actual } => {
                assert_eq!(index, 2);
                assert_eq!(expected, (8, 6));
                assert_eq!(actual, (6, 8));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_finite_pixels_rejected() {
        let mut pixels = vec![1.0; 48];
        pixels[5] = f64::NAN;
        let rasters = vec![noise_raster(8, 6, 1), GrayRaster::new(8, 6, pixels).unwrap()];
        let err = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap_err();
        assert!(matches!(err, TrainerError::Numerical(_)));
    }

    #[test]
    fn test_identical_images_mean_equals_image() {
        let image = noise_raster(8, 6, 42);
        let rasters = vec![image.clone(), image.clone(), image.clone()];
        let space = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap();

        for (m, p) in space.mean_face().iter().zip(image.pixels()) {
            assert!((m - p).abs() < 1e-9, "mean {m} != pixel {p}");
        }
        // No variance at all: nothing survives the eigenvalue threshold.
        assert_eq!(space.rank(), 0);
        assert_eq!(space.eigenvectors().dim(), (48, 0));
    }

    #[test]
    fn test_eigenvectors_orthonormal() {
        let rasters = noise_set(5);
        let space = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap();
        let vecs = space.eigenvectors();
        assert_eq!(space.rank(), 4);

        for i in 0..space.rank() {
            for j in 0..space.rank() {
                let dot = vecs.column(i).dot(&vecs.column(j));
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-8, "v{i}·v{j} = {dot}");
            }
        }
    }

    #[test]
    fn test_eigenvalues_descending_positive() {
        let rasters = noise_set(6);
        let space = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap();
        let values = space.eigenvalues();
        assert!(values.iter().all(|&v| v >= EIGENVALUE_THRESHOLD));
        for pair in values.as_slice().unwrap().windows(2) {
            assert!(pair[0] >= pair[1], "{} < {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_eigenvalues_sum_to_total_variance() {
        let rasters = noise_set(5);
        let space = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap();

        let mean = space.mean_face();
        let total: f64 = rasters
            .iter()
            .map(|r| {
                r.pixels()
                    .iter()
                    .zip(mean.iter())
                    .map(|(p, m)| (p - m).powi(2))
                    .sum::<f64>()
            })
            .sum::<f64>()
            / 4.0;
        let sum = space.eigenvalues().sum();
        assert!((sum - total).abs() / total < 1e-9, "sum {sum} vs total {total}");
    }

    #[test]
    fn test_eigenvectors_live_in_image_space() {
        let rasters = noise_set(4);
        let space = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap();
        assert_eq!(space.pixel_count(), 48);
        assert_eq!(space.eigenvectors().nrows(), 48);
        assert_eq!(space.eigenvectors().ncols(), space.rank());
    }

    #[test]
    fn test_progress_stages_in_order() {
        let (tx, rx) = mpsc::channel::<Progress>();
        let rasters = noise_set(3);
        EigenspaceTrainer::new().train(&rasters, &tx).unwrap();

        let events: Vec<Progress> = rx.try_iter().collect();
        let mut expected: Vec<Progress> = TrainingStage::ALL.iter().copied().map(Progress::Stage).collect();
        expected.push(Progress::Finished);
        assert_eq!(events, expected);
    }

    #[test]
    fn test_average_face_raster() {
        let a = GrayRaster::filled(4, 3, 10.0);
        let b = GrayRaster::filled(4, 3, 30.0);
        let space = EigenspaceTrainer::new().train([&a, &b], &NoProgress).unwrap();
        let avg = space.average_face();
        assert_eq!((avg.width(), avg.height()), (4, 3));
        assert!(avg.pixels().iter().all(|&v| (v - 20.0).abs() < 1e-9));
    }

    #[test]
    fn test_eigenface_display_range() {
        let rasters = noise_set(4);
        let space = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap();
        let face = space.eigenface(0).unwrap();
        let min = face.pixels().iter().copied().fold(f64::INFINITY, f64::min);
        let max = face.pixels().iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(min.abs() < 1e-9);
        assert!((max - 255.0).abs() < 1e-9);
        assert!(space.eigenface(space.rank()).is_none());
    }

    #[test]
    fn test_threshold_override_discards_weak_components() {
        let rasters = noise_set(5);
        let full = EigenspaceTrainer::new().train(&rasters, &NoProgress).unwrap();
        let cut = full.eigenvalues()[1];
        let trimmed = EigenspaceTrainer::new()
            .with_eigenvalue_threshold(cut)
            .train(&rasters, &NoProgress)
            .unwrap();
        assert_eq!(trimmed.rank(), 2);
    }
}
