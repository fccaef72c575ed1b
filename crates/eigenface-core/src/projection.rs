//! Projection of face rasters onto a trained eigenspace.

use crate::eigenspace::Eigenspace;
use crate::types::GrayRaster;
use ndarray::{s, Array1};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("raster is {}x{}, eigenspace was trained on {}x{}", .actual.0, .actual.1, .expected.0, .expected.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("expected at most {rank} coefficients, got {actual}")]
    TooManyCoefficients { rank: usize, actual: usize },
}

fn check_size(image: &GrayRaster, space: &Eigenspace) -> Result<(), ProjectionError> {
    if image.width() != space.width() || image.height() != space.height() {
        return Err(ProjectionError::DimensionMismatch {
            expected: (space.width(), space.height()),
            actual: (image.width(), image.height()),
        });
    }
    Ok(())
}

/// Feature coefficients of `image` on the first `k` eigenfaces.
///
/// `k` is clamped to the eigenspace rank.
pub fn project(image: &GrayRaster, space: &Eigenspace, k: usize) -> Result<Vec<f64>, ProjectionError> {
    check_size(image, space)?;
    let k = k.min(space.rank());

    let centred = image.to_vector() - space.mean_face();
    let basis = space.eigenvectors().slice(s![.., ..k]);
    Ok(basis.t().dot(&centred).to_vec())
}

/// Rebuild a flattened face from its coefficients: `mean + U·c`.
pub fn reconstruct(coefficients: &[f64], space: &Eigenspace) -> Result<Array1<f64>, ProjectionError> {
    let k = coefficients.len();
    if k > space.rank() {
        return Err(ProjectionError::TooManyCoefficients {
            rank: space.rank(),
            actual: k,
        });
    }
    let basis = space.eigenvectors().slice(s![.., ..k]);
    let coefficients = Array1::from_vec(coefficients.to_vec());
    Ok(space.mean_face() + &basis.dot(&coefficients))
}

/// L2 distance between `image` and its `k`-component reconstruction.
pub fn reconstruction_error(image: &GrayRaster, space: &Eigenspace, k: usize) -> Result<f64, ProjectionError> {
    let coefficients = project(image, space, k)?;
    let rebuilt = reconstruct(&coefficients, space)?;
    let residual = image.to_vector() - rebuilt;
    Ok(residual.dot(&residual).sqrt())
}
