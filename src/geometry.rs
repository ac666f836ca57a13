//! Conversions between a volume's homogeneous voxel-to-world transform
//! and its direction / spacing / origin constituents.
//!
//! The affine of a rank `n` volume is the `(n+1)×(n+1)` matrix whose linear
//! block is `direction · diag(spacing)`, whose last column carries the
//! origin, and whose bottom row is homogeneous. The inverse mapping reads
//! spacing as the Euclidean norms of the linear block's columns and the
//! direction as the normalized columns.
//!
//! The rotation/scale/shear view of the linear block `L` uses a single
//! fixed convention, applied in both directions:
//!
//! ```text
//! L = rotation · diag(scale) · shear
//! ```
//!
//! obtained from the QR decomposition of `L`, with the signs of the
//! triangular factor's diagonal absorbed into the orthogonal factor so
//! that `scale` is always positive. `rotation` is orthogonal but may carry
//! a reflection (common for flipped anatomical axes), and `shear` is unit
//! upper triangular. For an orthonormal direction matrix, `scale` equals
//! the spacing and `shear` is the identity.

use nalgebra::{DMatrix, DVector};

use crate::error::{MedVolError, Result};

/// Tolerance for validating the homogeneous bottom row of an affine.
const HOMOGENEOUS_EPS: f64 = 1e-9;

/// Below this determinant magnitude a linear block is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// Tolerance for validating orthogonality and unit-triangularity.
const FACTOR_EPS: f64 = 1e-8;

/// Build the homogeneous affine from direction cosines, spacing and origin.
///
/// The three inputs must agree in rank; the public volume API validates
/// them before composing.
pub fn compose(
    direction: &DMatrix<f64>,
    spacing: &DVector<f64>,
    origin: &DVector<f64>,
) -> DMatrix<f64> {
    let n = spacing.len();
    let mut affine = DMatrix::<f64>::identity(n + 1, n + 1);
    for j in 0..n {
        for i in 0..n {
            affine[(i, j)] = direction[(i, j)] * spacing[j];
        }
        affine[(j, n)] = origin[j];
    }
    affine
}

/// Split an affine into `(direction, spacing, origin)`.
///
/// Returns [`MedVolError::Geometry`] when the matrix is not a valid
/// homogeneous affine or when a column of the linear block has zero norm
/// (spacing would be ill-defined).
pub fn decompose(affine: &DMatrix<f64>) -> Result<(DMatrix<f64>, DVector<f64>, DVector<f64>)> {
    let n = rank_of(affine)?;
    validate_affine(affine, n)?;
    Ok((direction_of(affine), spacing_of(affine), origin_of(affine)))
}

/// Decompose a linear block as `rotation · diag(scale) · shear`.
///
/// The input is expected to be invertible; matrices held by a volume
/// always are. A singular input yields zero entries in `scale` and an
/// incomplete `shear` rather than an error.
pub fn rotation_scale_shear(linear: &DMatrix<f64>) -> (DMatrix<f64>, DVector<f64>, DMatrix<f64>) {
    let n = linear.nrows();
    let (mut q, mut r) = linear.clone().qr().unpack();
    // Absorb negative diagonal entries of R into Q so the scale is positive.
    for i in 0..n {
        if r[(i, i)] < 0.0 {
            for k in 0..n {
                q[(k, i)] = -q[(k, i)];
                r[(i, k)] = -r[(i, k)];
            }
        }
    }
    let scale = DVector::from_iterator(n, (0..n).map(|i| r[(i, i)]));
    let mut shear = DMatrix::<f64>::identity(n, n);
    for i in 0..n {
        if scale[i] != 0.0 {
            for k in i + 1..n {
                shear[(i, k)] = r[(i, k)] / scale[i];
            }
        }
    }
    (q, scale, shear)
}

/// Rank of the volume described by an affine, i.e. its side length minus 1.
pub(crate) fn rank_of(affine: &DMatrix<f64>) -> Result<usize> {
    if affine.nrows() != affine.ncols() || affine.nrows() < 2 {
        return Err(MedVolError::Geometry(format!(
            "affine must be a square homogeneous matrix, got {}x{}",
            affine.nrows(),
            affine.ncols()
        )));
    }
    Ok(affine.nrows() - 1)
}

/// Check that `affine` is a well-formed, decomposable transform of rank `n`.
pub(crate) fn validate_affine(affine: &DMatrix<f64>, n: usize) -> Result<()> {
    if affine.nrows() != n + 1 || affine.ncols() != n + 1 {
        return Err(MedVolError::ShapeMismatch(format!(
            "affine for a rank {} volume must be {}x{}, got {}x{}",
            n,
            n + 1,
            n + 1,
            affine.nrows(),
            affine.ncols()
        )));
    }
    for j in 0..=n {
        let expected = if j == n { 1.0 } else { 0.0 };
        if (affine[(n, j)] - expected).abs() > HOMOGENEOUS_EPS {
            return Err(MedVolError::Geometry(
                "affine bottom row must be homogeneous (0, ..., 0, 1)".into(),
            ));
        }
    }
    for v in affine.iter() {
        if !v.is_finite() {
            return Err(MedVolError::Geometry(
                "affine entries must be finite".into(),
            ));
        }
    }
    let linear = linear_of(affine);
    for j in 0..n {
        if linear.column(j).norm() == 0.0 {
            return Err(MedVolError::Geometry(format!(
                "column {} of the affine has zero norm, spacing is undefined",
                j
            )));
        }
    }
    if !is_invertible(&linear) {
        return Err(MedVolError::Geometry(
            "affine linear block is not invertible".into(),
        ));
    }
    Ok(())
}

/// Validate a spacing-like slice (positive, finite) against the volume rank.
pub(crate) fn spacing_vector(values: &[f64], n: usize, field: &str) -> Result<DVector<f64>> {
    if values.len() != n {
        return Err(MedVolError::ShapeMismatch(format!(
            "{} must have {} entries for a rank {} volume, got {}",
            field,
            n,
            n,
            values.len()
        )));
    }
    for &v in values {
        if !(v.is_finite() && v > 0.0) {
            return Err(MedVolError::Geometry(format!(
                "{} entries must be positive and finite, got {}",
                field, v
            )));
        }
    }
    Ok(DVector::from_column_slice(values))
}

/// Validate an origin-like slice (finite) against the volume rank.
pub(crate) fn origin_vector(values: &[f64], n: usize, field: &str) -> Result<DVector<f64>> {
    if values.len() != n {
        return Err(MedVolError::ShapeMismatch(format!(
            "{} must have {} entries for a rank {} volume, got {}",
            field,
            n,
            n,
            values.len()
        )));
    }
    for &v in values {
        if !v.is_finite() {
            return Err(MedVolError::Geometry(format!(
                "{} entries must be finite, got {}",
                field, v
            )));
        }
    }
    Ok(DVector::from_column_slice(values))
}

/// Validate a direction matrix and normalize its columns.
///
/// Column magnitudes belong to the spacing; a direction set through the
/// public API only contributes orientations.
pub(crate) fn direction_matrix(matrix: &DMatrix<f64>, n: usize) -> Result<DMatrix<f64>> {
    if matrix.nrows() != matrix.ncols() {
        return Err(MedVolError::Geometry(format!(
            "direction must be a square matrix, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    if matrix.nrows() != n {
        return Err(MedVolError::ShapeMismatch(format!(
            "direction for a rank {} volume must be {}x{}, got {}x{}",
            n,
            n,
            n,
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    let mut normalized = matrix.clone();
    for j in 0..n {
        let norm = normalized.column(j).norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(MedVolError::Geometry(format!(
                "direction column {} must have a finite, non-zero norm",
                j
            )));
        }
        for i in 0..n {
            normalized[(i, j)] /= norm;
        }
    }
    if !is_invertible(&normalized) {
        return Err(MedVolError::Geometry(
            "direction matrix is not invertible".into(),
        ));
    }
    Ok(normalized)
}

/// Validate an orthogonal rotation factor.
pub(crate) fn rotation_matrix(matrix: &DMatrix<f64>, n: usize) -> Result<DMatrix<f64>> {
    if matrix.nrows() != matrix.ncols() {
        return Err(MedVolError::Geometry(format!(
            "rotation must be a square matrix, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    if matrix.nrows() != n {
        return Err(MedVolError::ShapeMismatch(format!(
            "rotation for a rank {} volume must be {}x{}, got {}x{}",
            n,
            n,
            n,
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    let gram = matrix.transpose() * matrix;
    let identity = DMatrix::<f64>::identity(n, n);
    if (gram - identity).norm() > FACTOR_EPS {
        return Err(MedVolError::Geometry(
            "rotation matrix must be orthogonal".into(),
        ));
    }
    Ok(matrix.clone())
}

/// Validate a unit upper-triangular shear factor.
pub(crate) fn shear_matrix(matrix: &DMatrix<f64>, n: usize) -> Result<DMatrix<f64>> {
    if matrix.nrows() != matrix.ncols() {
        return Err(MedVolError::Geometry(format!(
            "shear must be a square matrix, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    if matrix.nrows() != n {
        return Err(MedVolError::ShapeMismatch(format!(
            "shear for a rank {} volume must be {}x{}, got {}x{}",
            n,
            n,
            n,
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    for i in 0..n {
        if (matrix[(i, i)] - 1.0).abs() > FACTOR_EPS {
            return Err(MedVolError::Geometry(
                "shear matrix must have a unit diagonal".into(),
            ));
        }
        for j in 0..i {
            if matrix[(i, j)].abs() > FACTOR_EPS {
                return Err(MedVolError::Geometry(
                    "shear matrix must be upper triangular".into(),
                ));
            }
        }
    }
    Ok(matrix.clone())
}

pub(crate) fn is_invertible(linear: &DMatrix<f64>) -> bool {
    linear.determinant().abs() > SINGULAR_EPS
}

/// The linear (non-translation) block of an affine.
pub(crate) fn linear_of(affine: &DMatrix<f64>) -> DMatrix<f64> {
    let n = affine.nrows() - 1;
    DMatrix::from_fn(n, n, |i, j| affine[(i, j)])
}

pub(crate) fn spacing_of(affine: &DMatrix<f64>) -> DVector<f64> {
    let n = affine.nrows() - 1;
    DVector::from_iterator(
        n,
        (0..n).map(|j| {
            let mut sum = 0.0;
            for i in 0..n {
                sum += affine[(i, j)] * affine[(i, j)];
            }
            sum.sqrt()
        }),
    )
}

pub(crate) fn direction_of(affine: &DMatrix<f64>) -> DMatrix<f64> {
    let n = affine.nrows() - 1;
    let spacing = spacing_of(affine);
    DMatrix::from_fn(n, n, |i, j| affine[(i, j)] / spacing[j])
}

pub(crate) fn origin_of(affine: &DMatrix<f64>) -> DVector<f64> {
    let n = affine.nrows() - 1;
    DVector::from_iterator(n, (0..n).map(|i| affine[(i, n)]))
}
