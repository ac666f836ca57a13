//! The unified volume type and its construction.

use std::path::Path;

use nalgebra::{DMatrix, DVector};
use ndarray::{Array, ArrayViewMut, Dimension, IxDyn};
use tracing::debug;

use crate::element::Element;
use crate::error::{MedVolError, Result};
use crate::format::Format;
use crate::geometry;
use crate::header::VolumeHeader;
use crate::{nifti_io, nrrd};

/// A medical volume: a voxel array paired with its world-space geometry
/// and the raw header it was loaded with.
///
/// The geometry is held canonically as the homogeneous affine mapping
/// voxel indices to world coordinates. Spacing, origin, direction and the
/// rotation/scale/shear factors are derived from it on read; every setter
/// validates its input and recomposes the affine immediately, so the
/// representations can never diverge.
///
/// # Examples
///
/// Load, adjust, save:
///
/// ```no_run
/// use medvol::MedVol;
/// # use medvol::Result;
///
/// # fn run() -> Result<()> {
/// let mut volume = MedVol::<f32>::open("ct.nii.gz")?;
/// volume.set_spacing(&[2.0, 2.0, 2.0])?;
/// volume.save("ct_resampled_header.nrrd")?;
/// # Ok(())
/// # }
/// ```
///
/// Wrap an array, taking the metadata from another volume:
///
/// ```
/// use medvol::MedVol;
/// use ndarray::Array3;
/// # use medvol::Result;
///
/// # fn run() -> Result<()> {
/// let reference = MedVol::from_array(Array3::<f32>::zeros((8, 8, 4)))
///     .spacing(&[1.0, 1.0, 2.0])
///     .build()?;
/// let mask = MedVol::from_array(Array3::<f32>::ones((8, 8, 4)))
///     .copy(&reference)
///     .is_seg(true)
///     .build()?;
/// assert_eq!(mask.spacing(), reference.spacing());
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MedVol<T: Element = f32> {
    array: Array<T, IxDyn>,
    affine: DMatrix<f64>,
    header: Option<VolumeHeader>,
    is_seg: bool,
}

impl<T: Element> MedVol<T> {
    /// Load a volume from a file, choosing the reader by extension.
    ///
    /// Samples are converted to `T` as needed. Fails with
    /// [`MedVolError::UnsupportedFormat`] for unrecognized extensions and
    /// [`MedVolError::ShapeMismatch`] when the file's rank is outside
    /// 2..=4.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MedVol<T>> {
        let path = path.as_ref();
        match Format::from_path(path)? {
            Format::Nifti => {
                let (array, affine, header, is_seg) = nifti_io::load_nifti(path)?;
                Ok(MedVol {
                    array,
                    affine,
                    header: Some(VolumeHeader::Nifti(header)),
                    is_seg,
                })
            }
            Format::Nrrd => {
                let (array, header) = nrrd::load_nrrd::<T, _>(path)?;
                let rank = array.ndim();
                if !(2..=4).contains(&rank) {
                    return Err(MedVolError::ShapeMismatch(format!(
                        "volumes must have rank 2, 3 or 4, file has rank {}",
                        rank
                    )));
                }
                let affine = nrrd::affine_from_header(&header, rank)?;
                let is_seg = nrrd::is_seg_from_header(&header);
                Ok(MedVol {
                    array,
                    affine,
                    header: Some(VolumeHeader::Nrrd(header)),
                    is_seg,
                })
            }
        }
    }

    /// Start building a volume around an in-memory array.
    ///
    /// The array is moved in, never cloned. Geometry fields default to
    /// identity values, or to another volume's fields via
    /// [`MedVolBuilder::copy`]; explicit builder calls always win over
    /// copied values.
    pub fn from_array<D: Dimension>(array: Array<T, D>) -> MedVolBuilder<T> {
        MedVolBuilder {
            array: array.into_dyn(),
            spacing: None,
            origin: None,
            direction: None,
            header: None,
            is_seg: None,
            copied: None,
        }
    }

    /// Number of axes of the voxel array.
    pub fn ndim(&self) -> usize {
        self.array.ndim()
    }

    /// Axis sizes of the voxel array.
    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    /// The live voxel buffer.
    pub fn array(&self) -> &Array<T, IxDyn> {
        &self.array
    }

    /// Mutable view of the voxel buffer.
    ///
    /// Elements can be written in place; the shape stays fixed. Use
    /// [`MedVol::set_array`] to swap the buffer for another one of the
    /// same shape.
    pub fn array_mut(&mut self) -> ArrayViewMut<'_, T, IxDyn> {
        self.array.view_mut()
    }

    /// Consume the volume, keeping only the voxel buffer.
    pub fn into_array(self) -> Array<T, IxDyn> {
        self.array
    }

    /// Replace the voxel buffer with another array of the same shape.
    pub fn set_array<D: Dimension>(&mut self, array: Array<T, D>) -> Result<()> {
        let array = array.into_dyn();
        if array.shape() != self.array.shape() {
            return Err(MedVolError::ShapeMismatch(format!(
                "replacement array has shape {:?}, volume has shape {:?}",
                array.shape(),
                self.array.shape()
            )));
        }
        self.array = array;
        Ok(())
    }

    /// Physical size of one voxel along each axis.
    pub fn spacing(&self) -> DVector<f64> {
        geometry::spacing_of(&self.affine)
    }

    /// World coordinate of the first voxel.
    pub fn origin(&self) -> DVector<f64> {
        geometry::origin_of(&self.affine)
    }

    /// Unit column vectors giving each axis's orientation in world space.
    pub fn direction(&self) -> DMatrix<f64> {
        geometry::direction_of(&self.affine)
    }

    /// The homogeneous voxel-to-world transform.
    pub fn affine(&self) -> &DMatrix<f64> {
        &self.affine
    }

    /// Orthogonal factor of the linear block (may carry a reflection).
    pub fn rotation(&self) -> DMatrix<f64> {
        self.rotation_scale_shear().0
    }

    /// Positive scale factor of the linear block. Equals the spacing when
    /// the direction is orthonormal.
    pub fn scale(&self) -> DVector<f64> {
        self.rotation_scale_shear().1
    }

    /// Unit upper-triangular shear factor of the linear block.
    pub fn shear(&self) -> DMatrix<f64> {
        self.rotation_scale_shear().2
    }

    /// All three factors of the fixed `rotation · diag(scale) · shear`
    /// decomposition at once (see [`crate::geometry`]).
    pub fn rotation_scale_shear(&self) -> (DMatrix<f64>, DVector<f64>, DMatrix<f64>) {
        geometry::rotation_scale_shear(&geometry::linear_of(&self.affine))
    }

    /// The raw header the volume was loaded with, if any.
    pub fn header(&self) -> Option<&VolumeHeader> {
        self.header.as_ref()
    }

    /// Whether the volume is marked as a segmentation.
    pub fn is_seg(&self) -> bool {
        self.is_seg
    }

    /// Mark or unmark the volume as a segmentation.
    pub fn set_is_seg(&mut self, is_seg: bool) {
        self.is_seg = is_seg;
    }

    /// Set the voxel spacing, recomposing the affine immediately.
    pub fn set_spacing(&mut self, spacing: &[f64]) -> Result<()> {
        let spacing = geometry::spacing_vector(spacing, self.ndim(), "spacing")?;
        self.affine = geometry::compose(&self.direction(), &spacing, &self.origin());
        Ok(())
    }

    /// Set the world origin, recomposing the affine immediately.
    pub fn set_origin(&mut self, origin: &[f64]) -> Result<()> {
        let origin = geometry::origin_vector(origin, self.ndim(), "origin")?;
        let n = self.ndim();
        for i in 0..n {
            self.affine[(i, n)] = origin[i];
        }
        Ok(())
    }

    /// Set the direction cosines, recomposing the affine immediately.
    ///
    /// Columns are normalized; magnitudes belong to the spacing, which is
    /// left untouched.
    pub fn set_direction(&mut self, direction: &DMatrix<f64>) -> Result<()> {
        let direction = geometry::direction_matrix(direction, self.ndim())?;
        self.affine = geometry::compose(&direction, &self.spacing(), &self.origin());
        Ok(())
    }

    /// Replace the whole transform, back-decomposing into direction,
    /// spacing and origin.
    pub fn set_affine(&mut self, affine: &DMatrix<f64>) -> Result<()> {
        geometry::validate_affine(affine, self.ndim())?;
        self.affine = affine.clone();
        Ok(())
    }

    /// Replace the rotation factor, keeping scale, shear and origin.
    pub fn set_rotation(&mut self, rotation: &DMatrix<f64>) -> Result<()> {
        let rotation = geometry::rotation_matrix(rotation, self.ndim())?;
        let (_, scale, shear) = self.rotation_scale_shear();
        self.replace_linear(rotation * DMatrix::from_diagonal(&scale) * shear);
        Ok(())
    }

    /// Replace the scale factor, keeping rotation, shear and origin.
    pub fn set_scale(&mut self, scale: &[f64]) -> Result<()> {
        let scale = geometry::spacing_vector(scale, self.ndim(), "scale")?;
        let (rotation, _, shear) = self.rotation_scale_shear();
        self.replace_linear(rotation * DMatrix::from_diagonal(&scale) * shear);
        Ok(())
    }

    /// Replace the shear factor, keeping rotation, scale and origin.
    pub fn set_shear(&mut self, shear: &DMatrix<f64>) -> Result<()> {
        let shear = geometry::shear_matrix(shear, self.ndim())?;
        let (rotation, scale, _) = self.rotation_scale_shear();
        self.replace_linear(rotation * DMatrix::from_diagonal(&scale) * shear);
        Ok(())
    }

    /// Save the volume, choosing the writer by the destination extension.
    ///
    /// The volume itself is never mutated. Fails with
    /// [`MedVolError::UnsupportedFormat`] for unrecognized extensions and
    /// with [`MedVolError::UnsupportedOperation`] before anything is
    /// written when a 4D volume is directed at NIfTI, whose header cannot
    /// carry fourth-axis geometry.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        match Format::from_path(path)? {
            Format::Nifti => nifti_io::save_nifti(
                path,
                &self.array,
                &self.affine,
                self.header.as_ref().and_then(VolumeHeader::as_nifti),
                self.is_seg,
            ),
            Format::Nrrd => {
                let header = nrrd::header_for_save::<T>(
                    &self.affine,
                    self.header.as_ref().and_then(VolumeHeader::as_nrrd),
                    self.is_seg,
                );
                nrrd::write_nrrd(path, &self.array, &header)
            }
        }
    }

    fn replace_linear(&mut self, linear: DMatrix<f64>) {
        let n = self.ndim();
        for j in 0..n {
            for i in 0..n {
                self.affine[(i, j)] = linear[(i, j)];
            }
        }
    }
}

/// Builder returned by [`MedVol::from_array`].
///
/// Field resolution on [`build`](MedVolBuilder::build) is *explicit value,
/// then copied field, then default* — the pattern the facade exposes for
/// deriving one volume from another with overrides.
#[derive(Debug)]
pub struct MedVolBuilder<T: Element> {
    array: Array<T, IxDyn>,
    spacing: Option<Vec<f64>>,
    origin: Option<Vec<f64>>,
    direction: Option<DMatrix<f64>>,
    header: Option<VolumeHeader>,
    is_seg: Option<bool>,
    copied: Option<CopiedFields>,
}

#[derive(Debug)]
struct CopiedFields {
    spacing: DVector<f64>,
    origin: DVector<f64>,
    direction: DMatrix<f64>,
    header: Option<VolumeHeader>,
    is_seg: bool,
}

impl<T: Element> MedVolBuilder<T> {
    /// Voxel spacing, one positive entry per axis.
    pub fn spacing(mut self, spacing: &[f64]) -> Self {
        self.spacing = Some(spacing.to_vec());
        self
    }

    /// World coordinate of the first voxel.
    pub fn origin(mut self, origin: &[f64]) -> Self {
        self.origin = Some(origin.to_vec());
        self
    }

    /// Direction cosines; columns are normalized on build.
    pub fn direction(mut self, direction: DMatrix<f64>) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Raw header to carry.
    pub fn header(mut self, header: VolumeHeader) -> Self {
        self.header = Some(header);
        self
    }

    /// Mark the volume as a segmentation.
    pub fn is_seg(mut self, is_seg: bool) -> Self {
        self.is_seg = Some(is_seg);
        self
    }

    /// Take every field not explicitly given from `other`.
    ///
    /// The source volume may hold a different element type; only metadata
    /// is copied.
    pub fn copy<U: Element>(mut self, other: &MedVol<U>) -> Self {
        self.copied = Some(CopiedFields {
            spacing: other.spacing(),
            origin: other.origin(),
            direction: other.direction(),
            header: other.header.clone(),
            is_seg: other.is_seg,
        });
        self
    }

    /// Validate the fields and assemble the volume.
    pub fn build(self) -> Result<MedVol<T>> {
        let rank = self.array.ndim();
        if !(2..=4).contains(&rank) {
            return Err(MedVolError::ShapeMismatch(format!(
                "array rank must be 2, 3 or 4, got {}",
                rank
            )));
        }

        let spacing = if let Some(values) = &self.spacing {
            geometry::spacing_vector(values, rank, "spacing")?
        } else if let Some(copied) = &self.copied {
            geometry::spacing_vector(copied.spacing.as_slice(), rank, "copied spacing")?
        } else {
            DVector::from_element(rank, 1.0)
        };
        let origin = if let Some(values) = &self.origin {
            geometry::origin_vector(values, rank, "origin")?
        } else if let Some(copied) = &self.copied {
            geometry::origin_vector(copied.origin.as_slice(), rank, "copied origin")?
        } else {
            DVector::zeros(rank)
        };
        let direction = if let Some(matrix) = &self.direction {
            geometry::direction_matrix(matrix, rank)?
        } else if let Some(copied) = &self.copied {
            geometry::direction_matrix(&copied.direction, rank)?
        } else {
            DMatrix::identity(rank, rank)
        };

        let affine = geometry::compose(&direction, &spacing, &origin);
        let (header, copied_is_seg) = match self.copied {
            Some(copied) => (self.header.or(copied.header), copied.is_seg),
            None => (self.header, false),
        };
        let is_seg = self.is_seg.unwrap_or(copied_is_seg);

        debug!(rank, is_seg, "built volume from array");
        Ok(MedVol {
            array: self.array,
            affine,
            header,
            is_seg,
        })
    }
}
