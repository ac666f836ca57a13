//! Loading and saving through the `nifti` crate.
//!
//! NIfTI-1 stores a single 3-space transform (sform/qform). Ranks below 3
//! are projected out of it and rank 4 extends it with the time step from
//! `pixdim[4]` and `toffset` on load; on save, fourth-axis geometry has no
//! place to go, so writing a 4D volume is refused rather than silently
//! truncated.

use std::path::Path;

use nalgebra::DMatrix;
use ndarray::{Array, ArrayBase, Data, Dimension, IxDyn, RemoveAxis};
use nifti::affine::Affine4;
use nifti::object::NiftiObject;
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, ReaderOptions};
use tracing::debug;

use crate::element::Element;
use crate::error::{MedVolError, Result};
use crate::geometry;
use crate::header::{IMG_MARKER, SEG_MARKER};

/// Load a NIfTI file into an array of `T`, the rank-matched affine, the
/// raw header and the segmentation flag.
pub(crate) fn load_nifti<T: Element>(
    path: &Path,
) -> Result<(Array<T, IxDyn>, DMatrix<f64>, NiftiHeader, bool)> {
    let object = ReaderOptions::new().read_file(path)?;
    let header = object.header().clone();
    let array = object.into_volume().into_ndarray::<T>()?;
    let rank = array.ndim();
    if !(2..=4).contains(&rank) {
        return Err(MedVolError::ShapeMismatch(format!(
            "volumes must have rank 2, 3 or 4, file has rank {}",
            rank
        )));
    }
    debug!(path = %path.display(), rank, "read NIfTI volume");
    let affine = affine_from_header(&header, rank)?;
    let is_seg = seg_flag(&header);
    Ok((array, affine, header, is_seg))
}

/// Write `data` as `.nii`/`.nii.gz` with the given world transform,
/// seeding the written header from `reference` when present.
pub(crate) fn save_nifti<T, S, D>(
    path: &Path,
    data: &ArrayBase<S, D>,
    affine: &DMatrix<f64>,
    reference: Option<&NiftiHeader>,
    is_seg: bool,
) -> Result<()>
where
    T: Element,
    S: Data<Elem = T>,
    D: Dimension + RemoveAxis,
{
    let rank = data.ndim();
    if rank > 3 {
        return Err(MedVolError::UnsupportedOperation(
            "cannot save a 4D volume as NIfTI: the header transform only covers three \
             spatial axes, so fourth-axis geometry would be lost"
                .into(),
        ));
    }
    let mut header = reference.cloned().unwrap_or_default();
    header.intent_name = marker_bytes(is_seg);
    header.set_affine(&world_affine(affine, rank));
    debug!(path = %path.display(), rank, "writing NIfTI volume");
    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(data)?;
    Ok(())
}

/// Expand or project the header's 3-space transform to the array rank.
fn affine_from_header(header: &NiftiHeader, rank: usize) -> Result<DMatrix<f64>> {
    let world = header.affine::<f32>();
    let spatial = rank.min(3);
    let mut affine = DMatrix::<f64>::identity(rank + 1, rank + 1);
    for i in 0..spatial {
        for j in 0..spatial {
            affine[(i, j)] = f64::from(world[(i, j)]);
        }
        affine[(i, rank)] = f64::from(world[(i, 3)]);
    }
    if rank == 4 {
        let dt = header.pixdim[4];
        affine[(3, 3)] = if dt > 0.0 { f64::from(dt) } else { 1.0 };
        affine[(3, 4)] = f64::from(header.toffset);
    }
    // Headers without a usable qform/sform can leave zero columns behind;
    // those axes fall back to unit spacing along the index axis.
    for j in 0..rank {
        let mut norm = 0.0;
        for i in 0..rank {
            norm += affine[(i, j)] * affine[(i, j)];
        }
        if norm == 0.0 {
            affine[(j, j)] = 1.0;
        }
    }
    geometry::validate_affine(&affine, rank)?;
    Ok(affine)
}

/// Embed a rank 2 or 3 affine into the 3-space transform NIfTI stores.
fn world_affine(affine: &DMatrix<f64>, rank: usize) -> Affine4 {
    let mut world = Affine4::identity();
    let spatial = rank.min(3);
    for i in 0..spatial {
        for j in 0..spatial {
            world[(i, j)] = affine[(i, j)] as f32;
        }
        world[(i, 3)] = affine[(i, rank)] as f32;
    }
    world
}

fn marker_bytes(is_seg: bool) -> [u8; 16] {
    let marker = if is_seg { SEG_MARKER } else { IMG_MARKER };
    let mut out = [0u8; 16];
    out[..marker.len()].copy_from_slice(marker.as_bytes());
    out
}

fn seg_flag(header: &NiftiHeader) -> bool {
    let name = &header.intent_name;
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    &name[..end] == SEG_MARKER.as_bytes()
}
