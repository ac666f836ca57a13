//! The NRRD side of the facade: header model, reader and writer.
//!
//! NRRD describes geometry with one world-space vector per axis (`space
//! directions`), each being direction times spacing, plus a `space
//! origin`. The functions here translate between that representation and
//! the homogeneous affine used by [`crate::MedVol`].

pub mod header;
pub(crate) mod read;
pub(crate) mod write;

pub use self::header::{NrrdEncoding, NrrdHeader};
pub(crate) use self::read::load_nrrd;
pub(crate) use self::write::write_nrrd;

use nalgebra::DMatrix;

use crate::element::Element;
use crate::error::{MedVolError, Result};
use crate::geometry;
use crate::header::{IMG_MARKER, INTENT_KEY, SEG_MARKER};

/// Build the rank-`n` affine described by a parsed header.
///
/// A world space one dimension smaller than the array rank is accepted;
/// the remaining axis (marked `none` in the file) keeps unit spacing and
/// an identity orientation, mirroring how 4D volumes with 3D metadata are
/// conventionally stored.
pub(crate) fn affine_from_header(header: &NrrdHeader, rank: usize) -> Result<DMatrix<f64>> {
    let sd = header.resolved_space_dimension().unwrap_or(rank);
    if sd != rank && sd + 1 != rank {
        return Err(MedVolError::InvalidFormat(format!(
            "cannot interpret a world space of dimension {} for a rank {} volume",
            sd, rank
        )));
    }
    let mut affine = DMatrix::<f64>::identity(rank + 1, rank + 1);
    if let Some(directions) = &header.space_directions {
        for (j, axis) in directions.iter().enumerate() {
            if let Some(vector) = axis {
                if vector.len() != sd {
                    return Err(MedVolError::InvalidFormat(format!(
                        "space direction {} has {} components for a world space of dimension {}",
                        j,
                        vector.len(),
                        sd
                    )));
                }
                for i in 0..rank {
                    affine[(i, j)] = 0.0;
                }
                for (i, &v) in vector.iter().enumerate() {
                    affine[(i, j)] = v;
                }
            }
        }
    }
    if let Some(origin) = &header.space_origin {
        if origin.len() != sd {
            return Err(MedVolError::InvalidFormat(format!(
                "space origin has {} components for a world space of dimension {}",
                origin.len(),
                sd
            )));
        }
        for (i, &v) in origin.iter().enumerate() {
            affine[(i, rank)] = v;
        }
    }
    geometry::validate_affine(&affine, rank)?;
    Ok(affine)
}

/// Whether a parsed header carries the segmentation marker.
pub(crate) fn is_seg_from_header(header: &NrrdHeader) -> bool {
    header.key_values.get(INTENT_KEY).map(String::as_str) == Some(SEG_MARKER)
}

/// Prepare the header written on save: current geometry supersedes any
/// carried fields, everything else from a previously loaded NRRD header
/// passes through.
pub(crate) fn header_for_save<T: Element>(
    affine: &DMatrix<f64>,
    carried: Option<&NrrdHeader>,
    is_seg: bool,
) -> NrrdHeader {
    let n = affine.nrows() - 1;
    let mut header = match carried {
        Some(h) => h.clone(),
        None => NrrdHeader {
            sizes: Vec::new(),
            datatype: T::NRRD_TYPE,
            encoding: NrrdEncoding::Gzip,
            endianness: byteordered::Endianness::Little,
            space_dimension: None,
            space: None,
            space_directions: None,
            space_origin: None,
            space_units: None,
            kinds: None,
            content: None,
            extras: Default::default(),
            key_values: Default::default(),
        },
    };

    // The carried space description only survives if it still matches the
    // rank the geometry is written with.
    if header.resolved_space_dimension() != Some(n) {
        header.space = None;
        header.space_units = None;
    }
    header.space_dimension = if header.space.is_some() { None } else { Some(n) };
    let linear = geometry::linear_of(affine);
    header.space_directions = Some(
        (0..n)
            .map(|j| Some((0..n).map(|i| linear[(i, j)]).collect()))
            .collect(),
    );
    header.space_origin = Some(geometry::origin_of(affine).iter().cloned().collect());
    if header
        .kinds
        .as_ref()
        .map(|k| k.len() != n)
        .unwrap_or(true)
    {
        header.kinds = Some(vec!["domain".to_owned(); n]);
    }
    let _ = header.key_values.insert(
        INTENT_KEY.to_owned(),
        if is_seg { SEG_MARKER } else { IMG_MARKER }.to_owned(),
    );
    header
}
