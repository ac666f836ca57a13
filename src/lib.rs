//! A unified facade over medical volume files.
//!
//! This crate wraps the NIfTI-1 and NRRD file formats behind one type,
//! [`MedVol`]: a voxel array of rank 2 to 4 together with its world-space
//! geometry (spacing, origin, direction cosines and the composed affine)
//! and the raw format-native header. Volumes load from and save to either
//! format, selected by file extension, and geometry stays consistent under
//! mutation because the affine is the single canonical representation.
//!
//! NIfTI parsing and serialization are delegated to the `nifti` crate; the
//! NRRD codec (attached headers, `raw` and `gzip` encodings) lives in
//! [`nrrd`].
//!
//! # Example
//!
//! ```no_run
//! use medvol::MedVol;
//! # use medvol::Result;
//!
//! # fn run() -> Result<()> {
//! let mut volume = MedVol::<f32>::open("t1.nii.gz")?;
//! println!("shape   {:?}", volume.shape());
//! println!("spacing {}", volume.spacing());
//! println!("affine  {}", volume.affine());
//!
//! volume.set_origin(&[0.0, 0.0, 0.0])?;
//! volume.save("t1.nrrd")?;
//! # Ok(())
//! # }
//! ```
#![deny(missing_debug_implementations)]
#![warn(missing_docs)]

pub mod element;
pub mod error;
pub mod format;
pub mod geometry;
pub mod header;
pub mod nrrd;
pub mod volume;

mod nifti_io;

pub use crate::element::{Element, NrrdType};
pub use crate::error::{MedVolError, Result};
pub use crate::format::Format;
pub use crate::header::VolumeHeader;
pub use crate::nrrd::{NrrdEncoding, NrrdHeader};
pub use crate::volume::{MedVol, MedVolBuilder};
