//! File-format selection by path extension.

use std::path::Path;

use crate::error::{MedVolError, Result};

/// The two on-disk formats understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// NIfTI-1, `.nii` or `.nii.gz`
    Nifti,
    /// NRRD with an attached header, `.nrrd`
    Nrrd,
}

impl Format {
    /// Determine the format from a path's extension, ASCII case insensitive.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Format> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Ok(Format::Nifti)
        } else if name.ends_with(".nrrd") {
            Ok(Format::Nrrd)
        } else {
            Err(MedVolError::UnsupportedFormat(path.to_path_buf()))
        }
    }
}
