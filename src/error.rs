//! Error types.

use std::io::Error as IoError;
use std::path::PathBuf;

use nifti::error::NiftiError;
use quick_error::quick_error;

quick_error! {
    /// Error type for all operations on a medical volume.
    #[derive(Debug)]
    pub enum MedVolError {
        /// The file extension matches neither supported format.
        UnsupportedFormat(path: PathBuf) {
            display("unrecognized image format: {}", path.display())
        }
        /// Array rank outside 2..=4, or a metadata field whose length
        /// disagrees with the array rank.
        ShapeMismatch(detail: String) {
            display("shape mismatch: {}", detail)
        }
        /// Non-invertible or otherwise malformed direction/affine input.
        Geometry(detail: String) {
            display("invalid geometry: {}", detail)
        }
        /// The requested operation cannot be represented by the target
        /// format's writer.
        UnsupportedOperation(detail: String) {
            display("unsupported operation: {}", detail)
        }
        /// Malformed file contents.
        InvalidFormat(detail: String) {
            display("invalid file contents: {}", detail)
        }
        /// Error propagated from the NIfTI reader/writer.
        Nifti(err: NiftiError) {
            from()
            source(err)
            display("{}", err)
        }
        /// I/O error.
        Io(err: IoError) {
            from()
            source(err)
            display("I/O error: {}", err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, MedVolError>;
