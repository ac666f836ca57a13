//! Reading NRRD volumes into `ndarray` arrays.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use byteordered::ByteOrdered;
use flate2::bufread::GzDecoder;
use ndarray::{Array, IxDyn, ShapeBuilder};
use num_traits::cast;
use tracing::debug;

use crate::element::{Element, NrrdType};
use crate::error::{MedVolError, Result};
use crate::nrrd::header::{NrrdEncoding, NrrdHeader};

/// Load an attached NRRD file into an array of `T` and its header.
///
/// Samples are converted to `T` when the file stores a different type;
/// a stored value that `T` cannot represent is an error rather than a
/// silent wrap-around.
pub fn load_nrrd<T, P>(path: P) -> Result<(Array<T, IxDyn>, NrrdHeader)>
where
    T: Element,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let header = NrrdHeader::from_reader(&mut reader)?;
    debug!(
        path = %path.display(),
        datatype = header.datatype.descriptor(),
        "reading NRRD volume"
    );
    let data = match header.encoding {
        NrrdEncoding::Raw => read_samples::<T, _>(reader, &header)?,
        NrrdEncoding::Gzip => {
            read_samples::<T, _>(BufReader::new(GzDecoder::new(reader)), &header)?
        }
    };
    let array = Array::from_shape_vec(IxDyn(&header.sizes).f(), data)
        .map_err(|e| MedVolError::InvalidFormat(format!("sample count mismatch: {}", e)))?;
    Ok((array, header))
}

/// Decode `header.sample_count()` samples from `src`, converting from the
/// stored type to `T`.
fn read_samples<T, R>(src: R, header: &NrrdHeader) -> Result<Vec<T>>
where
    T: Element,
    R: BufRead,
{
    let count = header.sample_count();
    let endianness = header.endianness;

    macro_rules! decode {
        ($s:ty) => {{
            let mut src = ByteOrdered::runtime(src, endianness);
            let mut out = Vec::with_capacity(count);
            for _ in 0..count {
                let sample = <$s as Element>::read_sample(&mut src)?;
                out.push(convert_sample::<$s, T>(sample)?);
            }
            out
        }};
    }

    let out = match header.datatype {
        NrrdType::Int8 => decode!(i8),
        NrrdType::UInt8 => decode!(u8),
        NrrdType::Int16 => decode!(i16),
        NrrdType::UInt16 => decode!(u16),
        NrrdType::Int32 => decode!(i32),
        NrrdType::UInt32 => decode!(u32),
        NrrdType::Int64 => decode!(i64),
        NrrdType::UInt64 => decode!(u64),
        NrrdType::Float => decode!(f32),
        NrrdType::Double => decode!(f64),
    };
    Ok(out)
}

fn convert_sample<S, T>(sample: S) -> Result<T>
where
    S: Element,
    T: Element,
{
    cast(sample).ok_or_else(|| {
        MedVolError::InvalidFormat(format!(
            "stored sample {:?} is not representable in the requested element type",
            sample
        ))
    })
}
