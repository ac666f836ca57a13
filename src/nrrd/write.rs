//! Utility functions to write NRRD images.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteordered::{ByteOrdered, Endianness};
use either::Either;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{ArrayBase, Data, Dimension};
use tracing::debug;

use crate::element::Element;
use crate::error::Result;
use crate::nrrd::header::{NrrdEncoding, NrrdHeader};

/// Write an NRRD file (`.nrrd`, attached header).
///
/// The header's `sizes`, `type` and `endian` fields are overridden from
/// `data`; every other field is written as given. The header block is
/// always plain text, only the sample data after it is subject to the
/// header's encoding. Samples go out little endian, fastest-varying axis
/// first, as the format expects.
pub fn write_nrrd<T, S, D, P>(path: P, data: &ArrayBase<S, D>, header: &NrrdHeader) -> Result<()>
where
    T: Element,
    S: Data<Elem = T>,
    D: Dimension,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut header = header.clone();
    header.sizes = data.shape().to_vec();
    header.datatype = T::NRRD_TYPE;
    header.endianness = Endianness::Little;

    debug!(
        path = %path.display(),
        datatype = header.datatype.descriptor(),
        "writing NRRD volume"
    );

    let mut writer = BufWriter::new(File::create(path)?);
    header.write_to(&mut writer)?;

    let sink = match header.encoding {
        NrrdEncoding::Gzip => Either::Left(GzEncoder::new(writer, Compression::default())),
        NrrdEncoding::Raw => Either::Right(writer),
    };
    let mut sink = ByteOrdered::le(sink);
    write_samples(&mut sink, data)?;
    match sink.into_inner() {
        Either::Left(encoder) => {
            let mut writer = encoder.finish()?;
            writer.flush()?;
        }
        Either::Right(mut writer) => writer.flush()?,
    }
    Ok(())
}

fn write_samples<T, S, D, W, E>(dst: &mut ByteOrdered<W, E>, data: &ArrayBase<S, D>) -> Result<()>
where
    T: Element,
    S: Data<Elem = T>,
    D: Dimension,
    W: Write,
    E: byteordered::Endian,
{
    // The transposed view iterates with the first axis fastest, which is
    // the on-disk sample order.
    for sample in data.t().iter() {
        (*sample).write_sample(dst)?;
    }
    Ok(())
}
