//! The NRRD header model: parsing and serialization of the text block
//! that precedes the sample data in an attached `.nrrd` file.
//!
//! Fields that this crate does not interpret are kept verbatim (see
//! [`NrrdHeader::extras`] and [`NrrdHeader::key_values`]) so that a loaded
//! header survives a save round trip.

use std::collections::BTreeMap;
use std::io::BufRead;

use byteordered::Endianness;
use tracing::trace;

use crate::element::NrrdType;
use crate::error::{MedVolError, Result};

/// Magic written at the top of every produced file.
const MAGIC_OUT: &str = "NRRD0004";

/// Sample data encodings understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrrdEncoding {
    /// Samples stored directly as binary.
    Raw,
    /// Samples compressed as one gzip stream.
    Gzip,
}

/// An attached NRRD header.
///
/// All fields are public, named after the format definition. Optional
/// fields that were absent from a parsed header stay `None` and are
/// omitted again on write.
#[derive(Debug, Clone, PartialEq)]
pub struct NrrdHeader {
    /// Axis sizes, fastest-varying axis first.
    pub sizes: Vec<usize>,
    /// Sample type (the `type` field).
    pub datatype: NrrdType,
    /// Sample data encoding.
    pub encoding: NrrdEncoding,
    /// Byte order of the sample data. Ignored for single-byte types.
    pub endianness: Endianness,
    /// Explicit `space dimension` field.
    pub space_dimension: Option<usize>,
    /// Named `space` field (e.g. `left-posterior-superior`), kept verbatim.
    pub space: Option<String>,
    /// One world-space vector per axis; `None` entries are non-spatial
    /// (`none` in the file). Each vector is the physical step of one index
    /// increment along that axis, i.e. direction times spacing.
    pub space_directions: Option<Vec<Option<Vec<f64>>>>,
    /// World-space coordinate of the first sample.
    pub space_origin: Option<Vec<f64>>,
    /// Per-world-axis unit names.
    pub space_units: Option<Vec<String>>,
    /// Per-axis kind descriptors.
    pub kinds: Option<Vec<String>>,
    /// Free-text content description.
    pub content: Option<String>,
    /// Fields this crate does not interpret, passed through verbatim.
    pub extras: BTreeMap<String, String>,
    /// Custom `key:=value` pairs, passed through verbatim.
    pub key_values: BTreeMap<String, String>,
}

impl NrrdHeader {
    /// Read and parse a header, leaving the source positioned at the
    /// first byte of the sample data.
    pub fn from_reader<R: BufRead>(src: &mut R) -> Result<NrrdHeader> {
        let magic = read_header_line(src)?
            .ok_or_else(|| MedVolError::InvalidFormat("empty file".into()))?;
        if !is_valid_magic(&magic) {
            return Err(MedVolError::InvalidFormat(format!(
                "not an NRRD file (bad magic {:?})",
                magic
            )));
        }

        let mut dimension: Option<usize> = None;
        let mut sizes: Option<Vec<usize>> = None;
        let mut datatype: Option<NrrdType> = None;
        let mut encoding: Option<NrrdEncoding> = None;
        let mut endianness: Option<Endianness> = None;
        let mut header = NrrdHeader {
            sizes: Vec::new(),
            datatype: NrrdType::UInt8,
            encoding: NrrdEncoding::Raw,
            endianness: Endianness::Little,
            space_dimension: None,
            space: None,
            space_directions: None,
            space_origin: None,
            space_units: None,
            kinds: None,
            content: None,
            extras: BTreeMap::new(),
            key_values: BTreeMap::new(),
        };

        loop {
            let line = match read_header_line(src)? {
                Some(line) => line,
                None => {
                    return Err(MedVolError::InvalidFormat(
                        "unexpected end of file inside NRRD header".into(),
                    ))
                }
            };
            if line.is_empty() {
                break;
            }
            if line.starts_with('#') {
                continue;
            }
            if let Some(idx) = line.find(":=") {
                let (key, value) = line.split_at(idx);
                header
                    .key_values
                    .insert(key.to_owned(), value[2..].to_owned());
                continue;
            }
            let idx = line.find(':').ok_or_else(|| {
                MedVolError::InvalidFormat(format!("malformed NRRD header line: {:?}", line))
            })?;
            let field = line[..idx].trim().to_ascii_lowercase();
            let value = line[idx + 1..].trim();
            match field.as_str() {
                "dimension" => dimension = Some(parse_scalar(value, "dimension")?),
                "sizes" => sizes = Some(parse_size_list(value)?),
                "type" => {
                    datatype = Some(NrrdType::from_descriptor(value).ok_or_else(|| {
                        MedVolError::InvalidFormat(format!("unknown sample type {:?}", value))
                    })?)
                }
                "encoding" => encoding = Some(parse_encoding(value)?),
                "endian" => endianness = Some(parse_endian(value)?),
                "space" => header.space = Some(value.to_owned()),
                "space dimension" => {
                    header.space_dimension = Some(parse_scalar(value, "space dimension")?)
                }
                "space directions" => {
                    header.space_directions = Some(parse_direction_list(value)?)
                }
                "space origin" => header.space_origin = Some(parse_vector(value)?),
                "space units" => header.space_units = Some(parse_quoted_list(value)),
                "kinds" => {
                    header.kinds =
                        Some(value.split_whitespace().map(str::to_owned).collect())
                }
                "content" => header.content = Some(value.to_owned()),
                _ => {
                    trace!(field = field.as_str(), "carrying uninterpreted NRRD field");
                    let _ = header.extras.insert(field, value.to_owned());
                }
            }
        }

        header.sizes = sizes
            .ok_or_else(|| MedVolError::InvalidFormat("missing sizes field".into()))?;
        if header.sizes.is_empty() || header.sizes.iter().any(|&s| s == 0) {
            return Err(MedVolError::InvalidFormat(
                "sizes entries must be positive".into(),
            ));
        }
        if let Some(dim) = dimension {
            if dim != header.sizes.len() {
                return Err(MedVolError::InvalidFormat(format!(
                    "dimension field says {} but sizes has {} entries",
                    dim,
                    header.sizes.len()
                )));
            }
        }
        header.datatype =
            datatype.ok_or_else(|| MedVolError::InvalidFormat("missing type field".into()))?;
        header.encoding = encoding
            .ok_or_else(|| MedVolError::InvalidFormat("missing encoding field".into()))?;
        header.endianness = endianness.unwrap_or(Endianness::Little);
        if let Some(directions) = &header.space_directions {
            if directions.len() != header.sizes.len() {
                return Err(MedVolError::InvalidFormat(format!(
                    "space directions has {} entries for {} axes",
                    directions.len(),
                    header.sizes.len()
                )));
            }
        }
        Ok(header)
    }

    /// Serialize the header, including the blank line that separates it
    /// from the sample data.
    pub fn write_to<W: std::io::Write>(&self, w: &mut W) -> Result<()> {
        writeln!(w, "{}", MAGIC_OUT)?;
        if let Some(content) = &self.content {
            writeln!(w, "content: {}", content)?;
        }
        writeln!(w, "type: {}", self.datatype.descriptor())?;
        writeln!(w, "dimension: {}", self.sizes.len())?;
        if let Some(space) = &self.space {
            writeln!(w, "space: {}", space)?;
        } else if let Some(sd) = self.space_dimension {
            writeln!(w, "space dimension: {}", sd)?;
        }
        writeln!(w, "sizes: {}", join_display(self.sizes.iter(), " "))?;
        if let Some(directions) = &self.space_directions {
            let rendered: Vec<String> = directions
                .iter()
                .map(|d| match d {
                    Some(v) => format_vector(v),
                    None => "none".to_owned(),
                })
                .collect();
            writeln!(w, "space directions: {}", rendered.join(" "))?;
        }
        if let Some(kinds) = &self.kinds {
            writeln!(w, "kinds: {}", kinds.join(" "))?;
        }
        if self.datatype.size_of() > 1 {
            let endian = match self.endianness {
                Endianness::Little => "little",
                Endianness::Big => "big",
            };
            writeln!(w, "endian: {}", endian)?;
        }
        let encoding = match self.encoding {
            NrrdEncoding::Raw => "raw",
            NrrdEncoding::Gzip => "gzip",
        };
        writeln!(w, "encoding: {}", encoding)?;
        if let Some(origin) = &self.space_origin {
            writeln!(w, "space origin: {}", format_vector(origin))?;
        }
        if let Some(units) = &self.space_units {
            let quoted: Vec<String> = units.iter().map(|u| format!("\"{}\"", u)).collect();
            writeln!(w, "space units: {}", quoted.join(" "))?;
        }
        for (field, value) in &self.extras {
            writeln!(w, "{}: {}", field, value)?;
        }
        for (key, value) in &self.key_values {
            writeln!(w, "{}:={}", key, value)?;
        }
        writeln!(w)?;
        Ok(())
    }

    /// Number of samples described by the sizes field.
    pub fn sample_count(&self) -> usize {
        self.sizes.iter().product()
    }

    /// The world-space dimension, resolved from `space dimension`, a named
    /// `space`, or the length of the first spatial direction vector.
    pub fn resolved_space_dimension(&self) -> Option<usize> {
        self.space_dimension
            .or_else(|| self.space.as_deref().and_then(named_space_dimension))
            .or_else(|| {
                self.space_directions
                    .as_ref()
                    .and_then(|dirs| dirs.iter().flatten().next().map(Vec::len))
            })
    }
}

fn is_valid_magic(line: &str) -> bool {
    line.len() == 8 && line.starts_with("NRRD000") && matches!(line.as_bytes()[7], b'1'..=b'5')
}

/// Read one header line, stripped of the line terminator. `None` at EOF.
fn read_header_line<R: BufRead>(src: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    let n = src.read_line(&mut line)?;
    if n == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        let _ = line.pop();
    }
    Ok(Some(line))
}

/// World-space dimension implied by the named spaces the format defines.
fn named_space_dimension(space: &str) -> Option<usize> {
    let out = match space.to_ascii_lowercase().as_str() {
        "right-anterior-superior" | "ras" => 3,
        "left-anterior-superior" | "las" => 3,
        "left-posterior-superior" | "lps" => 3,
        "right-anterior-superior-time" | "rast" => 4,
        "left-anterior-superior-time" | "last" => 4,
        "left-posterior-superior-time" | "lpst" => 4,
        "scanner-xyz" => 3,
        "scanner-xyz-time" => 4,
        "3d-right-handed" | "3d-left-handed" => 3,
        "3d-right-handed-time" | "3d-left-handed-time" => 4,
        _ => return None,
    };
    Some(out)
}

fn parse_scalar(value: &str, field: &str) -> Result<usize> {
    value.trim().parse().map_err(|_| {
        MedVolError::InvalidFormat(format!("malformed {} field: {:?}", field, value))
    })
}

fn parse_size_list(value: &str) -> Result<Vec<usize>> {
    value
        .split_whitespace()
        .map(|tok| {
            tok.parse()
                .map_err(|_| MedVolError::InvalidFormat(format!("malformed size entry {:?}", tok)))
        })
        .collect()
}

fn parse_encoding(value: &str) -> Result<NrrdEncoding> {
    match value {
        "raw" => Ok(NrrdEncoding::Raw),
        "gzip" | "gz" => Ok(NrrdEncoding::Gzip),
        "ascii" | "text" | "txt" | "hex" | "bzip2" | "bz2" => Err(
            MedVolError::UnsupportedOperation(format!("NRRD encoding {:?} is not supported", value)),
        ),
        _ => Err(MedVolError::InvalidFormat(format!(
            "unknown encoding {:?}",
            value
        ))),
    }
}

fn parse_endian(value: &str) -> Result<Endianness> {
    match value {
        "little" => Ok(Endianness::Little),
        "big" => Ok(Endianness::Big),
        _ => Err(MedVolError::InvalidFormat(format!(
            "unknown endian {:?}",
            value
        ))),
    }
}

/// Parse one parenthesized vector, e.g. `(1,0,0)`.
fn parse_vector(value: &str) -> Result<Vec<f64>> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(|| {
            MedVolError::InvalidFormat(format!("malformed vector {:?}", value))
        })?;
    inner
        .split(',')
        .map(|tok| {
            tok.trim().parse().map_err(|_| {
                MedVolError::InvalidFormat(format!("malformed vector component {:?}", tok))
            })
        })
        .collect()
}

/// Parse a `space directions` value: a sequence of vectors and `none`s.
fn parse_direction_list(value: &str) -> Result<Vec<Option<Vec<f64>>>> {
    let mut out = Vec::new();
    let mut rest = value.trim();
    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix("none") {
            out.push(None);
            rest = stripped.trim_start();
        } else if rest.starts_with('(') {
            let end = rest.find(')').ok_or_else(|| {
                MedVolError::InvalidFormat("unterminated vector in space directions".into())
            })?;
            out.push(Some(parse_vector(&rest[..=end])?));
            rest = rest[end + 1..].trim_start();
        } else {
            return Err(MedVolError::InvalidFormat(format!(
                "malformed space directions entry: {:?}",
                rest
            )));
        }
    }
    Ok(out)
}

/// Parse a list of double-quoted strings, e.g. `"mm" "mm" "mm"`.
fn parse_quoted_list(value: &str) -> Vec<String> {
    value
        .split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, s)| s.to_owned())
        .collect()
}

fn format_vector(v: &[f64]) -> String {
    format!("({})", join_display(v.iter(), ","))
}

fn join_display<I>(items: I, separator: &str) -> String
where
    I: Iterator,
    I::Item: std::fmt::Display,
{
    items
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}
