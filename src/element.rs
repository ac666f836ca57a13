//! The voxel scalar API.
//!
//! [`Element`] couples the NIfTI side of a scalar type (the `nifti` crate's
//! [`DataElement`]) with its NRRD side: the `type` descriptor written to an
//! NRRD header and endian-aware sample I/O. It is implemented for the
//! integer and floating point types both formats can store.

use std::fmt::Debug;
use std::io::{Read, Result as IoResult, Write};
use std::ops::{Add, Div, Mul, Sub};

use bytemuck::Pod;
use byteordered::{ByteOrdered, Endian};
use ndarray::ScalarOperand;
use nifti::DataElement;
use num_traits::{FromPrimitive, NumCast, ToPrimitive};

/// Sample type descriptor of an NRRD file, i.e. the header's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrrdType {
    /// 8-bit signed integer
    Int8,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit signed integer
    Int16,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit signed integer
    Int32,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit signed integer
    Int64,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit floating point
    Float,
    /// 64-bit floating point
    Double,
}

impl NrrdType {
    /// Interpret a `type` field value, accepting the aliases admitted by
    /// the format definition.
    pub fn from_descriptor(descriptor: &str) -> Option<NrrdType> {
        use self::NrrdType::*;
        let out = match descriptor.trim() {
            "signed char" | "int8" | "int8_t" => Int8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => UInt8,
            "short" | "short int" | "signed short" | "signed short int" | "int16"
            | "int16_t" => Int16,
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => UInt16,
            "int" | "signed int" | "int32" | "int32_t" => Int32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => UInt32,
            "longlong" | "long long" | "long long int" | "signed long long"
            | "signed long long int" | "int64" | "int64_t" => Int64,
            "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64"
            | "uint64_t" => UInt64,
            "float" => Float,
            "double" => Double,
            _ => return None,
        };
        Some(out)
    }

    /// The canonical descriptor written to a header.
    pub fn descriptor(self) -> &'static str {
        use self::NrrdType::*;
        match self {
            Int8 => "int8",
            UInt8 => "uint8",
            Int16 => "int16",
            UInt16 => "uint16",
            Int32 => "int32",
            UInt32 => "uint32",
            Int64 => "int64",
            UInt64 => "uint64",
            Float => "float",
            Double => "double",
        }
    }

    /// Width of one sample in bytes.
    pub fn size_of(self) -> usize {
        use self::NrrdType::*;
        match self {
            Int8 | UInt8 => 1,
            Int16 | UInt16 => 2,
            Int32 | UInt32 | Float => 4,
            Int64 | UInt64 | Double => 8,
        }
    }
}

/// Trait for scalar types which can inhabit a volume.
///
/// Covers what both backends need: the NIfTI reader/writer machinery via
/// [`DataElement`], lossless-as-possible numeric casting, and raw sample
/// I/O for the NRRD codec.
pub trait Element:
    DataElement
    + Pod
    + Copy
    + PartialEq
    + Debug
    + NumCast
    + ToPrimitive
    + FromPrimitive
    + ScalarOperand
    + Mul<Output = Self>
    + Add<Output = Self>
    + Sub<Output = Self>
    + Div<Output = Self>
    + Send
    + Sync
    + 'static
{
    /// The NRRD descriptor for volumes of this type.
    const NRRD_TYPE: NrrdType;

    /// Read one sample with the source's byte order.
    fn read_sample<R: Read, E: Endian>(src: &mut ByteOrdered<R, E>) -> IoResult<Self>;

    /// Write one sample with the destination's byte order.
    fn write_sample<W: Write, E: Endian>(self, dst: &mut ByteOrdered<W, E>) -> IoResult<()>;
}

macro_rules! impl_element {
    ($t:ty, $nrrd:expr, $read:ident, $write:ident) => {
        impl Element for $t {
            const NRRD_TYPE: NrrdType = $nrrd;

            fn read_sample<R: Read, E: Endian>(src: &mut ByteOrdered<R, E>) -> IoResult<Self> {
                src.$read()
            }

            fn write_sample<W: Write, E: Endian>(
                self,
                dst: &mut ByteOrdered<W, E>,
            ) -> IoResult<()> {
                dst.$write(self)
            }
        }
    };
}

impl_element!(u8, NrrdType::UInt8, read_u8, write_u8);
impl_element!(i8, NrrdType::Int8, read_i8, write_i8);
impl_element!(u16, NrrdType::UInt16, read_u16, write_u16);
impl_element!(i16, NrrdType::Int16, read_i16, write_i16);
impl_element!(u32, NrrdType::UInt32, read_u32, write_u32);
impl_element!(i32, NrrdType::Int32, read_i32, write_i32);
impl_element!(u64, NrrdType::UInt64, read_u64, write_u64);
impl_element!(i64, NrrdType::Int64, read_i64, write_i64);
impl_element!(f32, NrrdType::Float, read_f32, write_f32);
impl_element!(f64, NrrdType::Double, read_f64, write_f64);
