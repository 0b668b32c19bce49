//! Storage element types.
//!
//! Arrays live in memory as `f64`; the [`DType`] records how the samples are
//! laid out on disk. Only types whose every value is exactly representable as
//! an `f64` are offered, so a save/load cycle is bit-exact for the stored type.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::str::FromStr;

use super::{Error, Result};

/// Element type of a stored array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DType {
    /// Boolean (stored as u8: 0 = false, 1 = true)
    Bool = 0,
    /// Unsigned 8-bit integer
    Uint8 = 1,
    /// Signed 8-bit integer
    Int8 = 2,
    /// Unsigned 16-bit integer
    Uint16 = 3,
    /// Signed 16-bit integer
    Int16 = 4,
    /// Unsigned 32-bit integer
    Uint32 = 5,
    /// Signed 32-bit integer
    Int32 = 6,
    /// 32-bit floating point
    Float32 = 10,
    /// 64-bit floating point
    #[default]
    Float64 = 11,
}

impl DType {
    /// All storable types.
    pub const ALL: [DType; 9] = [
        Self::Bool,
        Self::Uint8,
        Self::Int8,
        Self::Uint16,
        Self::Int16,
        Self::Uint32,
        Self::Int32,
        Self::Float32,
        Self::Float64,
    ];

    /// Size in bytes of one element.
    #[inline]
    pub const fn num_bytes(self) -> usize {
        match self {
            Self::Bool | Self::Uint8 | Self::Int8 => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Name used in node attributes.
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Uint8 => "uint8",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// True for the floating point types.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Round a value to what this type can hold.
    ///
    /// Integers are rounded to nearest and saturated at the type bounds,
    /// NaN becomes 0. Bool maps every non-zero value to 1.
    pub fn quantize(self, v: f64) -> f64 {
        match self {
            Self::Float64 => v,
            Self::Float32 => v as f32 as f64,
            Self::Bool => {
                if v != 0.0 && !v.is_nan() {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Uint8 => v.round() as u8 as f64,
            Self::Int8 => v.round() as i8 as f64,
            Self::Uint16 => v.round() as u16 as f64,
            Self::Int16 => v.round() as i16 as f64,
            Self::Uint32 => v.round() as u32 as f64,
            Self::Int32 => v.round() as i32 as f64,
        }
    }

    /// Encode values as little-endian bytes of this type.
    pub fn encode(self, values: &[f64]) -> Vec<u8> {
        let mut out = vec![0u8; values.len() * self.num_bytes()];
        match self {
            Self::Float64 => LittleEndian::write_f64_into(values, &mut out),
            Self::Float32 => {
                let v: Vec<f32> = values.iter().map(|&x| x as f32).collect();
                LittleEndian::write_f32_into(&v, &mut out);
            }
            Self::Int32 => {
                let v: Vec<i32> = values.iter().map(|&x| x.round() as i32).collect();
                LittleEndian::write_i32_into(&v, &mut out);
            }
            Self::Uint32 => {
                let v: Vec<u32> = values.iter().map(|&x| x.round() as u32).collect();
                LittleEndian::write_u32_into(&v, &mut out);
            }
            Self::Int16 => {
                let v: Vec<i16> = values.iter().map(|&x| x.round() as i16).collect();
                LittleEndian::write_i16_into(&v, &mut out);
            }
            Self::Uint16 => {
                let v: Vec<u16> = values.iter().map(|&x| x.round() as u16).collect();
                LittleEndian::write_u16_into(&v, &mut out);
            }
            Self::Int8 => {
                let v: Vec<i8> = values.iter().map(|&x| x.round() as i8).collect();
                out.copy_from_slice(bytemuck::cast_slice(&v));
            }
            Self::Uint8 | Self::Bool => {
                for (dst, &x) in out.iter_mut().zip(values) {
                    *dst = self.quantize(x) as u8;
                }
            }
        }
        out
    }

    /// Decode little-endian bytes of this type.
    ///
    /// Fails if the byte count is not a multiple of the element size.
    pub fn decode(self, bytes: &[u8]) -> Result<Vec<f64>> {
        let n = self.num_bytes();
        if bytes.len() % n != 0 {
            return Err(Error::other(format!(
                "{} bytes is not a whole number of {} elements",
                bytes.len(),
                self.name()
            )));
        }
        let count = bytes.len() / n;
        let values = match self {
            Self::Float64 => {
                let mut v = vec![0f64; count];
                LittleEndian::read_f64_into(bytes, &mut v);
                v
            }
            Self::Float32 => {
                let mut v = vec![0f32; count];
                LittleEndian::read_f32_into(bytes, &mut v);
                v.into_iter().map(f64::from).collect()
            }
            Self::Int32 => {
                let mut v = vec![0i32; count];
                LittleEndian::read_i32_into(bytes, &mut v);
                v.into_iter().map(f64::from).collect()
            }
            Self::Uint32 => {
                let mut v = vec![0u32; count];
                LittleEndian::read_u32_into(bytes, &mut v);
                v.into_iter().map(f64::from).collect()
            }
            Self::Int16 => {
                let mut v = vec![0i16; count];
                LittleEndian::read_i16_into(bytes, &mut v);
                v.into_iter().map(f64::from).collect()
            }
            Self::Uint16 => {
                let mut v = vec![0u16; count];
                LittleEndian::read_u16_into(bytes, &mut v);
                v.into_iter().map(f64::from).collect()
            }
            Self::Int8 => {
                let v: &[i8] = bytemuck::cast_slice(bytes);
                v.iter().map(|&x| f64::from(x)).collect()
            }
            Self::Uint8 => bytes.iter().map(|&x| f64::from(x)).collect(),
            Self::Bool => bytes.iter().map(|&x| if x != 0 { 1.0 } else { 0.0 }).collect(),
        };
        Ok(values)
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::other(format!("unknown dtype '{}'", s)))
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
