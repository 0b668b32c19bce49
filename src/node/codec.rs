//! Binary encoding of node headers.
//!
//! ```text
//! kind u8 | name_len u16 | name
//! [array only] codec u8 | raw_len u64 | crc32 u32
//! attr_count u32 | { key_len u16 | key | tag u8 | value }*
//! ```
//!
//! Values: bool as u8, int as i64, float as f64, strings and lists with a
//! u32 length prefix. All integers little-endian.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::compression::Codec;
use crate::util::{AttrValue, Attributes, Error, Result};

/// Node type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NodeKind {
    Group = 0,
    Array = 1,
}

impl NodeKind {
    pub fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(Self::Group),
            1 => Ok(Self::Array),
            other => Err(Error::other(format!("unknown node kind {}", other))),
        }
    }
}

/// How an array node's payload is stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PayloadInfo {
    pub codec: Codec,
    /// Length after decompression.
    pub raw_len: u64,
    /// CRC-32 of the uncompressed bytes.
    pub crc32: u32,
}

/// Decoded node header.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeHeader {
    pub kind: NodeKind,
    pub name: String,
    pub payload: Option<PayloadInfo>,
    pub attrs: Attributes,
}

/// Check that `name` can be used as a node key.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.len() > u16::MAX as usize
        || name.contains('/')
        || name.contains('\0')
        || name == "."
        || name == ".."
    {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn encode_header(header: &NodeHeader) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64);
    buf.write_u8(header.kind as u8)?;
    write_short_str(&mut buf, &header.name)?;
    if header.kind == NodeKind::Array {
        let info = header.payload.unwrap_or_default();
        buf.write_u8(info.codec as u8)?;
        buf.write_u64::<LittleEndian>(info.raw_len)?;
        buf.write_u32::<LittleEndian>(info.crc32)?;
    }
    buf.write_u32::<LittleEndian>(header.attrs.len() as u32)?;
    for (key, value) in header.attrs.iter() {
        write_short_str(&mut buf, key)?;
        write_value(&mut buf, value)?;
    }
    Ok(buf)
}

pub fn decode_header(bytes: &[u8]) -> Result<NodeHeader> {
    let mut r = Cursor::new(bytes);
    let kind = NodeKind::from_u8(r.read_u8().map_err(truncated)?)?;
    let name = read_short_str(&mut r)?;
    let payload = match kind {
        NodeKind::Array => Some(PayloadInfo {
            codec: Codec::from_u8(r.read_u8().map_err(truncated)?)?,
            raw_len: r.read_u64::<LittleEndian>().map_err(truncated)?,
            crc32: r.read_u32::<LittleEndian>().map_err(truncated)?,
        }),
        NodeKind::Group => None,
    };
    let count = r.read_u32::<LittleEndian>().map_err(truncated)?;
    let mut attrs = Attributes::new();
    for _ in 0..count {
        let key = read_short_str(&mut r)?;
        let value = read_value(&mut r)?;
        attrs.set(key, value);
    }
    if (r.position() as usize) != bytes.len() {
        return Err(Error::other(format!(
            "{} trailing bytes after node header",
            bytes.len() - r.position() as usize
        )));
    }
    Ok(NodeHeader { kind, name, payload, attrs })
}

fn truncated(_: std::io::Error) -> Error {
    Error::other("truncated node header")
}

fn write_short_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| Error::InvalidName(s.to_string()))?;
    buf.write_u16::<LittleEndian>(len)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_str(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    buf.write_u32::<LittleEndian>(s.len() as u32)?;
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn write_value(buf: &mut Vec<u8>, value: &AttrValue) -> Result<()> {
    buf.write_u8(value.tag())?;
    match value {
        AttrValue::Bool(b) => buf.write_u8(*b as u8)?,
        AttrValue::Int(i) => buf.write_i64::<LittleEndian>(*i)?,
        AttrValue::Float(f) => buf.write_f64::<LittleEndian>(*f)?,
        AttrValue::Str(s) => write_str(buf, s)?,
        AttrValue::IntList(v) => {
            buf.write_u32::<LittleEndian>(v.len() as u32)?;
            for &i in v {
                buf.write_i64::<LittleEndian>(i)?;
            }
        }
        AttrValue::FloatList(v) => {
            buf.write_u32::<LittleEndian>(v.len() as u32)?;
            for &f in v {
                buf.write_f64::<LittleEndian>(f)?;
            }
        }
        AttrValue::StrList(v) => {
            buf.write_u32::<LittleEndian>(v.len() as u32)?;
            for s in v {
                write_str(buf, s)?;
            }
        }
    }
    Ok(())
}

fn read_exact_string(r: &mut Cursor<&[u8]>, len: usize) -> Result<String> {
    let remaining = r.get_ref().len() - r.position() as usize;
    if len > remaining {
        return Err(Error::other("truncated node header"));
    }
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes).map_err(truncated)?;
    Ok(String::from_utf8(bytes)?)
}

fn read_short_str(r: &mut Cursor<&[u8]>) -> Result<String> {
    let len = r.read_u16::<LittleEndian>().map_err(truncated)? as usize;
    read_exact_string(r, len)
}

fn read_str(r: &mut Cursor<&[u8]>) -> Result<String> {
    let len = r.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    read_exact_string(r, len)
}

/// Read a list length, rejecting counts the remaining bytes cannot hold.
fn read_len(r: &mut Cursor<&[u8]>, min_item_size: usize) -> Result<usize> {
    let len = r.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    let remaining = r.get_ref().len() - r.position() as usize;
    if len.saturating_mul(min_item_size) > remaining {
        return Err(Error::other("truncated node header"));
    }
    Ok(len)
}

fn read_value(r: &mut Cursor<&[u8]>) -> Result<AttrValue> {
    let tag = r.read_u8().map_err(truncated)?;
    Ok(match tag {
        0 => AttrValue::Bool(r.read_u8().map_err(truncated)? != 0),
        1 => AttrValue::Int(r.read_i64::<LittleEndian>().map_err(truncated)?),
        2 => AttrValue::Float(r.read_f64::<LittleEndian>().map_err(truncated)?),
        3 => AttrValue::Str(read_str(r)?),
        4 => {
            let n = read_len(r, 8)?;
            let mut v = vec![0i64; n];
            r.read_i64_into::<LittleEndian>(&mut v).map_err(truncated)?;
            AttrValue::IntList(v)
        }
        5 => {
            let n = read_len(r, 8)?;
            let mut v = vec![0f64; n];
            r.read_f64_into::<LittleEndian>(&mut v).map_err(truncated)?;
            AttrValue::FloatList(v)
        }
        6 => {
            let n = read_len(r, 4)?;
            let mut v = Vec::with_capacity(n);
            for _ in 0..n {
                v.push(read_str(r)?);
            }
            AttrValue::StrList(v)
        }
        other => return Err(Error::other(format!("unknown attribute tag {}", other))),
    })
}
