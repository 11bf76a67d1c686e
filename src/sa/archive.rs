//! Compressed named-array container, the primary SA format.
//!
//! ## Wire Format (Version 1)
//!
//! The whole payload is one gzip member (header mtime fixed to 0). Inside,
//! all integers are little-endian:
//!
//! ```text
//! magic        4 bytes  "CHSA"
//! version      u8       1
//! entry count  u32
//! per entry:
//!   name len   u16
//!   name       UTF-8
//!   dtype      u8       0 = i64, 1 = f64, 2 = bool, 3 = string
//!   length     u64      number of elements
//!   payload    i64 / f64 bits / u8 (0 or 1) / (u32 byte len + UTF-8) per element
//! ```
//!
//! Entries are written in name order, so the same arrays always produce the
//! same bytes.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::{Compression, GzBuilder};
use thiserror::Error;

use super::cursor::{le_array, ByteCursor, Truncated};
use super::{Array, ArrayMap};

const MAGIC: [u8; 4] = *b"CHSA";
const FORMAT_VERSION: u8 = 1;

/// Errors raised by the archive codec.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Not an SA archive (bad magic bytes)")]
    BadMagic,

    #[error("Unsupported archive version {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown array type tag {0}")]
    UnknownDtype(u8),

    #[error("Truncated archive: {0}")]
    Truncated(#[from] Truncated),

    #[error("Field name is not valid UTF-8")]
    InvalidName,

    #[error("String element {index} of field '{field}' is not valid UTF-8")]
    InvalidString { field: String, index: usize },

    #[error("Field '{0}' appears twice")]
    DuplicateField(String),

    #[error("{0} trailing bytes after the last field")]
    TrailingData(usize),

    #[error("Field name too long: {0} bytes")]
    NameTooLong(usize),

    #[error("String element too long: {0} bytes")]
    ValueTooLong(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    Int = 0,
    Float = 1,
    Bool = 2,
    Str = 3,
}

impl TryFrom<u8> for Dtype {
    type Error = ArchiveError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Dtype::Int),
            1 => Ok(Dtype::Float),
            2 => Ok(Dtype::Bool),
            3 => Ok(Dtype::Str),
            other => Err(ArchiveError::UnknownDtype(other)),
        }
    }
}

fn dtype_of(array: &Array) -> Dtype {
    match array {
        Array::Int(_) => Dtype::Int,
        Array::Float(_) => Dtype::Float,
        Array::Bool(_) => Dtype::Bool,
        Array::Str(_) => Dtype::Str,
    }
}

/// Serializes named arrays into an uncompressed payload.
pub fn encode<'a, I>(entries: I) -> Result<Vec<u8>, ArchiveError>
where
    I: IntoIterator<Item = (&'a str, &'a Array)>,
{
    let entries: Vec<(&str, &Array)> = entries.into_iter().collect();

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&(entries.len() as u32).to_le_bytes());

    for (name, array) in entries {
        let name_len =
            u16::try_from(name.len()).map_err(|_| ArchiveError::NameTooLong(name.len()))?;
        out.extend_from_slice(&name_len.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(dtype_of(array) as u8);
        out.extend_from_slice(&(array.len() as u64).to_le_bytes());

        match array {
            Array::Int(values) => {
                for v in values {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
            Array::Float(values) => {
                for v in values {
                    out.extend_from_slice(&v.to_bits().to_le_bytes());
                }
            }
            Array::Bool(values) => out.extend(values.iter().map(|&b| b as u8)),
            Array::Str(values) => {
                for s in values {
                    let len = u32::try_from(s.len())
                        .map_err(|_| ArchiveError::ValueTooLong(s.len()))?;
                    out.extend_from_slice(&len.to_le_bytes());
                    out.extend_from_slice(s.as_bytes());
                }
            }
        }
    }

    Ok(out)
}

fn fixed_width<'a>(
    cursor: &mut ByteCursor<'a>,
    len: u64,
    width: usize,
) -> Result<std::slice::ChunksExact<'a, u8>, Truncated> {
    // An impossible length simply fails as truncated input
    let total = usize::try_from(len)
        .ok()
        .and_then(|n| n.checked_mul(width))
        .unwrap_or(usize::MAX);
    Ok(cursor.take(total)?.chunks_exact(width))
}

/// Parses an uncompressed payload back into named arrays.
pub fn decode(payload: &[u8]) -> Result<ArrayMap, ArchiveError> {
    let mut cursor = ByteCursor::new(payload);

    if cursor.take(MAGIC.len())? != &MAGIC[..] {
        return Err(ArchiveError::BadMagic);
    }
    let version = cursor.u8()?;
    if version != FORMAT_VERSION {
        return Err(ArchiveError::UnsupportedVersion(version));
    }

    let count = cursor.u32_le()?;
    let mut arrays = ArrayMap::new();

    for _ in 0..count {
        let name_len = cursor.u16_le()? as usize;
        let name = std::str::from_utf8(cursor.take(name_len)?)
            .map_err(|_| ArchiveError::InvalidName)?
            .to_string();
        let dtype = Dtype::try_from(cursor.u8()?)?;
        let len = cursor.u64_le()?;

        let array = match dtype {
            Dtype::Int => Array::Int(
                fixed_width(&mut cursor, len, 8)?
                    .map(|b| i64::from_le_bytes(le_array(b)))
                    .collect(),
            ),
            Dtype::Float => Array::Float(
                fixed_width(&mut cursor, len, 8)?
                    .map(|b| f64::from_bits(u64::from_le_bytes(le_array(b))))
                    .collect(),
            ),
            Dtype::Bool => Array::Bool(
                fixed_width(&mut cursor, len, 1)?
                    .map(|b| b[0] != 0)
                    .collect(),
            ),
            Dtype::Str => {
                // Each string needs at least its 4-byte length prefix
                let mut values = Vec::with_capacity((len as usize).min(cursor.remaining() / 4));
                for index in 0..len as usize {
                    let n = cursor.u32_le()? as usize;
                    let s = std::str::from_utf8(cursor.take(n)?).map_err(|_| {
                        ArchiveError::InvalidString {
                            field: name.clone(),
                            index,
                        }
                    })?;
                    values.push(s.to_string());
                }
                Array::Str(values)
            }
        };

        if arrays.insert(name.clone(), array).is_some() {
            return Err(ArchiveError::DuplicateField(name));
        }
    }

    if !cursor.is_empty() {
        return Err(ArchiveError::TrailingData(cursor.remaining()));
    }
    Ok(arrays)
}

/// Writes named arrays as a gzip-compressed archive.
pub fn write_archive<'a, W, I>(writer: W, entries: I) -> Result<W, ArchiveError>
where
    W: Write,
    I: IntoIterator<Item = (&'a str, &'a Array)>,
{
    let payload = encode(entries)?;
    let mut encoder = GzBuilder::new().mtime(0).write(writer, Compression::default());
    encoder.write_all(&payload)?;
    Ok(encoder.finish()?)
}

/// Reads a gzip-compressed archive.
pub fn read_archive<R: Read>(reader: R) -> Result<ArrayMap, ArchiveError> {
    let mut payload = Vec::new();
    GzDecoder::new(reader).read_to_end(&mut payload)?;
    decode(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ArrayMap {
        let mut arrays = ArrayMap::new();
        arrays.insert("pos".into(), Array::Int(vec![0, 3, -7, i64::MAX]));
        arrays.insert("score".into(), Array::Float(vec![0.5, -1.25, f64::INFINITY]));
        arrays.insert("mask".into(), Array::Bool(vec![true, false]));
        arrays.insert("ref".into(), Array::Str(vec!["a".into(), String::new(), "ßeta".into()]));
        arrays.insert("empty".into(), Array::Int(Vec::new()));
        arrays
    }

    fn entries(arrays: &ArrayMap) -> impl Iterator<Item = (&str, &Array)> {
        arrays.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[test]
    fn test_compressed_roundtrip() {
        let arrays = sample();
        let bytes = write_archive(Vec::new(), entries(&arrays)).unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(read_archive(bytes.as_slice()).unwrap(), arrays);
    }

    #[test]
    fn test_output_is_reproducible() {
        let arrays = sample();
        let first = write_archive(Vec::new(), entries(&arrays)).unwrap();
        let second = write_archive(Vec::new(), entries(&arrays)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(decode(b"NOPE\x01"), Err(ArchiveError::BadMagic)));
        assert!(matches!(decode(b"CHSA\x09"), Err(ArchiveError::UnsupportedVersion(9))));
        assert!(matches!(decode(b"CH"), Err(ArchiveError::Truncated(_))));

        let payload = encode(entries(&sample())).unwrap();
        assert!(matches!(
            decode(&payload[..payload.len() - 1]),
            Err(ArchiveError::Truncated(_))
        ));

        let mut trailing = payload.clone();
        trailing.push(0);
        assert!(matches!(decode(&trailing), Err(ArchiveError::TrailingData(1))));
    }

    #[test]
    fn test_duplicate_and_unknown_dtype() {
        let a = Array::Int(vec![1]);
        let payload = encode([("x", &a), ("x", &a)]).unwrap();
        assert!(matches!(decode(&payload), Err(ArchiveError::DuplicateField(name)) if name == "x"));

        let mut payload = encode([("x", &a)]).unwrap();
        // magic(4) + version(1) + count(4) + name len(2) + name(1) -> dtype byte
        payload[12] = 7;
        assert!(matches!(decode(&payload), Err(ArchiveError::UnknownDtype(7))));
    }

    #[test]
    fn test_huge_length_is_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(b"CHSA\x01");
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.push(b'x');
        payload.push(0);
        payload.extend_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(decode(&payload), Err(ArchiveError::Truncated(_))));
    }
}
