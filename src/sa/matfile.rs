//! MATLAB Level 5 MAT-file reader and writer.
//!
//! Only the subset needed to exchange SA records is covered: real numeric
//! matrices, char arrays and cell arrays, little-endian, optionally wrapped
//! in zlib-compressed elements.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Bytes 0-115:   descriptive text, space padded                │
//! │ Bytes 116-123: subsystem data offset (zero)                  │
//! │ Bytes 124-125: version 0x0100                                │
//! │ Bytes 126-127: endian indicator "IM" (little-endian file)    │
//! │ Then one data element per variable:                          │
//! │   tag (type u32, byte count u32) + data, padded to 8 bytes   │
//! │   small elements (<= 4 bytes) pack count, type and data      │
//! │   into the 8-byte tag                                        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use thiserror::Error;

use super::cursor::{le_array, ByteCursor, Truncated};

const HEADER_LEN: usize = 128;
const HEADER_TEXT_LEN: usize = 116;
const MAT_VERSION: u16 = 0x0100;

// Data element types
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;
const MI_UTF8: u32 = 16;
const MI_UTF16: u32 = 17;

// Array classes
const MX_CELL: u8 = 1;
const MX_CHAR: u8 = 4;
const MX_DOUBLE: u8 = 6;
const MX_UINT64: u8 = 15;

/// Errors raised by the MAT-file codec.
#[derive(Error, Debug)]
pub enum MatError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Truncated MAT-file: {0}")]
    Truncated(#[from] Truncated),

    #[error("Not a Level 5 MAT-file")]
    NotMatFile,

    #[error("Big-endian MAT-files are not supported")]
    UnsupportedEndian,

    #[error("Unsupported MAT-file version {0:#06x}")]
    UnsupportedVersion(u16),

    #[error("Unexpected top-level element type {0}")]
    UnexpectedElement(u32),

    #[error("Unsupported array class {0}")]
    UnsupportedClass(u8),

    #[error("Unsupported data type {0}")]
    UnsupportedDataType(u32),

    #[error("Malformed array: {0}")]
    Malformed(String),

    #[error("Invalid character data in '{0}'")]
    InvalidText(String),

    #[error("Array '{name}' has dimensions {dims:?} but holds {numel} elements")]
    DimensionMismatch {
        name: String,
        dims: Vec<usize>,
        numel: usize,
    },

    #[error("Element too large for a MAT-file: {0} bytes")]
    TooLarge(usize),
}

/// An array stored in a MAT-file.
#[derive(Debug, Clone, PartialEq)]
pub enum MatArray {
    /// Real numeric array, column-major
    Numeric { dims: Vec<usize>, data: Vec<f64> },
    /// Character array, row-major text
    Char { dims: Vec<usize>, text: String },
    /// Cell array, column-major
    Cell { dims: Vec<usize>, cells: Vec<MatArray> },
}

impl MatArray {
    /// A `rows` x `cols` matrix from column-major data.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        MatArray::Numeric {
            dims: vec![rows, cols],
            data,
        }
    }

    /// A 1 x n char row (0 x 0 for the empty string).
    pub fn char_row(text: &str) -> Self {
        let units = text.encode_utf16().count();
        let dims = if units == 0 { vec![0, 0] } else { vec![1, units] };
        MatArray::Char {
            dims,
            text: text.to_string(),
        }
    }

    /// An n x 1 cell array.
    pub fn cell_column(cells: Vec<MatArray>) -> Self {
        MatArray::Cell {
            dims: vec![cells.len(), 1],
            cells,
        }
    }

    /// Array dimensions.
    pub fn dims(&self) -> &[usize] {
        match self {
            MatArray::Numeric { dims, .. }
            | MatArray::Char { dims, .. }
            | MatArray::Cell { dims, .. } => dims,
        }
    }

    fn class(&self) -> u8 {
        match self {
            MatArray::Numeric { .. } => MX_DOUBLE,
            MatArray::Char { .. } => MX_CHAR,
            MatArray::Cell { .. } => MX_CELL,
        }
    }

    fn numel(&self) -> usize {
        match self {
            MatArray::Numeric { data, .. } => data.len(),
            MatArray::Char { text, .. } => text.encode_utf16().count(),
            MatArray::Cell { cells, .. } => cells.len(),
        }
    }
}

/// Number of elements for `dims`, `None` on overflow.
fn element_count(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

// ============================================================================
// Writing
// ============================================================================

fn pad_to_8(buf: &mut Vec<u8>) {
    let rem = buf.len() % 8;
    if rem != 0 {
        buf.resize(buf.len() + 8 - rem, 0);
    }
}

fn put_element(buf: &mut Vec<u8>, mi_type: u32, data: &[u8]) -> Result<(), MatError> {
    if !data.is_empty() && data.len() <= 4 {
        let packed = ((data.len() as u32) << 16) | mi_type;
        buf.extend_from_slice(&packed.to_le_bytes());
        buf.extend_from_slice(data);
        buf.resize(buf.len() + 4 - data.len(), 0);
        return Ok(());
    }
    let len = u32::try_from(data.len()).map_err(|_| MatError::TooLarge(data.len()))?;
    buf.extend_from_slice(&mi_type.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(data);
    pad_to_8(buf);
    Ok(())
}

/// Encodes one array as a complete `miMATRIX` element.
fn encode_matrix(name: &str, array: &MatArray) -> Result<Vec<u8>, MatError> {
    let dims = array.dims();
    if dims.len() < 2 || element_count(dims) != Some(array.numel()) {
        return Err(MatError::DimensionMismatch {
            name: name.to_string(),
            dims: dims.to_vec(),
            numel: array.numel(),
        });
    }

    let mut body = Vec::new();

    let mut flags = Vec::with_capacity(8);
    flags.extend_from_slice(&(array.class() as u32).to_le_bytes());
    flags.extend_from_slice(&0u32.to_le_bytes());
    put_element(&mut body, MI_UINT32, &flags)?;

    let mut dim_bytes = Vec::with_capacity(dims.len() * 4);
    for &d in dims {
        let d = i32::try_from(d).map_err(|_| MatError::TooLarge(d))?;
        dim_bytes.extend_from_slice(&d.to_le_bytes());
    }
    put_element(&mut body, MI_INT32, &dim_bytes)?;
    put_element(&mut body, MI_INT8, name.as_bytes())?;

    match array {
        MatArray::Numeric { data, .. } => {
            let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
            put_element(&mut body, MI_DOUBLE, &bytes)?;
        }
        MatArray::Char { text, .. } => {
            let bytes: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
            put_element(&mut body, MI_UINT16, &bytes)?;
        }
        MatArray::Cell { cells, .. } => {
            for cell in cells {
                body.extend_from_slice(&encode_matrix("", cell)?);
            }
        }
    }

    let mut element = Vec::with_capacity(body.len() + 8);
    put_element(&mut element, MI_MATRIX, &body)?;
    Ok(element)
}

fn header() -> [u8; HEADER_LEN] {
    let text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created by: chimera {}",
        std::env::consts::OS,
        env!("CARGO_PKG_VERSION")
    );
    let mut header = [b' '; HEADER_LEN];
    let n = text.len().min(HEADER_TEXT_LEN);
    header[..n].copy_from_slice(&text.as_bytes()[..n]);
    header[HEADER_TEXT_LEN..124].fill(0);
    header[124..126].copy_from_slice(&MAT_VERSION.to_le_bytes());
    header[126..128].copy_from_slice(b"IM");
    header
}

/// Writes named variables as a MAT-file.
///
/// With `compress`, each variable is stored in its own zlib-compressed
/// element, as MATLAB does for `-v7` files.
pub fn write_mat<W: Write>(
    mut writer: W,
    variables: &[(&str, &MatArray)],
    compress: bool,
) -> Result<W, MatError> {
    writer.write_all(&header())?;

    for (name, array) in variables {
        let element = encode_matrix(name, array)?;
        if compress {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&element)?;
            let compressed = encoder.finish()?;
            let len = u32::try_from(compressed.len())
                .map_err(|_| MatError::TooLarge(compressed.len()))?;
            writer.write_all(&MI_COMPRESSED.to_le_bytes())?;
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(&compressed)?;
        } else {
            writer.write_all(&element)?;
        }
    }

    writer.flush()?;
    Ok(writer)
}

/// Writes a MAT-file to `path`.
pub fn save_mat<P: AsRef<Path>>(
    path: P,
    variables: &[(&str, &MatArray)],
    compress: bool,
) -> Result<(), MatError> {
    let file = File::create(path)?;
    write_mat(BufWriter::new(file), variables, compress)?;
    Ok(())
}

// ============================================================================
// Reading
// ============================================================================

/// Reads one data element, returning its type and payload.
fn read_element<'a>(cursor: &mut ByteCursor<'a>) -> Result<(u32, &'a [u8]), MatError> {
    let first = cursor.u32_le()?;
    let small_len = (first >> 16) as usize;
    if small_len != 0 {
        if small_len > 4 {
            return Err(MatError::Malformed(format!(
                "small element claims {} bytes",
                small_len
            )));
        }
        let payload = cursor.take(4)?;
        return Ok((first & 0xffff, &payload[..small_len]));
    }

    let len = cursor.u32_le()? as usize;
    let data = cursor.take(len)?;
    if first != MI_COMPRESSED {
        cursor.skip_at_most((8 - len % 8) % 8);
    }
    Ok((first, data))
}

fn numeric_to_f64(mi_type: u32, data: &[u8]) -> Result<Vec<f64>, MatError> {
    let width = match mi_type {
        MI_INT8 | MI_UINT8 => 1,
        MI_INT16 | MI_UINT16 => 2,
        MI_INT32 | MI_UINT32 | MI_SINGLE => 4,
        MI_DOUBLE | MI_INT64 | MI_UINT64 => 8,
        other => return Err(MatError::UnsupportedDataType(other)),
    };
    if data.len() % width != 0 {
        return Err(MatError::Malformed(format!(
            "{} bytes of numeric data is not a multiple of {}",
            data.len(),
            width
        )));
    }

    let chunks = data.chunks_exact(width);
    let values = match mi_type {
        MI_INT8 => chunks.map(|b| b[0] as i8 as f64).collect(),
        MI_UINT8 => chunks.map(|b| b[0] as f64).collect(),
        MI_INT16 => chunks.map(|b| i16::from_le_bytes(le_array(b)) as f64).collect(),
        MI_UINT16 => chunks.map(|b| u16::from_le_bytes(le_array(b)) as f64).collect(),
        MI_INT32 => chunks.map(|b| i32::from_le_bytes(le_array(b)) as f64).collect(),
        MI_UINT32 => chunks.map(|b| u32::from_le_bytes(le_array(b)) as f64).collect(),
        MI_SINGLE => chunks.map(|b| f32::from_le_bytes(le_array(b)) as f64).collect(),
        MI_INT64 => chunks.map(|b| i64::from_le_bytes(le_array(b)) as f64).collect(),
        MI_UINT64 => chunks.map(|b| u64::from_le_bytes(le_array(b)) as f64).collect(),
        _ => chunks.map(|b| f64::from_le_bytes(le_array(b))).collect(),
    };
    Ok(values)
}

fn decode_chars(name: &str, mi_type: u32, data: &[u8], dims: &[usize]) -> Result<String, MatError> {
    let invalid = || MatError::InvalidText(name.to_string());
    let chars: Vec<char> = match mi_type {
        MI_UINT16 | MI_UTF16 => {
            if data.len() % 2 != 0 {
                return Err(invalid());
            }
            let units = data.chunks_exact(2).map(|b| u16::from_le_bytes(le_array(b)));
            char::decode_utf16(units)
                .collect::<Result<_, _>>()
                .map_err(|_| invalid())?
        }
        MI_UTF8 => std::str::from_utf8(data).map_err(|_| invalid())?.chars().collect(),
        MI_UINT8 | MI_INT8 => data.iter().map(|&b| b as char).collect(),
        other => return Err(MatError::UnsupportedDataType(other)),
    };

    // Stored column-major; rebuild rows for multi-row char arrays
    let rows = dims.first().copied().unwrap_or(0);
    if rows <= 1 || chars.len() % rows != 0 {
        return Ok(chars.into_iter().collect());
    }
    let cols = chars.len() / rows;
    let mut text = String::with_capacity(chars.len());
    for r in 0..rows {
        for c in 0..cols {
            text.push(chars[c * rows + r]);
        }
    }
    Ok(text)
}

/// Parses the payload of a `miMATRIX` element.
fn parse_matrix(data: &[u8]) -> Result<(String, MatArray), MatError> {
    if data.is_empty() {
        return Ok((String::new(), MatArray::matrix(0, 0, Vec::new())));
    }
    let mut cursor = ByteCursor::new(data);

    let (mi_type, flags) = read_element(&mut cursor)?;
    if mi_type != MI_UINT32 || flags.len() < 4 {
        return Err(MatError::Malformed("missing array flags".into()));
    }
    let class = flags[0];

    let (mi_type, dim_bytes) = read_element(&mut cursor)?;
    if mi_type != MI_INT32 || dim_bytes.len() % 4 != 0 {
        return Err(MatError::Malformed("missing dimensions".into()));
    }
    let dims = dim_bytes
        .chunks_exact(4)
        .map(|b| usize::try_from(i32::from_le_bytes(le_array(b))))
        .collect::<Result<Vec<usize>, _>>()
        .map_err(|_| MatError::Malformed("negative dimension".into()))?;
    let numel = element_count(&dims)
        .ok_or_else(|| MatError::Malformed("dimension product overflows".into()))?;

    let (_, name_bytes) = read_element(&mut cursor)?;
    let name = String::from_utf8(name_bytes.to_vec())
        .map_err(|_| MatError::Malformed("array name is not UTF-8".into()))?;

    let value = match class {
        MX_CELL => {
            let mut cells = Vec::with_capacity(numel.min(cursor.remaining() / 8));
            for _ in 0..numel {
                let (mi_type, cell) = read_element(&mut cursor)?;
                if mi_type != MI_MATRIX {
                    return Err(MatError::Malformed(format!("cell of '{}' is not a matrix", name)));
                }
                cells.push(parse_matrix(cell)?.1);
            }
            MatArray::Cell { dims, cells }
        }
        MX_CHAR => {
            let text = if cursor.is_empty() {
                String::new()
            } else {
                let (mi_type, chars) = read_element(&mut cursor)?;
                decode_chars(&name, mi_type, chars, &dims)?
            };
            MatArray::Char { dims, text }
        }
        MX_DOUBLE..=MX_UINT64 => {
            // Imaginary parts, if any, follow the real part and are ignored
            let data = if numel == 0 && cursor.is_empty() {
                Vec::new()
            } else {
                let (mi_type, real) = read_element(&mut cursor)?;
                numeric_to_f64(mi_type, real)?
            };
            if data.len() != numel {
                return Err(MatError::DimensionMismatch {
                    name,
                    dims,
                    numel: data.len(),
                });
            }
            MatArray::Numeric { dims, data }
        }
        other => return Err(MatError::UnsupportedClass(other)),
    };

    Ok((name, value))
}

/// Parses a complete MAT-file image.
pub fn read_mat(bytes: &[u8]) -> Result<Vec<(String, MatArray)>, MatError> {
    if bytes.len() < HEADER_LEN {
        return Err(MatError::NotMatFile);
    }
    match &bytes[126..128] {
        b"IM" => {}
        b"MI" => return Err(MatError::UnsupportedEndian),
        _ => return Err(MatError::NotMatFile),
    }
    let version = u16::from_le_bytes(le_array(&bytes[124..126]));
    if version != MAT_VERSION {
        return Err(MatError::UnsupportedVersion(version));
    }

    let mut cursor = ByteCursor::new(&bytes[HEADER_LEN..]);
    let mut variables = Vec::new();

    while !cursor.is_empty() {
        let (mi_type, data) = read_element(&mut cursor)?;
        let variable = match mi_type {
            MI_MATRIX => parse_matrix(data)?,
            MI_COMPRESSED => {
                let mut inflated = Vec::new();
                ZlibDecoder::new(data).read_to_end(&mut inflated)?;
                let mut inner = ByteCursor::new(&inflated);
                match read_element(&mut inner)? {
                    (MI_MATRIX, matrix) => parse_matrix(matrix)?,
                    (other, _) => return Err(MatError::UnexpectedElement(other)),
                }
            }
            other => return Err(MatError::UnexpectedElement(other)),
        };
        variables.push(variable);
    }

    Ok(variables)
}

/// Reads a MAT-file from `path`.
pub fn load_mat<P: AsRef<Path>>(path: P) -> Result<Vec<(String, MatArray)>, MatError> {
    let bytes = fs::read(path)?;
    read_mat(&bytes)
}
