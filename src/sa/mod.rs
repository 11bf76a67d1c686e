//! Suffix-array record (SA) persistence.
//!
//! Two interchangeable formats are supported:
//! - **Archive** (primary): a gzip-compressed container of named arrays,
//!   read back as-is without schema checks. See [`archive`].
//! - **Matlab** (alternate): a MAT-file holding an n x 4 matrix `SA` with
//!   columns `[pos+1, ind+1, 1, pos_from_stop]` and a cell column `ref`,
//!   for 1-indexed consumers. See [`matfile`].
//!
//! Transient fields (`mask`, `homologs`) are never persisted.

pub mod archive;
mod cursor;
pub mod matfile;

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use thiserror::Error;
use tracing::debug;

pub use archive::ArchiveError;
pub use cursor::Truncated;
pub use matfile::{MatArray, MatError};

pub const FIELD_POS: &str = "pos";
pub const FIELD_IND: &str = "ind";
pub const FIELD_POS_FROM_STOP: &str = "pos_from_stop";
pub const FIELD_REF: &str = "ref";
pub const FIELD_MASK: &str = "mask";
pub const FIELD_HOMOLOGS: &str = "homologs";

/// Fields dropped before saving.
pub const TRANSIENT_FIELDS: [&str; 2] = [FIELD_MASK, FIELD_HOMOLOGS];

const MAT_SA: &str = "SA";
const MAT_REF: &str = "ref";
const ALT_COLUMNS: usize = 4;

/// Largest magnitude a MAT-file double holds without losing integer precision.
const MAX_EXACT_INT: i64 = 1 << 53;

/// A named array value.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Str(Vec<String>),
}

impl Array {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Array::Int(v) => v.len(),
            Array::Float(v) => v.len(),
            Array::Bool(v) => v.len(),
            Array::Str(v) => v.len(),
        }
    }

    /// Returns true if the array holds no element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Array::Int(_) => "int",
            Array::Float(_) => "float",
            Array::Bool(_) => "bool",
            Array::Str(_) => "string",
        }
    }
}

/// Field name to array mapping, kept in name order.
pub type ArrayMap = BTreeMap<String, Array>;

/// Errors raised while saving or loading SA records.
#[derive(Error, Debug)]
pub enum SaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("MAT-file error: {0}")]
    Mat(#[from] MatError),

    #[error("Missing field '{0}'")]
    MissingField(String),

    #[error("Field '{field}' should hold {expected} values, found {found}")]
    FieldType {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Field '{field}' has {found} elements, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Missing variable '{0}' in MAT-file")]
    MissingVariable(&'static str),

    #[error("Variable '{variable}' has an unexpected shape: {message}")]
    BadShape {
        variable: &'static str,
        message: String,
    },

    #[error("Non-integral value {value} at row {row}, column {col} of '{variable}'")]
    NonIntegral {
        variable: &'static str,
        row: usize,
        col: usize,
        value: f64,
    },

    #[error("Value {value} at row {row} of '{variable}' is outside the exact double range")]
    OutOfRange {
        variable: &'static str,
        row: usize,
        value: f64,
    },
}

/// Result type for SA operations.
pub type SaResult<T> = Result<T, SaError>;

/// A suffix-array record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaRecord {
    /// Zero-based nucleotide offsets
    pub pos: Vec<i64>,
    /// Zero-based indices into `refs`
    pub ind: Vec<i64>,
    /// Distance to the next stop codon, per entry
    pub pos_from_stop: Vec<i64>,
    /// Reference sequences or their identifiers
    pub refs: Vec<String>,
    /// Transient selection mask, never saved
    pub mask: Option<Vec<bool>>,
    /// Transient homolog annotation, never saved
    pub homologs: Option<Array>,
}

impl SaRecord {
    /// Number of suffix entries.
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    /// Returns true if the record holds no entry.
    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }

    /// Checks that the per-entry columns have the same length.
    fn check_lengths(&self) -> SaResult<usize> {
        let rows = self.pos.len();
        for (field, found) in [
            (FIELD_IND, self.ind.len()),
            (FIELD_POS_FROM_STOP, self.pos_from_stop.len()),
        ] {
            if found != rows {
                return Err(SaError::LengthMismatch {
                    field,
                    expected: rows,
                    found,
                });
            }
        }
        Ok(rows)
    }

    /// Converts to named arrays, transient fields included when present.
    pub fn to_arrays(&self) -> ArrayMap {
        let mut arrays = ArrayMap::new();
        arrays.insert(FIELD_POS.into(), Array::Int(self.pos.clone()));
        arrays.insert(FIELD_IND.into(), Array::Int(self.ind.clone()));
        arrays.insert(FIELD_POS_FROM_STOP.into(), Array::Int(self.pos_from_stop.clone()));
        arrays.insert(FIELD_REF.into(), Array::Str(self.refs.clone()));
        if let Some(mask) = &self.mask {
            arrays.insert(FIELD_MASK.into(), Array::Bool(mask.clone()));
        }
        if let Some(homologs) = &self.homologs {
            arrays.insert(FIELD_HOMOLOGS.into(), homologs.clone());
        }
        arrays
    }
}

fn take_field(arrays: &mut ArrayMap, field: &str) -> SaResult<Array> {
    arrays
        .remove(field)
        .ok_or_else(|| SaError::MissingField(field.to_string()))
}

fn wrong_type(field: &str, expected: &'static str, found: &Array) -> SaError {
    SaError::FieldType {
        field: field.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn take_ints(arrays: &mut ArrayMap, field: &str) -> SaResult<Vec<i64>> {
    match take_field(arrays, field)? {
        Array::Int(values) => Ok(values),
        other => Err(wrong_type(field, "int", &other)),
    }
}

impl TryFrom<ArrayMap> for SaRecord {
    type Error = SaError;

    /// Builds a record from loaded arrays. Unknown fields are ignored.
    fn try_from(mut arrays: ArrayMap) -> SaResult<Self> {
        let refs = match take_field(&mut arrays, FIELD_REF)? {
            Array::Str(values) => values,
            other => return Err(wrong_type(FIELD_REF, "string", &other)),
        };
        let mask = match arrays.remove(FIELD_MASK) {
            Some(Array::Bool(values)) => Some(values),
            Some(other) => return Err(wrong_type(FIELD_MASK, "bool", &other)),
            None => None,
        };

        Ok(Self {
            pos: take_ints(&mut arrays, FIELD_POS)?,
            ind: take_ints(&mut arrays, FIELD_IND)?,
            pos_from_stop: take_ints(&mut arrays, FIELD_POS_FROM_STOP)?,
            refs,
            mask,
            homologs: arrays.remove(FIELD_HOMOLOGS),
        })
    }
}

// ============================================================================
// Primary format
// ============================================================================

/// Saves named arrays as a compressed archive, leaving out transient fields.
///
/// The caller's map is not modified. Saving the same map twice produces
/// identical files.
pub fn save<P: AsRef<Path>>(path: P, arrays: &ArrayMap) -> SaResult<()> {
    let path = path.as_ref();
    let kept = arrays
        .iter()
        .filter(|(name, _)| !TRANSIENT_FIELDS.contains(&name.as_str()))
        .map(|(name, array)| (name.as_str(), array));

    let file = File::create(path)?;
    let mut writer = archive::write_archive(BufWriter::new(file), kept)?;
    writer.flush()?;

    debug!(path = %path.display(), "saved SA archive");
    Ok(())
}

/// Loads every field of an archive, without schema validation.
pub fn load<P: AsRef<Path>>(path: P) -> SaResult<ArrayMap> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let arrays = archive::read_archive(BufReader::new(file))?;

    debug!(path = %path.display(), fields = arrays.len(), "loaded SA archive");
    Ok(arrays)
}

/// Saves a typed record in the primary format.
pub fn save_record<P: AsRef<Path>>(path: P, record: &SaRecord) -> SaResult<()> {
    save(path, &record.to_arrays())
}

/// Loads a typed record from the primary format.
pub fn load_record<P: AsRef<Path>>(path: P) -> SaResult<SaRecord> {
    SaRecord::try_from(load(path)?)
}

// ============================================================================
// Alternate (MAT-file) format
// ============================================================================

/// Saves a record as a MAT-file for 1-indexed consumers.
///
/// `SA` is an n x 4 double matrix `[pos+1, ind+1, 1, pos_from_stop]`; `ref`
/// is a column cell array of strings.
pub fn save_alt<P: AsRef<Path>>(path: P, record: &SaRecord) -> SaResult<()> {
    let path = path.as_ref();
    let rows = record.check_lengths()?;

    let mut matrix = Vec::with_capacity(rows * ALT_COLUMNS);
    push_exact(&mut matrix, FIELD_POS, &record.pos, 1)?;
    push_exact(&mut matrix, FIELD_IND, &record.ind, 1)?;
    matrix.extend(std::iter::repeat(1.0).take(rows));
    push_exact(&mut matrix, FIELD_POS_FROM_STOP, &record.pos_from_stop, 0)?;

    let sa = MatArray::matrix(rows, ALT_COLUMNS, matrix);
    let refs = MatArray::cell_column(record.refs.iter().map(|r| MatArray::char_row(r)).collect());
    matfile::save_mat(path, &[(MAT_SA, &sa), (MAT_REF, &refs)], false)?;

    debug!(path = %path.display(), rows, refs = record.refs.len(), "saved SA MAT-file");
    Ok(())
}

/// Appends `values + offset` as doubles, refusing values a double cannot hold exactly.
fn push_exact(
    matrix: &mut Vec<f64>,
    field: &'static str,
    values: &[i64],
    offset: i64,
) -> SaResult<()> {
    for (row, &value) in values.iter().enumerate() {
        let shifted = value
            .checked_add(offset)
            .filter(|v| v.unsigned_abs() <= MAX_EXACT_INT.unsigned_abs())
            .ok_or(SaError::OutOfRange {
                variable: field,
                row,
                value: value as f64,
            })?;
        matrix.push(shifted as f64);
    }
    Ok(())
}

fn integral_column(column: &[f64], col: usize, offset: i64) -> SaResult<Vec<i64>> {
    column
        .iter()
        .enumerate()
        .map(|(row, &value)| {
            if !value.is_finite() || value.fract() != 0.0 {
                return Err(SaError::NonIntegral {
                    variable: MAT_SA,
                    row,
                    col,
                    value,
                });
            }
            if value.abs() > MAX_EXACT_INT as f64 {
                return Err(SaError::OutOfRange {
                    variable: MAT_SA,
                    row,
                    value,
                });
            }
            // Bounded by 2^53, so the offset cannot overflow
            Ok(value as i64 + offset)
        })
        .collect()
}

fn cell_text(cell: MatArray) -> SaResult<String> {
    match cell {
        MatArray::Char { text, .. } => Ok(text),
        MatArray::Numeric { data, .. } if data.is_empty() => Ok(String::new()),
        other => Err(SaError::BadShape {
            variable: MAT_REF,
            message: format!("cell holds a non-text array of size {:?}", other.dims()),
        }),
    }
}

/// Loads a record from a MAT-file written by [`save_alt`] or by a MATLAB
/// consumer following the same layout.
///
/// The constant third column is ignored, as are columns past the fourth.
/// Transient fields are always absent.
pub fn load_alt<P: AsRef<Path>>(path: P) -> SaResult<SaRecord> {
    let path = path.as_ref();
    let mut sa = None;
    let mut refs = None;
    for (name, value) in matfile::load_mat(path)? {
        match name.as_str() {
            MAT_SA => sa = Some(value),
            MAT_REF => refs = Some(value),
            _ => {}
        }
    }

    let (dims, data) = match sa.ok_or(SaError::MissingVariable(MAT_SA))? {
        MatArray::Numeric { dims, data } => (dims, data),
        other => {
            return Err(SaError::BadShape {
                variable: MAT_SA,
                message: format!("expected a numeric matrix, found size {:?}", other.dims()),
            })
        }
    };
    if dims.len() != 2 || (dims[0] > 0 && dims[1] < ALT_COLUMNS) {
        return Err(SaError::BadShape {
            variable: MAT_SA,
            message: format!("expected at least {} columns, found size {:?}", ALT_COLUMNS, dims),
        });
    }
    let rows = dims[0];

    // Column 2 is the constant written by save_alt
    let (pos, ind, pos_from_stop) = if rows == 0 {
        (Vec::new(), Vec::new(), Vec::new())
    } else {
        let mut columns = data.chunks_exact(rows);
        let (Some(c0), Some(c1), _, Some(c3)) =
            (columns.next(), columns.next(), columns.next(), columns.next())
        else {
            return Err(SaError::BadShape {
                variable: MAT_SA,
                message: format!("expected at least {} columns", ALT_COLUMNS),
            });
        };
        (
            integral_column(c0, 0, -1)?,
            integral_column(c1, 1, -1)?,
            integral_column(c3, 3, 0)?,
        )
    };

    let refs = match refs.ok_or(SaError::MissingVariable(MAT_REF))? {
        MatArray::Cell { cells, .. } => cells
            .into_iter()
            .map(cell_text)
            .collect::<SaResult<Vec<_>>>()?,
        MatArray::Char { text, .. } => vec![text],
        MatArray::Numeric { data, .. } if data.is_empty() => Vec::new(),
        other => {
            return Err(SaError::BadShape {
                variable: MAT_REF,
                message: format!("expected a cell array, found size {:?}", other.dims()),
            })
        }
    };

    debug!(path = %path.display(), rows, refs = refs.len(), "loaded SA MAT-file");
    Ok(SaRecord {
        pos,
        ind,
        pos_from_stop,
        refs,
        mask: None,
        homologs: None,
    })
}

// ============================================================================
// Format dispatch
// ============================================================================

/// On-disk SA format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaFormat {
    Archive,
    Matlab,
}

impl std::fmt::Display for SaFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaFormat::Archive => write!(f, "archive"),
            SaFormat::Matlab => write!(f, "MAT-file"),
        }
    }
}

/// Detects the format from the file extension: `.mat` is a MAT-file,
/// anything else is an archive.
pub fn detect_format_from_extension<P: AsRef<Path>>(path: P) -> SaFormat {
    match path.as_ref().extension().and_then(OsStr::to_str) {
        Some(ext) if ext.eq_ignore_ascii_case("mat") => SaFormat::Matlab,
        _ => SaFormat::Archive,
    }
}

/// Saves a record, in `format` or the one implied by the extension.
pub fn save_as<P: AsRef<Path>>(
    path: P,
    record: &SaRecord,
    format: Option<SaFormat>,
) -> SaResult<()> {
    match format.unwrap_or_else(|| detect_format_from_extension(&path)) {
        SaFormat::Archive => save_record(path, record),
        SaFormat::Matlab => save_alt(path, record),
    }
}

/// Loads a record, in `format` or the one implied by the extension.
pub fn load_as<P: AsRef<Path>>(path: P, format: Option<SaFormat>) -> SaResult<SaRecord> {
    match format.unwrap_or_else(|| detect_format_from_extension(&path)) {
        SaFormat::Archive => load_record(path),
        SaFormat::Matlab => load_alt(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SaRecord {
        SaRecord {
            pos: vec![0, 3],
            ind: vec![1, 2],
            pos_from_stop: vec![10, 20],
            refs: vec!["a".into(), "b".into()],
            mask: None,
            homologs: None,
        }
    }

    #[test]
    fn test_primary_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.chsa");
        let record = sample();

        save_record(&path, &record).unwrap();
        let arrays = load(&path).unwrap();
        assert_eq!(arrays, record.to_arrays());
        assert_eq!(load_record(&path).unwrap(), record);
    }

    #[test]
    fn test_transient_fields_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.chsa");
        let mut record = sample();
        record.mask = Some(vec![true, false]);
        record.homologs = Some(Array::Int(vec![4, 5]));

        let arrays = record.to_arrays();
        save(&path, &arrays).unwrap();

        // The caller's map still has them
        assert!(arrays.contains_key(FIELD_MASK));
        let loaded = load(&path).unwrap();
        assert!(!loaded.contains_key(FIELD_MASK));
        assert!(!loaded.contains_key(FIELD_HOMOLOGS));
        assert_eq!(loaded, sample().to_arrays());
    }

    #[test]
    fn test_load_is_schema_free() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.chsa");
        let mut arrays = ArrayMap::new();
        arrays.insert("pos".into(), Array::Int(vec![5]));
        arrays.insert("score".into(), Array::Float(vec![0.25]));

        save(&path, &arrays).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded, arrays);

        // Absent fields stay absent rather than defaulted
        assert!(!loaded.contains_key(FIELD_REF));
        assert!(matches!(
            SaRecord::try_from(loaded),
            Err(SaError::MissingField(field)) if field == FIELD_REF
        ));
    }

    #[test]
    fn test_save_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.chsa");
        let second = dir.path().join("second.chsa");
        let arrays = sample().to_arrays();

        save(&first, &arrays).unwrap();
        save(&second, &arrays).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    }

    #[test]
    fn test_field_type_checked() {
        let mut arrays = sample().to_arrays();
        arrays.insert(FIELD_POS.into(), Array::Float(vec![0.0, 3.0]));
        assert!(matches!(
            SaRecord::try_from(arrays),
            Err(SaError::FieldType { expected: "int", found: "float", .. })
        ));
    }

    #[test]
    fn test_alt_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.mat");
        let mut record = sample();
        record.mask = Some(vec![true, true]);

        save_alt(&path, &record).unwrap();
        let loaded = load_alt(&path).unwrap();
        assert_eq!(loaded, sample());
    }

    #[test]
    fn test_alt_matrix_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sa.mat");
        save_alt(&path, &sample()).unwrap();

        let variables = matfile::load_mat(&path).unwrap();
        let names: Vec<&str> = variables.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["SA", "ref"]);

        // Column-major [pos+1, ind+1, 1, pos_from_stop]
        assert_eq!(
            variables[0].1,
            MatArray::matrix(2, 4, vec![1.0, 4.0, 2.0, 3.0, 1.0, 1.0, 10.0, 20.0])
        );
        assert_eq!(variables[1].1.dims(), &[2, 1]);
    }

    #[test]
    fn test_alt_ignores_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.mat");
        let sa = MatArray::matrix(1, 6, vec![8.0, 1.0, 1.0, 42.0, 0.0, 0.0]);
        let refs = MatArray::cell_column(vec![MatArray::char_row("chrX")]);
        matfile::save_mat(&path, &[("ref", &refs), ("SA", &sa)], true).unwrap();

        let record = load_alt(&path).unwrap();
        assert_eq!(record.pos, vec![7]);
        assert_eq!(record.ind, vec![0]);
        assert_eq!(record.pos_from_stop, vec![42]);
        assert_eq!(record.refs, vec!["chrX"]);
    }

    #[test]
    fn test_alt_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mat");

        let mut record = sample();
        record.ind.pop();
        assert!(matches!(
            save_alt(&path, &record),
            Err(SaError::LengthMismatch { field: FIELD_IND, expected: 2, found: 1 })
        ));

        let sa = MatArray::matrix(1, 4, vec![1.5, 1.0, 1.0, 0.0]);
        let refs = MatArray::cell_column(Vec::new());
        matfile::save_mat(&path, &[("SA", &sa), ("ref", &refs)], false).unwrap();
        assert!(matches!(load_alt(&path), Err(SaError::NonIntegral { row: 0, col: 0, .. })));

        let sa = MatArray::matrix(1, 4, vec![1.0, 1.0, 1.0, 0.0]);
        matfile::save_mat(&path, &[("SA", &sa)], false).unwrap();
        assert!(matches!(load_alt(&path), Err(SaError::MissingVariable("ref"))));
    }

    #[test]
    fn test_alt_values_outside_double_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("range.mat");

        let mut record = sample();
        record.pos[1] = i64::MAX;
        assert!(matches!(
            save_alt(&path, &record),
            Err(SaError::OutOfRange { variable: FIELD_POS, row: 1, .. })
        ));

        let mut record = sample();
        record.pos_from_stop[0] = -(1 << 54);
        assert!(matches!(
            save_alt(&path, &record),
            Err(SaError::OutOfRange { variable: FIELD_POS_FROM_STOP, row: 0, .. })
        ));

        // Largest exact value still round-trips
        let mut record = sample();
        record.ind[0] = MAX_EXACT_INT - 1;
        save_alt(&path, &record).unwrap();
        assert_eq!(load_alt(&path).unwrap(), record);

        let refs = MatArray::cell_column(vec![MatArray::char_row("a")]);
        for value in [-1e300, 1e300, 2f64.powi(60)] {
            let sa = MatArray::matrix(1, 4, vec![value, 1.0, 1.0, 0.0]);
            matfile::save_mat(&path, &[("SA", &sa), ("ref", &refs)], false).unwrap();
            assert!(matches!(
                load_alt(&path),
                Err(SaError::OutOfRange { variable: "SA", row: 0, .. })
            ));
        }
    }

    #[test]
    fn test_formats_are_not_interchangeable() {
        let dir = tempfile::tempdir().unwrap();
        let archive_path = dir.path().join("sa.chsa");
        let mat_path = dir.path().join("sa.mat");
        save_record(&archive_path, &sample()).unwrap();
        save_alt(&mat_path, &sample()).unwrap();

        assert!(load_alt(&archive_path).is_err());
        assert!(load(&mat_path).is_err());
    }

    #[test]
    fn test_format_dispatch() {
        assert_eq!(detect_format_from_extension("x.mat"), SaFormat::Matlab);
        assert_eq!(detect_format_from_extension("x.MAT"), SaFormat::Matlab);
        assert_eq!(detect_format_from_extension("x.chsa"), SaFormat::Archive);
        assert_eq!(detect_format_from_extension("x"), SaFormat::Archive);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forced.bin");
        save_as(&path, &sample(), Some(SaFormat::Matlab)).unwrap();
        assert_eq!(load_as(&path, Some(SaFormat::Matlab)).unwrap(), sample());
        assert!(load_as(&path, None).is_err());
    }

    #[test]
    fn test_empty_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mat");
        save_alt(&path, &SaRecord::default()).unwrap();
        assert_eq!(load_alt(&path).unwrap(), SaRecord::default());
    }
}
