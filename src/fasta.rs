//! FASTA reading and writing.
//!
//! Handles single-line and multi-line records:
//!
//! ```text
//! >sequence_identifier optional description
//! ACGTACGTACGT...
//! >another_sequence
//! TGCATGCATGCA...
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use thiserror::Error;

use crate::model::Sequence;

/// Errors that can occur during FASTA parsing.
#[derive(Error, Debug)]
pub enum FastaError {
    #[error("Failed to read FASTA: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Empty FASTA file")]
    EmptyFile,

    #[error("Invalid FASTA format: {0}")]
    InvalidFormat(String),

    #[error("Sequence without header at line {0}")]
    SequenceWithoutHeader(usize),
}

/// Result type for FASTA operations.
pub type FastaResult<T> = Result<T, FastaError>;

/// Parses a FASTA file.
///
/// ```no_run
/// use chimera::fasta::parse_fasta_file;
///
/// let records = parse_fasta_file("cds.fasta").unwrap();
/// println!("Loaded {} sequences", records.len());
/// ```
pub fn parse_fasta_file<P: AsRef<Path>>(path: P) -> FastaResult<Vec<Sequence>> {
    let file = File::open(path)?;
    parse_fasta(BufReader::new(file))
}

/// Parses FASTA content from a reader.
///
/// Records with an empty body are kept: batch conversions must see every
/// record to keep output aligned with input.
pub fn parse_fasta<R: BufRead>(reader: R) -> FastaResult<Vec<Sequence>> {
    let mut sequences = Vec::new();
    let mut current: Option<Sequence> = None;

    for (index, line_result) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line_result?;
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('>') {
            sequences.extend(current.take());

            // Identifier is everything before the first space
            let id = header.split_whitespace().next().unwrap_or_default();
            if id.is_empty() {
                return Err(FastaError::InvalidFormat(format!(
                    "Empty sequence identifier at line {}",
                    line_number
                )));
            }
            current = Some(Sequence::new(id, String::new()));
        } else {
            let record = current
                .as_mut()
                .ok_or(FastaError::SequenceWithoutHeader(line_number))?;
            record
                .data
                .extend(line.chars().filter(|c| !c.is_whitespace()));
        }
    }

    sequences.extend(current);

    if sequences.is_empty() {
        return Err(FastaError::EmptyFile);
    }
    Ok(sequences)
}

/// Parses FASTA content from a string.
pub fn parse_fasta_str(content: &str) -> FastaResult<Vec<Sequence>> {
    parse_fasta(content.as_bytes())
}

/// Writes records as single-line FASTA.
pub fn write_fasta<W: Write>(mut writer: W, sequences: &[Sequence]) -> std::io::Result<()> {
    for seq in sequences {
        writeln!(writer, ">{}", seq.id)?;
        writeln!(writer, "{}", seq.data)?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_fasta() {
        let records = parse_fasta_str(">seq1\nACGT\n>seq2\nTGCA\n").unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], Sequence::new("seq1", "ACGT"));
        assert_eq!(records[1], Sequence::new("seq2", "TGCA"));
    }

    #[test]
    fn test_parse_multiline_sequence() {
        let records = parse_fasta_str(">seq1 some description\nACGT\nTGCA\nAAAA\n").unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "seq1");
        assert_eq!(records[0].data, "ACGTTGCAAAAA");
    }

    #[test]
    fn test_empty_record_kept() {
        let records = parse_fasta_str(">seq1\n\n>seq2\nTG CA\n").unwrap();

        assert_eq!(records.len(), 2);
        assert!(records[0].is_empty());
        assert_eq!(records[1].data, "TGCA");
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse_fasta_str(""), Err(FastaError::EmptyFile)));
        assert!(matches!(
            parse_fasta_str("ACGT\n>seq1\nTGCA\n"),
            Err(FastaError::SequenceWithoutHeader(1))
        ));
        assert!(matches!(
            parse_fasta_str(">\nACGT\n"),
            Err(FastaError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_write_then_parse() {
        let records = vec![Sequence::new("a", "acgt"), Sequence::new("b", "MK*")];
        let mut buffer = Vec::new();
        write_fasta(&mut buffer, &records).unwrap();

        assert_eq!(String::from_utf8(buffer.clone()).unwrap(), ">a\nacgt\n>b\nMK*\n");
        assert_eq!(parse_fasta(buffer.as_slice()).unwrap(), records);
    }
}
