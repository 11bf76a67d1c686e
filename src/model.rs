//! Sequence data model.
//!
//! A [`Sequence`] pairs an identifier with its residues. The same type holds
//! nucleotide, amino acid or codon alphabet data; which one is up to the
//! caller.

/// Represents a single sequence with its identifier and data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    /// The sequence identifier (from FASTA header, without '>')
    pub id: String,
    /// The sequence data
    pub data: String,
}

impl Sequence {
    /// Creates a new sequence.
    pub fn new(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
        }
    }

    /// Returns the length of the sequence.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Checks that a sequence only holds A, C, G, T (either case).
///
/// Anything else, including `U`, IUPAC ambiguity codes, gaps and whitespace,
/// invalidates the whole sequence. The empty sequence is valid.
pub fn is_valid_nt(seq: &str) -> bool {
    seq.bytes()
        .all(|b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'a' | b'c' | b'g' | b't'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_creation() {
        let seq = Sequence::new("seq1", "ACGT");
        assert_eq!(seq.id, "seq1");
        assert_eq!(seq.data, "ACGT");
        assert_eq!(seq.len(), 4);
        assert!(!seq.is_empty());
    }

    #[test]
    fn test_nucleotide_validation() {
        assert!(is_valid_nt("ACGTacgt"));
        assert!(is_valid_nt(""));
        assert!(!is_valid_nt("ACGN"));
        assert!(!is_valid_nt("ACGU"));
        assert!(!is_valid_nt("AC-GT"));
        assert!(!is_valid_nt("ACG T"));
    }
}
