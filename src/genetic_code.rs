//! Genetic code definition and translation logic.
//!
//! This module provides:
//! - The standard genetic code (NCBI table 1), stored by codon rank
//! - Codon to amino acid translation
//! - Whole-sequence translation with ambiguity accounting

use crate::codon::{triplets, Codon, Conversion, CODON_COUNT};

/// Amino acid symbol used for triplets that cannot be translated.
pub const AMBIGUOUS_AA: char = 'X';

/// Amino acid symbol for stop codons.
pub const STOP: char = '*';

/// Base order used by NCBI `ncbieaa` strings, mapped from our A/C/G/T order.
const ACGT_TO_TCAG: [usize; 4] = [2, 1, 3, 0];

/// Reorders an NCBI table (T/C/A/G per position) into codon rank order
/// (A/C/G/T per position, i.e. ASCII-sorted triplets).
const fn ncbi_to_rank_order(ncbieaa: &[u8; CODON_COUNT]) -> [u8; CODON_COUNT] {
    let mut table = [0u8; CODON_COUNT];
    let mut rank = 0;
    while rank < CODON_COUNT {
        let ncbi = 16 * ACGT_TO_TCAG[rank / 16]
            + 4 * ACGT_TO_TCAG[(rank / 4) % 4]
            + ACGT_TO_TCAG[rank % 4];
        table[rank] = ncbieaa[ncbi];
        rank += 1;
    }
    table
}

/// A genetic code table for translating codons to amino acids.
#[derive(Debug, Clone, Copy)]
pub struct GeneticCode {
    /// NCBI genetic code ID
    pub id: u8,
    /// Name of the genetic code
    pub name: &'static str,
    /// Amino acid per codon rank
    table: [u8; CODON_COUNT],
}

/// The standard genetic code, shared by every translation in the crate.
pub static STANDARD: GeneticCode = GeneticCode::from_ncbi(
    1,
    "Standard",
    b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG",
);

impl GeneticCode {
    /// Creates a genetic code from an NCBI `ncbieaa` string.
    ///
    /// # Arguments
    /// * `id` - NCBI genetic code ID
    /// * `name` - Name of the genetic code
    /// * `ncbieaa` - 64 amino acids in NCBI order (TTT, TTC, TTA, TTG, TCT, ...)
    pub const fn from_ncbi(id: u8, name: &'static str, ncbieaa: &[u8; CODON_COUNT]) -> Self {
        Self {
            id,
            name,
            table: ncbi_to_rank_order(ncbieaa),
        }
    }

    /// Amino acid encoded by a codon.
    pub fn amino_acid(&self, codon: Codon) -> char {
        self.table[codon.rank() as usize] as char
    }

    /// Translates a single triplet.
    ///
    /// Case-insensitive, `U` is read as `T`. Returns `None` when the triplet
    /// holds anything other than A, C, G, T/U.
    pub fn translate_codon(&self, triplet: &[u8]) -> Option<char> {
        Codon::from_triplet(triplet).map(|codon| self.amino_acid(codon))
    }

    /// Translates a nucleotide sequence in frame +1.
    ///
    /// Trailing partial codons are dropped. Untranslatable triplets become
    /// [`AMBIGUOUS_AA`] and are counted in [`Conversion::ambiguous`].
    pub fn translate(&self, sequence: &str) -> Conversion {
        let mut result = Conversion::with_capacity(sequence.len() / 3);
        for triplet in triplets(sequence) {
            match self.translate_codon(&triplet) {
                Some(aa) => result.seq.push(aa),
                None => {
                    result.seq.push(AMBIGUOUS_AA);
                    result.ambiguous += 1;
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Standard code written out in ASCII-sorted triplet order (AAA..TTT).
    const SORTED_STANDARD: &str =
        "KNKNTTTTRSRSIIMIQHQHPPPPRRRRLLLLEDEDAAAAGGGGVVVV*Y*YSSSS*CWCLFLF";

    #[test]
    fn test_all_64_codons() {
        for (codon, expected) in Codon::all().zip(SORTED_STANDARD.chars()) {
            assert_eq!(STANDARD.amino_acid(codon), expected, "codon {}", codon);
        }
        assert_eq!(Codon::all().count(), 64);
    }

    #[test]
    fn test_standard_code_translation() {
        assert_eq!(STANDARD.translate_codon(b"ATG"), Some('M'));
        assert_eq!(STANDARD.translate_codon(b"TAA"), Some(STOP));
        assert_eq!(STANDARD.translate_codon(b"TAG"), Some(STOP));
        assert_eq!(STANDARD.translate_codon(b"TGA"), Some(STOP));
        assert_eq!(STANDARD.translate_codon(b"TTT"), Some('F'));
        assert_eq!(STANDARD.translate_codon(b"GGG"), Some('G'));
    }

    #[test]
    fn test_rna_and_case() {
        assert_eq!(STANDARD.translate_codon(b"AUG"), Some('M'));
        assert_eq!(STANDARD.translate_codon(b"uuu"), Some('F'));
        assert_eq!(STANDARD.translate_codon(b"AtG"), Some('M'));
    }

    #[test]
    fn test_ambiguous_nucleotides() {
        assert_eq!(STANDARD.translate_codon(b"ATN"), None);
        assert_eq!(STANDARD.translate_codon(b"CTR"), None);
        assert_eq!(STANDARD.translate_codon(b"A-G"), None);
        assert_eq!(STANDARD.translate_codon(b"AT"), None);
    }

    #[test]
    fn test_sequence_translation() {
        let result = STANDARD.translate("ATGTTTTAG");
        assert_eq!(result.seq, "MF*");
        assert_eq!(result.ambiguous, 0);

        // AAT GTT TTA G -> incomplete G dropped
        assert_eq!(STANDARD.translate("AATGTTTTAG").seq, "NVL");

        let result = STANDARD.translate("ATGNNNTAGRR");
        assert_eq!(result.seq, "MX*");
        assert_eq!(result.ambiguous, 1);
    }
}
