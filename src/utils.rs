//! Sequence utilities: random sequences, sampling of synonymous variants
//! and position-wise comparison.

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Seed used when sampling without an explicit one.
pub const DEFAULT_SEED: u64 = 42;

const NUCLEOTIDES: [char; 4] = ['A', 'C', 'G', 'T'];

/// Errors raised while sampling sequences from blocks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SampleError {
    #[error("Block {0} has no alternative to choose from")]
    EmptyBlock(usize),
}

/// One position where two sequences differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    /// Zero-based position
    pub pos: usize,
    /// Character in the first sequence
    pub from: char,
    /// Character in the second sequence
    pub to: char,
}

/// Draws a uniform random nucleotide sequence of length `n`.
pub fn rand_seq<R: Rng + ?Sized>(rng: &mut R, n: usize) -> String {
    (0..n)
        .map(|_| NUCLEOTIDES[rng.random_range(0..NUCLEOTIDES.len())])
        .collect()
}

/// Builds `n` sequences by concatenating one randomly chosen alternative
/// from each block.
///
/// Blocks are typically sets of synonymous encodings of the same peptide
/// segment. The same seed always yields the same sequences.
pub fn sample_seqs_from_blocks<S: AsRef<str>>(
    blocks: &[Vec<S>],
    n: usize,
    seed: u64,
) -> Result<Vec<String>, SampleError> {
    if let Some(index) = blocks.iter().position(Vec::is_empty) {
        return Err(SampleError::EmptyBlock(index));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let seqs = (0..n)
        .map(|_| {
            let mut seq = String::new();
            for block in blocks {
                if let Some(alt) = block.choose(&mut rng) {
                    seq.push_str(alt.as_ref());
                }
            }
            seq
        })
        .collect();
    Ok(seqs)
}

/// Lists the positions where two sequences differ.
///
/// Meant for sequences of equal length; extra characters of the longer one
/// are not reported.
pub fn compare_seq(seq1: &str, seq2: &str) -> Vec<Edit> {
    seq1.chars()
        .zip(seq2.chars())
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(pos, (from, to))| Edit { pos, from, to })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::is_valid_nt;

    #[test]
    fn test_rand_seq() {
        let mut rng = StdRng::seed_from_u64(DEFAULT_SEED);
        let seq = rand_seq(&mut rng, 300);
        assert_eq!(seq.len(), 300);
        assert!(is_valid_nt(&seq));
        assert!(NUCLEOTIDES.iter().all(|&n| seq.contains(n)));
        assert_eq!(rand_seq(&mut rng, 0), "");
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let blocks = vec![
            vec!["ATG"],
            vec!["AAA", "AAG"],
            vec!["GCT", "GCC", "GCA", "GCG"],
            vec!["TAA", "TAG", "TGA"],
        ];
        let first = sample_seqs_from_blocks(&blocks, 20, 7).unwrap();
        let second = sample_seqs_from_blocks(&blocks, 20, 7).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 20);

        for seq in &first {
            assert_eq!(seq.len(), 12);
            assert!(seq.starts_with("ATG"));
            assert_eq!(crate::codon::nt2aa(seq), "MKA*");
        }
    }

    #[test]
    fn test_sampling_rejects_empty_block() {
        let blocks: Vec<Vec<String>> = vec![vec!["ATG".into()], Vec::new()];
        assert_eq!(
            sample_seqs_from_blocks(&blocks, 3, DEFAULT_SEED),
            Err(SampleError::EmptyBlock(1))
        );
    }

    #[test]
    fn test_compare_seq() {
        let edits = compare_seq("ACGTAC", "ACCTAG");
        assert_eq!(
            edits,
            vec![
                Edit {
                    pos: 2,
                    from: 'G',
                    to: 'C',
                },
                Edit {
                    pos: 5,
                    from: 'C',
                    to: 'G',
                },
            ]
        );
        assert!(compare_seq("ACGT", "ACGT").is_empty());
        assert!(compare_seq("ACGT", "AC").is_empty());
    }
}
