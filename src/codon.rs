//! Codon alphabet encoding.
//!
//! Every one of the 64 nucleotide triplets is given a single character, so
//! that codon-level sequences can go through ordinary string algorithms
//! (suffix arrays, longest common substring, pattern search) without any
//! triplet-aware indexing.
//!
//! ## Alphabet
//!
//! The character of a triplet is the one whose codepoint equals the rank of
//! the triplet among the 64 ASCII-sorted triplets, plus one:
//!
//! ```text
//! AAA -> \u{01}   AAC -> \u{02}   ...   TTT -> \u{40}
//! ```
//!
//! Codepoint 0 stands for an unknown triplet and decodes to `NNN`. These
//! codepoints must never change: persisted codon sequences depend on them.

use std::fmt;

use thiserror::Error;
use tracing::warn;

use crate::genetic_code::STANDARD;

/// Number of distinct triplets over A/C/G/T.
pub const CODON_COUNT: usize = 64;

/// Codon alphabet character for a triplet that is not a valid codon.
pub const UNKNOWN_SYMBOL: char = '\0';

/// Triplet produced when decoding [`UNKNOWN_SYMBOL`].
pub const UNKNOWN_TRIPLET: &str = "NNN";

const BASES: [u8; 4] = *b"ACGT";

/// Errors raised while decoding codon alphabet sequences.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodonError {
    #[error("Codepoint {codepoint} at position {position} is outside the codon alphabet (0-64)")]
    InvalidCodepoint { position: usize, codepoint: u32 },

    #[error("Sequence {index}: {source}")]
    InSequence {
        index: usize,
        #[source]
        source: Box<CodonError>,
    },
}

/// Result of a sequence conversion that may meet untranslatable triplets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversion {
    /// The converted sequence
    pub seq: String,
    /// Number of triplets replaced by a sentinel
    pub ambiguous: usize,
}

impl Conversion {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            seq: String::with_capacity(capacity),
            ambiguous: 0,
        }
    }
}

/// One of the 64 unambiguous codons, identified by its rank in sorted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Codon(u8);

impl Codon {
    /// Codon with the given rank (0 = `AAA`, 63 = `TTT`).
    pub const fn from_rank(rank: u8) -> Option<Self> {
        if (rank as usize) < CODON_COUNT {
            Some(Self(rank))
        } else {
            None
        }
    }

    /// Parses a triplet. Case-insensitive, `U` is read as `T`.
    pub fn from_triplet(triplet: &[u8]) -> Option<Self> {
        match triplet {
            [b1, b2, b3] => {
                let rank = base_index(*b1)? * 16 + base_index(*b2)? * 4 + base_index(*b3)?;
                Some(Self(rank))
            }
            _ => None,
        }
    }

    /// Reads a codon alphabet character.
    ///
    /// Returns `None` for [`UNKNOWN_SYMBOL`] and for anything above the
    /// alphabet range.
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol as u32 {
            cp @ 1..=64 => Codon::from_rank(cp as u8 - 1),
            _ => None,
        }
    }

    /// Rank of the codon among the sorted triplets.
    pub const fn rank(self) -> u8 {
        self.0
    }

    /// Codon alphabet character of this codon.
    pub const fn symbol(self) -> char {
        (self.0 + 1) as char
    }

    /// Upper-case DNA triplet of this codon.
    pub const fn triplet(self) -> [u8; 3] {
        let r = self.0 as usize;
        [BASES[r / 16], BASES[(r / 4) % 4], BASES[r % 4]]
    }

    /// All 64 codons in rank order.
    pub fn all() -> impl Iterator<Item = Codon> {
        (0..CODON_COUNT as u8).map(Codon)
    }
}

impl fmt::Display for Codon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for base in self.triplet() {
            write!(f, "{}", base as char)?;
        }
        Ok(())
    }
}

#[inline]
fn base_index(base: u8) -> Option<u8> {
    match base {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' | b'U' | b'u' => Some(3),
        _ => None,
    }
}

/// Splits a sequence into complete triplets, dropping a trailing partial one.
///
/// Works on characters, not bytes: a non-ASCII character takes one position
/// and can never be part of a valid codon.
pub(crate) fn triplets(seq: &str) -> impl Iterator<Item = [u8; 3]> + '_ {
    let mut bases = seq
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'N' });
    std::iter::from_fn(move || Some([bases.next()?, bases.next()?, bases.next()?]))
}

/// Parses a nucleotide sequence into codons, `None` for ambiguous triplets.
pub fn codons(seq: &str) -> impl Iterator<Item = Option<Codon>> + '_ {
    triplets(seq).map(|triplet| Codon::from_triplet(&triplet))
}

/// Translates a nucleotide sequence, reporting the number of `X` positions.
pub fn nt2aa_with_stats(seq: &str) -> Conversion {
    STANDARD.translate(seq)
}

/// Translates a nucleotide sequence to amino acids.
///
/// Case-insensitive, `U` is read as `T`, partial trailing codons are dropped,
/// ambiguous triplets become `X`. The ambiguity count is logged, never fatal.
///
/// ```
/// assert_eq!(chimera::codon::nt2aa("ATGAAATAG"), "MK*");
/// ```
pub fn nt2aa(seq: &str) -> String {
    let result = nt2aa_with_stats(seq);
    if result.ambiguous > 0 {
        warn!(ambiguous = result.ambiguous, "nt2aa: ignored ambiguous codons");
    }
    result.seq
}

/// Encodes a nucleotide sequence in the codon alphabet, reporting the number
/// of [`UNKNOWN_SYMBOL`] positions.
pub fn nt2codon_with_stats(seq: &str) -> Conversion {
    let mut result = Conversion::with_capacity(seq.len() / 3);
    for codon in codons(seq) {
        match codon {
            Some(codon) => result.seq.push(codon.symbol()),
            None => {
                result.seq.push(UNKNOWN_SYMBOL);
                result.ambiguous += 1;
            }
        }
    }
    result
}

/// Encodes a nucleotide sequence in the codon alphabet.
///
/// Same input rules as [`nt2aa`]; ambiguous triplets become [`UNKNOWN_SYMBOL`].
pub fn nt2codon(seq: &str) -> String {
    let result = nt2codon_with_stats(seq);
    if result.ambiguous > 0 {
        warn!(ambiguous = result.ambiguous, "nt2codon: ignored ambiguous codons");
    }
    result.seq
}

/// Decodes a codon alphabet sequence back to nucleotides.
///
/// [`UNKNOWN_SYMBOL`] decodes to `NNN`. Any codepoint above 64 is an error.
pub fn codon2nt(seq: &str) -> Result<String, CodonError> {
    let mut nt = String::with_capacity(seq.len() * 3);
    for (position, symbol) in seq.chars().enumerate() {
        if symbol == UNKNOWN_SYMBOL {
            nt.push_str(UNKNOWN_TRIPLET);
            continue;
        }
        let codon = Codon::from_symbol(symbol).ok_or(CodonError::InvalidCodepoint {
            position,
            codepoint: symbol as u32,
        })?;
        nt.extend(codon.triplet().iter().map(|&b| b as char));
    }
    Ok(nt)
}
