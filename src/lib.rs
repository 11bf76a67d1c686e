//! # Chimera - codon alphabet and SA persistence
//!
//! Building blocks for codon-level sequence design pipelines.
//!
//! ## Architecture
//!
//! - `genetic_code`: the standard genetic code, computed at compile time
//! - `codon`: nucleotide to amino acid translation and the 64-letter codon alphabet
//! - `batch`: conversion of sequence collections with per-sequence validation
//! - `model`: sequence records and nucleotide alphabet checks
//! - `fasta`: FASTA reading and writing
//! - `sa`: saving and loading suffix-array records (archive and MAT-file formats)
//! - `utils`: random sequences, block sampling and sequence comparison
//!
//! ## Quick Start
//!
//! ```
//! use chimera::codon::{codon2nt, nt2aa, nt2codon};
//!
//! assert_eq!(nt2aa("ATGAAATAG"), "MK*");
//! let encoded = nt2codon("ATGAAATAG");
//! assert_eq!(codon2nt(&encoded).unwrap(), "ATGAAATAG");
//! ```

pub mod batch;
pub mod codon;
pub mod fasta;
pub mod genetic_code;
pub mod model;
pub mod sa;
pub mod utils;
