//! Batch conversion of sequence collections.
//!
//! A bad sequence never aborts a batch: when validation is on, sequences
//! that are not pure A/C/G/T are skipped and their slot is left empty, so
//! the output lines up index for index with the input.

use tracing::{debug, warn};

use crate::codon::{codon2nt, nt2aa_with_stats, nt2codon_with_stats, CodonError, Conversion};
use crate::genetic_code::STANDARD;
use crate::model::{is_valid_nt, Sequence};

/// Output of a batch conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutput {
    /// One entry per input sequence, `None` where validation rejected it
    pub sequences: Vec<Option<String>>,
    /// Number of sequences rejected by validation
    pub rejected: usize,
    /// Number of ambiguous triplets over all converted sequences
    pub ambiguous: usize,
}

impl BatchOutput {
    /// Returns the number of entries (always the input length).
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// Returns true if the batch was empty.
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Flattens the batch, with an empty string for each rejected sequence.
    pub fn into_strings(self) -> Vec<String> {
        self.sequences
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect()
    }
}

fn convert_batch<S, F>(op: &str, seqs: &[S], validate: bool, convert: F) -> BatchOutput
where
    S: AsRef<str>,
    F: Fn(&str) -> Conversion,
{
    let mut output = BatchOutput {
        sequences: Vec::with_capacity(seqs.len()),
        ..BatchOutput::default()
    };

    for seq in seqs {
        let seq = seq.as_ref();
        if validate && !is_valid_nt(seq) {
            output.rejected += 1;
            output.sequences.push(None);
            continue;
        }
        let converted = convert(seq);
        output.ambiguous += converted.ambiguous;
        output.sequences.push(Some(converted.seq));
    }

    if output.rejected > 0 {
        warn!(
            rejected = output.rejected,
            total = seqs.len(),
            "{}: ignored ambiguous sequences",
            op
        );
    } else {
        debug!(total = seqs.len(), ambiguous = output.ambiguous, "{}: batch converted", op);
    }

    output
}

/// Translates every sequence of a batch to amino acids.
///
/// With `validate`, sequences holding anything but A/C/G/T are left out
/// (their entry is `None`) and counted in [`BatchOutput::rejected`].
pub fn nt2aa_batch<S: AsRef<str>>(seqs: &[S], validate: bool) -> BatchOutput {
    convert_batch("nt2aa", seqs, validate, nt2aa_with_stats)
}

/// Encodes every sequence of a batch in the codon alphabet.
///
/// Validation works as in [`nt2aa_batch`].
pub fn nt2codon_batch<S: AsRef<str>>(seqs: &[S], validate: bool) -> BatchOutput {
    convert_batch("nt2codon", seqs, validate, nt2codon_with_stats)
}

/// Translates FASTA records, one output record per input record.
///
/// Records rejected by validation keep their identifier with an empty body.
/// Returns the translated records and the number of rejected ones.
pub fn nt2aa_records(records: &[Sequence], validate: bool) -> (Vec<Sequence>, usize) {
    let data: Vec<&str> = records.iter().map(|r| r.data.as_str()).collect();
    let batch = nt2aa_batch(&data, validate);
    let rejected = batch.rejected;

    debug!(
        code = STANDARD.name,
        id = STANDARD.id,
        records = records.len(),
        "nt2aa: records translated"
    );
    let translated = records
        .iter()
        .zip(batch.into_strings())
        .map(|(record, protein)| Sequence::new(record.id.clone(), protein))
        .collect();
    (translated, rejected)
}

/// Decodes every sequence of a batch from the codon alphabet.
///
/// Fails on the first out-of-range codepoint, naming the sequence index.
pub fn codon2nt_batch<S: AsRef<str>>(seqs: &[S]) -> Result<Vec<String>, CodonError> {
    seqs.iter()
        .enumerate()
        .map(|(index, seq)| {
            codon2nt(seq.as_ref()).map_err(|source| CodonError::InSequence {
                index,
                source: Box::new(source),
            })
        })
        .collect()
}
