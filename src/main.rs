//! Chimera - codon translation and SA file tools
//!
//! ## Usage
//!
//! ```bash
//! chimera translate genes.fasta -o proteins.fasta
//! chimera random -n 10 -l 300 --seed 7
//! chimera compare pair.fasta
//! chimera sa convert index.sa index.mat
//! chimera sa inspect index.mat
//! ```

// Use jemalloc for better memory management (returns memory to OS)
#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, Level};

use chimera::batch::nt2aa_records;
use chimera::fasta::{parse_fasta_file, write_fasta};
use chimera::model::Sequence;
use chimera::sa::{self, ArrayMap, SaFormat};
use chimera::utils::{compare_seq, rand_seq, DEFAULT_SEED};

/// SA file format for command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    /// Compressed named-array archive
    Archive,
    /// MATLAB Level 5 MAT-file
    Mat,
    /// Detect from extension (.mat is a MAT-file)
    Auto,
}

impl From<FormatArg> for Option<SaFormat> {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Archive => Some(SaFormat::Archive),
            FormatArg::Mat => Some(SaFormat::Matlab),
            FormatArg::Auto => None,
        }
    }
}

/// Chimera - codon-level sequence tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Translate every record of a nucleotide FASTA file to amino acids
    Translate {
        /// Nucleotide FASTA file
        file: PathBuf,

        /// Output file. Use "-" for stdout.
        #[arg(short = 'o', long = "output", default_value = "-")]
        output: String,

        /// Translate records with non-ACGT characters (ambiguous codons become X)
        /// instead of writing them with an empty sequence
        #[arg(long = "no-validate")]
        no_validate: bool,
    },

    /// Generate random nucleotide sequences
    Random {
        /// Number of sequences
        #[arg(short = 'n', long = "count", default_value = "1")]
        count: usize,

        /// Length of each sequence
        #[arg(short = 'l', long = "length")]
        length: usize,

        /// Random seed
        #[arg(long = "seed", default_value_t = DEFAULT_SEED)]
        seed: u64,

        /// Output file. Use "-" for stdout.
        #[arg(short = 'o', long = "output", default_value = "-")]
        output: String,
    },

    /// List the positions where the first two records of a FASTA file differ
    Compare {
        /// FASTA file with at least two records
        file: PathBuf,
    },

    /// Suffix-array record files
    #[command(subcommand)]
    Sa(SaCommand),
}

#[derive(Subcommand, Debug)]
enum SaCommand {
    /// Convert an SA record between the archive and MAT-file formats
    Convert {
        /// Input SA file
        input: PathBuf,

        /// Output SA file
        output: PathBuf,

        /// Input format
        #[arg(long = "from", value_enum, default_value = "auto")]
        from: FormatArg,

        /// Output format
        #[arg(long = "to", value_enum, default_value = "auto")]
        to: FormatArg,
    },

    /// Print the fields stored in an SA file
    Inspect {
        /// SA file
        input: PathBuf,

        /// File format
        #[arg(short = 'f', long = "format", value_enum, default_value = "auto")]
        format: FormatArg,
    },
}

/// Opens `output` for writing, "-" meaning stdout.
fn open_output(output: &str) -> Result<Box<dyn Write>> {
    if output == "-" {
        Ok(Box::new(BufWriter::new(io::stdout().lock())))
    } else {
        let file = File::create(output).with_context(|| format!("Cannot create {}", output))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

fn write_sequences(output: &str, sequences: &[Sequence]) -> Result<()> {
    let mut writer = open_output(output)?;
    write_fasta(&mut writer, sequences)?;

    if output != "-" {
        eprintln!("Wrote {} sequences to {}", sequences.len(), output);
    }
    Ok(())
}

fn run_translate(file: &Path, output: &str, validate: bool) -> Result<()> {
    let records = parse_fasta_file(file)?;
    let (translated, rejected) = nt2aa_records(&records, validate);

    if rejected > 0 {
        eprintln!("Left {} of {} records empty (non-ACGT characters)", rejected, records.len());
    }

    write_sequences(output, &translated)
}

fn run_random(count: usize, length: usize, seed: u64, output: &str) -> Result<()> {
    if length == 0 {
        bail!("Sequence length must be at least 1");
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let sequences: Vec<Sequence> = (1..=count)
        .map(|i| Sequence::new(format!("random_{}", i), rand_seq(&mut rng, length)))
        .collect();

    info!(count, length, seed, "generated random sequences");
    write_sequences(output, &sequences)
}

fn run_compare(file: &Path) -> Result<()> {
    let records = parse_fasta_file(file)?;
    let [first, second, ..] = records.as_slice() else {
        bail!("Need at least two records to compare (found {})", records.len());
    };

    if first.len() != second.len() {
        eprintln!(
            "Warning: lengths differ ({} vs {}), comparing the first {} positions",
            first.len(),
            second.len(),
            first.len().min(second.len())
        );
    }

    let edits = compare_seq(&first.data, &second.data);
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    for edit in &edits {
        writeln!(handle, "{}\t{}\t{}", edit.pos + 1, edit.from, edit.to)?;
    }
    eprintln!("{} differences between {} and {}", edits.len(), first.id, second.id);
    Ok(())
}

fn run_sa_convert(input: &Path, output: &Path, from: FormatArg, to: FormatArg) -> Result<()> {
    let record = sa::load_as(input, from.into())
        .with_context(|| format!("Cannot load SA record from {}", input.display()))?;
    sa::save_as(output, &record, to.into())
        .with_context(|| format!("Cannot save SA record to {}", output.display()))?;

    let target: Option<SaFormat> = to.into();
    eprintln!(
        "Wrote {} SA entries to {} ({})",
        record.len(),
        output.display(),
        target.unwrap_or_else(|| sa::detect_format_from_extension(output))
    );
    Ok(())
}

fn run_sa_inspect(input: &Path, format: FormatArg) -> Result<()> {
    let format = Option::<SaFormat>::from(format)
        .unwrap_or_else(|| sa::detect_format_from_extension(input));

    // MAT-files only carry the record layout, archives can hold any fields
    let arrays: ArrayMap = match format {
        SaFormat::Archive => sa::load(input)?,
        SaFormat::Matlab => sa::load_alt(input)?.to_arrays(),
    };

    println!("{} ({}, {} fields)", input.display(), format, arrays.len());
    for (name, array) in &arrays {
        println!("  {:<16} {:<6} {}", name, array.type_name(), array.len());
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Translate {
            file,
            output,
            no_validate,
        } => run_translate(&file, &output, !no_validate),
        Command::Random {
            count,
            length,
            seed,
            output,
        } => run_random(count, length, seed, &output),
        Command::Compare { file } => run_compare(&file),
        Command::Sa(SaCommand::Convert {
            input,
            output,
            from,
            to,
        }) => run_sa_convert(&input, &output, from, to),
        Command::Sa(SaCommand::Inspect { input, format }) => run_sa_inspect(&input, format),
    }
}
