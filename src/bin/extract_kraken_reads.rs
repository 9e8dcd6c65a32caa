use clap::Parser;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;

use kraken_extract_rs::error::Result;
use kraken_extract_rs::extract_reads;
use kraken_extract_rs::fastx::create_writer;
use kraken_extract_rs::filter::{ExtractConfig, DEFAULT_PAIR_PLACEHOLDER};
use kraken_extract_rs::taxdb::parse_taxon_ids;

/// Extract reads classified (or not) to a set of taxa from a FASTA/FASTQ file.
///
/// Selected reads go to stdout (or --output); the per-taxon summary and
/// progress go to stderr.
#[derive(Parser, Debug)]
#[command(name = "extract-kraken-reads")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Comma-separated taxon IDs; `U` selects unclassified reads
    #[arg(value_name = "TAXIDS")]
    taxon_ids: String,

    /// Kraken per-read classification output
    #[arg(value_name = "KRAKEN_OUTPUT")]
    kraken_output: PathBuf,

    /// Read file; in paired mode a template containing the placeholder
    #[arg(value_name = "READS")]
    reads: PathBuf,

    /// Reads are FASTA (implies FASTA output)
    #[arg(short = 'a', long)]
    fasta_input: bool,

    /// Write FASTA instead of FASTQ
    #[arg(short = 'f', long)]
    fasta_output: bool,

    /// Write the reads that did NOT match
    #[arg(short = 'v', long)]
    invert: bool,

    /// Child/parent taxonomy table (or nodes.dmp); also extract descendant taxa
    #[arg(short = 't', long, value_name = "FILE")]
    taxonomy: Option<PathBuf>,

    /// Paired-end reads: the placeholder in READS is replaced with 1 and 2
    #[arg(short = 'p', long)]
    paired: bool,

    /// Placeholder character for --paired
    #[arg(long, default_value_t = DEFAULT_PAIR_PLACEHOLDER)]
    placeholder: char,

    /// Write reads here instead of stdout (`.gz` compresses)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Debug logging
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> Result<ExtractConfig> {
        let taxon_ids = parse_taxon_ids(&[self.taxon_ids])?;
        let mut config = ExtractConfig::new(taxon_ids, self.kraken_output, self.reads);
        config.fasta_input = self.fasta_input;
        config.fasta_output = self.fasta_output;
        config.invert = self.invert;
        config.taxonomy = self.taxonomy;
        config.paired = self.paired;
        config.placeholder = self.placeholder;
        config.output = self.output;
        Ok(config)
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config()?;
    config.validate()?;

    let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&[
                "⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏",
            ])
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Extracting reads...");

    let mut out = create_writer(config.output.as_deref())?;
    let summary = extract_reads(&config, &mut out, spinner)?;
    out.finish()?;

    eprintln!("{summary}");
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
