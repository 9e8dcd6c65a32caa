//src/filter.rs

use indicatif::ProgressBar;
use std::io::Write;
use std::path::PathBuf;

use crate::error::{ExtractError, Result};
use crate::fastx::mate_paths;
use crate::kraken_output::Verdicts;
use crate::types::{SeqFormat, SequenceRecord, TaxonSet};

/// Emitted records between progress updates.
pub const PROGRESS_INTERVAL: u64 = 100;

/// Placeholder substituted with `1`/`2` in paired read paths.
pub const DEFAULT_PAIR_PLACEHOLDER: char = '#';

/// Everything one extraction run needs, as assembled by the CLI.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub taxon_ids: TaxonSet,
    pub kraken_output: PathBuf,
    /// Read file, or the mate path template in paired mode.
    pub reads: PathBuf,
    pub fasta_input: bool,
    pub fasta_output: bool,
    pub invert: bool,
    /// Child/parent table; when set the requested taxa are expanded to their subtrees.
    pub taxonomy: Option<PathBuf>,
    pub paired: bool,
    pub placeholder: char,
    /// `None` writes to stdout.
    pub output: Option<PathBuf>,
}

impl ExtractConfig {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(taxon_ids: TaxonSet, kraken_output: P, reads: Q) -> Self {
        ExtractConfig {
            taxon_ids,
            kraken_output: kraken_output.into(),
            reads: reads.into(),
            fasta_input: false,
            fasta_output: false,
            invert: false,
            taxonomy: None,
            paired: false,
            placeholder: DEFAULT_PAIR_PLACEHOLDER,
            output: None,
        }
    }

    /// Rejects option combinations that cannot work. Runs before any file is opened.
    pub fn validate(&self) -> Result<()> {
        if self.taxon_ids.is_empty() {
            return Err(ExtractError::Configuration("no taxon IDs given".to_string()));
        }
        if self.paired && self.fasta_input {
            return Err(ExtractError::Configuration(
                "FASTA input cannot be combined with paired-end mode".to_string(),
            ));
        }
        if self.paired {
            mate_paths(&self.reads, self.placeholder)?;
        }
        Ok(())
    }

    pub fn input_format(&self) -> SeqFormat {
        if self.fasta_input {
            SeqFormat::Fasta
        } else {
            SeqFormat::Fastq
        }
    }

    pub fn output_format(&self) -> SeqFormat {
        effective_output_format(self.input_format(), self.fasta_output)
    }

    /// One path in single mode, both mates in paired mode.
    pub fn read_paths(&self) -> Result<Vec<PathBuf>> {
        if self.paired {
            let (mate1, mate2) = mate_paths(&self.reads, self.placeholder)?;
            Ok(vec![mate1, mate2])
        } else {
            Ok(vec![self.reads.clone()])
        }
    }
}

/// FASTA input has no qualities, so it always yields FASTA.
pub fn effective_output_format(input: SeqFormat, fasta_output: bool) -> SeqFormat {
    match input {
        SeqFormat::Fasta => SeqFormat::Fasta,
        SeqFormat::Fastq if fasta_output => SeqFormat::Fasta,
        SeqFormat::Fastq => SeqFormat::Fastq,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterStats {
    /// Records (pairs in paired mode) pulled from the input.
    pub records_seen: u64,
    /// Records (pairs in paired mode) written.
    pub records_emitted: u64,
    /// Pairs whose mate IDs disagreed.
    pub mate_mismatches: u64,
}

/// Streams reads and writes the ones whose ID is (or, inverted, is not)
/// in the verdict map.
pub struct RecordFilter<'a> {
    verdicts: &'a Verdicts,
    invert: bool,
    output_format: SeqFormat,
    limit: Option<u64>,
    progress: ProgressBar,
}

impl<'a> RecordFilter<'a> {
    /// Without inversion the scan stops as soon as every matched read has
    /// been written.
    pub fn new(verdicts: &'a Verdicts, invert: bool, output_format: SeqFormat) -> Self {
        let limit = if invert {
            None
        } else {
            Some(verdicts.total_matched())
        };
        RecordFilter {
            verdicts,
            invert,
            output_format,
            limit,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn should_emit(&self, read_id: &str) -> bool {
        self.verdicts.contains(read_id) ^ self.invert
    }

    fn limit_reached(&self, emitted: u64) -> bool {
        self.limit.is_some_and(|limit| emitted >= limit)
    }

    fn tick(&self, emitted: u64) {
        if emitted % PROGRESS_INTERVAL == 0 {
            self.progress.set_position(emitted);
            self.progress.set_message(format!("{emitted} reads written"));
        }
    }

    pub fn run_single<I, W>(&self, reads: I, out: &mut W) -> Result<FilterStats>
    where
        I: IntoIterator<Item = Result<SequenceRecord>>,
        W: Write,
    {
        let mut stats = FilterStats::default();

        for record in reads {
            if self.limit_reached(stats.records_emitted) {
                log::debug!("All {} matched reads written, stopping early", stats.records_emitted);
                break;
            }
            let record = record?;
            stats.records_seen += 1;

            if self.should_emit(&record.id) {
                self.write_record(out, &record)?;
                stats.records_emitted += 1;
                self.tick(stats.records_emitted);
            }
        }

        self.finish(&stats);
        Ok(stats)
    }

    /// Pulls one record from each mate stream per step; the pair is kept or
    /// dropped on the first mate's ID.
    pub fn run_paired<I, J, W>(&self, mates1: I, mates2: J, out: &mut W) -> Result<FilterStats>
    where
        I: IntoIterator<Item = Result<SequenceRecord>>,
        J: IntoIterator<Item = Result<SequenceRecord>>,
        W: Write,
    {
        let mut stats = FilterStats::default();
        let mut mates1 = mates1.into_iter();
        let mut mates2 = mates2.into_iter();

        loop {
            if self.limit_reached(stats.records_emitted) {
                log::debug!("All {} matched pairs written, stopping early", stats.records_emitted);
                break;
            }
            let (first, second) = match (mates1.next().transpose()?, mates2.next().transpose()?) {
                (Some(first), Some(second)) => (first, second),
                (None, None) => break,
                (Some(first), None) => {
                    log::warn!("Mate 2 file ended before mate 1 at read {:?}", first.id);
                    break;
                }
                (None, Some(second)) => {
                    log::warn!("Mate 1 file ended before mate 2 at read {:?}", second.id);
                    break;
                }
            };
            stats.records_seen += 1;
            if first.id != second.id {
                log::debug!("Mate IDs differ: {:?} / {:?}", first.id, second.id);
                stats.mate_mismatches += 1;
            }

            if self.should_emit(&first.id) {
                self.write_record(out, &first)?;
                self.write_mate(out, &first.id, &second)?;
                stats.records_emitted += 1;
                self.tick(stats.records_emitted);
            }
        }

        if stats.mate_mismatches > 0 {
            log::warn!("{} read pairs had differing mate IDs", stats.mate_mismatches);
        }
        self.finish(&stats);
        Ok(stats)
    }

    fn finish(&self, stats: &FilterStats) {
        self.progress.set_position(stats.records_emitted);
        self.progress
            .finish_with_message(format!("{} reads written", stats.records_emitted));
        log::info!(
            "Scanned {} records, wrote {}",
            stats.records_seen,
            stats.records_emitted
        );
    }

    fn write_record<W: Write>(&self, out: &mut W, record: &SequenceRecord) -> Result<()> {
        match self.output_format {
            SeqFormat::Fasta => write_fasta(out, &record.id, &record.sequence),
            SeqFormat::Fastq => write_fastq(out, record),
        }
    }

    /// Mates are written under the first mate's ID in FASTA, verbatim in FASTQ.
    fn write_mate<W: Write>(&self, out: &mut W, id: &str, mate: &SequenceRecord) -> Result<()> {
        match self.output_format {
            SeqFormat::Fasta => write_fasta(out, id, &mate.sequence),
            SeqFormat::Fastq => write_fastq(out, mate),
        }
    }
}

fn write_fasta<W: Write>(out: &mut W, id: &str, sequence: &[String]) -> Result<()> {
    writeln!(out, ">{id}")?;
    for line in sequence {
        writeln!(out, "{line}")?;
    }
    Ok(())
}

fn write_fastq<W: Write>(out: &mut W, record: &SequenceRecord) -> Result<()> {
    writeln!(out, "{}", record.header_line)?;
    for line in &record.sequence {
        writeln!(out, "{line}")?;
    }
    writeln!(out, "{}", record.plus.as_deref().unwrap_or("+"))?;
    writeln!(out, "{}", record.quality.as_deref().unwrap_or_default())?;
    Ok(())
}
