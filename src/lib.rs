// src/lib.rs
pub mod error;
pub mod types;
pub mod taxdb;
pub mod kraken_output;
pub mod fastx;
pub mod filter;

use indicatif::ProgressBar;
use std::collections::BTreeSet;
use std::fmt;
use std::io::Write;
use std::time::Instant;

use crate::error::Result;
use crate::fastx::{open_reader, FastxReader};
use crate::filter::{ExtractConfig, FilterStats, RecordFilter};
use crate::kraken_output::Verdicts;
use crate::taxdb::{resolve, ChildMap};
use crate::types::TaxId;

/// What one extraction run did, for the summary on stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionSummary {
    /// Requested taxa plus every taxon that matched, with its read count,
    /// sorted by taxon ID.
    pub taxon_counts: Vec<(TaxId, u64)>,

    /// Size of the taxon set after descendant expansion.
    pub resolved_taxa: usize,

    /// Reads assigned to the resolved taxa in the classification output.
    pub total_matched: u64,

    /// `None` when the read files were never opened because nothing matched.
    pub filter_stats: Option<FilterStats>,
}

impl ExtractionSummary {
    pub fn records_emitted(&self) -> u64 {
        self.filter_stats.map(|s| s.records_emitted).unwrap_or(0)
    }
}

impl fmt::Display for ExtractionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "taxID\treads")?;
        for (taxid, count) in &self.taxon_counts {
            writeln!(f, "{taxid}\t{count}")?;
        }
        writeln!(f, "{} reads matched {} taxa", self.total_matched, self.resolved_taxa)?;
        write!(f, "{} records written", self.records_emitted())
    }
}

/// Runs the whole filter: expand the requested taxa, collect matching read
/// IDs from the classification output, then copy the selected reads to `out`.
pub fn extract_reads<W: Write>(
    config: &ExtractConfig,
    out: &mut W,
    progress: ProgressBar,
) -> Result<ExtractionSummary> {
    // 1. Reject bad option combinations before touching any file
    config.validate()?;

    // 2. Expand requested taxa through the taxonomy, if one was given
    let child_map = match &config.taxonomy {
        Some(path) => Some(ChildMap::from_path(path)?),
        None => None,
    };
    let taxa = resolve(&config.taxon_ids, child_map.as_ref());

    // 3. Decide which reads are wanted
    let start = Instant::now();
    let verdicts = Verdicts::from_path(&config.kraken_output, &taxa)?;
    log::debug!("Classification output scanned in {:.2?}", start.elapsed());

    let reported: BTreeSet<TaxId> = config
        .taxon_ids
        .iter()
        .chain(verdicts.counts().iter().filter(|(_, n)| **n > 0).map(|(t, _)| t))
        .copied()
        .collect();
    let taxon_counts = reported
        .into_iter()
        .map(|taxid| (taxid, verdicts.count(taxid)))
        .collect();

    let mut summary = ExtractionSummary {
        taxon_counts,
        resolved_taxa: taxa.len(),
        total_matched: verdicts.total_matched(),
        filter_stats: None,
    };

    // An inverted run still has reads to write when nothing matched
    if verdicts.is_empty() && !config.invert {
        log::info!("No reads matched the requested taxa");
        progress.finish_with_message("No reads matched");
        return Ok(summary);
    }

    // 4. Stream the reads
    let start = Instant::now();
    let filter = RecordFilter::new(&verdicts, config.invert, config.output_format())
        .with_progress(progress);
    let format = config.input_format();
    let paths = config.read_paths()?;

    let stats = match paths.as_slice() {
        [mate1, mate2] => {
            let mates1 = FastxReader::new(open_reader(mate1)?, format);
            let mates2 = FastxReader::new(open_reader(mate2)?, format);
            filter.run_paired(mates1, mates2, out)?
        }
        _ => {
            let reads = FastxReader::new(open_reader(&config.reads)?, format);
            filter.run_single(reads, out)?
        }
    };
    out.flush()?;
    log::debug!("Reads filtered in {:.2?}", start.elapsed());

    summary.filter_stats = Some(stats);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::fastx::create_writer;
    use std::io::Read;
    use crate::taxdb::parse_taxon_ids;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const KRAKEN: &str = "C\treadA\t9606\t150\t9606:116\nC\treadB\t562\t150\t562:116\nU\treadC\t0\t150\t0:116\n";
    const READS: &str = "@readA\nACGT\n+\nIIII\n@readB\nGGGG\n+\nJJJJ\n@readC\nTTTT\n+\nKKKK\n";

    fn write(dir: &TempDir, name: &str, text: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    fn config(taxa: &str, kraken: &Path, reads: &Path) -> ExtractConfig {
        ExtractConfig::new(parse_taxon_ids(&[taxa]).unwrap(), kraken, reads)
    }

    fn run(config: &ExtractConfig) -> (String, ExtractionSummary) {
        let mut out = Vec::new();
        let summary = extract_reads(config, &mut out, ProgressBar::hidden()).unwrap();
        (String::from_utf8(out).unwrap(), summary)
    }

    #[test]
    fn test_extracts_only_requested_taxon() {
        let dir = TempDir::new().unwrap();
        let kraken = write(&dir, "k.out", KRAKEN);
        let reads = write(&dir, "r.fq", READS);

        let (out, summary) = run(&config("9606", &kraken, &reads));
        assert_eq!(out, "@readA\nACGT\n+\nIIII\n");
        assert_eq!(summary.total_matched, 1);
        assert_eq!(summary.taxon_counts, vec![(9606, 1)]);
        assert_eq!(summary.records_emitted(), 1);
    }

    #[test]
    fn test_zero_matches_is_a_clean_empty_run() {
        let dir = TempDir::new().unwrap();
        let kraken = write(&dir, "k.out", KRAKEN);
        // never opened, since nothing matched
        let reads = dir.path().join("missing.fq");

        let (out, summary) = run(&config("1234,5678", &kraken, &reads));
        assert!(out.is_empty());
        assert_eq!(summary.taxon_counts, vec![(1234, 0), (5678, 0)]);
        assert_eq!(summary.filter_stats, None);
        assert!(summary.to_string().contains("0 records written"));
    }

    #[test]
    fn test_taxonomy_expansion() {
        let dir = TempDir::new().unwrap();
        let kraken = write(&dir, "k.out", "C\tr1\t12\nC\tr2\t11\nC\tr3\t20\nC\tr4\t1\n");
        let reads = write(
            &dir,
            "r.fa",
            ">r1\nAA\n>r2\nCC\n>r3\nGG\n>r4\nTT\n",
        );
        let taxonomy = write(&dir, "tax.tsv", "1\t1\n10\t1\n11\t1\n12\t10\n20\t2\n");

        let mut cfg = config("10", &kraken, &reads);
        cfg.fasta_input = true;
        cfg.taxonomy = Some(taxonomy);
        let (out, summary) = run(&cfg);
        assert_eq!(out, ">r1\nAA\n");
        assert_eq!(summary.resolved_taxa, 2);
        assert_eq!(summary.taxon_counts, vec![(10, 0), (12, 1)]);
    }

    #[test]
    fn test_invert_with_unclassified() {
        let dir = TempDir::new().unwrap();
        let kraken = write(&dir, "k.out", KRAKEN);
        let reads = write(&dir, "r.fq", READS);

        let mut cfg = config("U", &kraken, &reads);
        cfg.invert = true;
        cfg.fasta_output = true;
        let (out, summary) = run(&cfg);
        assert_eq!(out, ">readA\nACGT\n>readB\nGGGG\n");
        assert_eq!(summary.total_matched, 1);
        assert_eq!(summary.records_emitted(), 2);
    }

    #[test]
    fn test_invert_with_no_matches_writes_everything() {
        let dir = TempDir::new().unwrap();
        let kraken = write(&dir, "k.out", KRAKEN);
        let reads = write(&dir, "r.fq", READS);

        let mut cfg = config("42", &kraken, &reads);
        cfg.invert = true;
        let (out, _) = run(&cfg);
        assert_eq!(out, READS);
    }

    #[test]
    fn test_paired_run() {
        let dir = TempDir::new().unwrap();
        let kraken = write(&dir, "k.out", KRAKEN);
        write(&dir, "r_1.fq", "@readA/1\nAC\n+\nII\n@readB/1\nGG\n+\nJJ\n");
        write(&dir, "r_2.fq", "@readA/2\nTG\n+\nII\n@readB/2\nCC\n+\nJJ\n");

        let mut cfg = config("562", &kraken, &dir.path().join("r_#.fq"));
        cfg.paired = true;
        let (out, summary) = run(&cfg);
        assert_eq!(out, "@readB/1\nGG\n+\nJJ\n@readB/2\nCC\n+\nJJ\n");
        assert_eq!(summary.records_emitted(), 1);
    }

    fn run_to_gz(config: &mut ExtractConfig, dir: &TempDir, name: &str) -> (String, ExtractionSummary) {
        let path = dir.path().join(name);
        config.output = Some(path.clone());
        let mut out = create_writer(config.output.as_deref()).unwrap();
        let summary = extract_reads(config, &mut out, ProgressBar::hidden()).unwrap();
        out.finish().unwrap();

        let mut text = String::new();
        open_reader(&path).unwrap().read_to_string(&mut text).unwrap();
        (text, summary)
    }

    #[test]
    fn test_gz_output_matched_and_empty_runs() {
        let dir = TempDir::new().unwrap();
        let kraken = write(&dir, "k.out", KRAKEN);
        let reads = write(&dir, "r.fq", READS);

        let (text, summary) = run_to_gz(&mut config("9606", &kraken, &reads), &dir, "hit.fq.gz");
        assert_eq!(text, "@readA\nACGT\n+\nIIII\n");
        assert_eq!(summary.records_emitted(), 1);

        let (text, summary) = run_to_gz(&mut config("1234", &kraken, &reads), &dir, "none.fq.gz");
        assert!(text.is_empty());
        assert_eq!(summary.filter_stats, None);
    }

    #[test]
    fn test_configuration_errors_come_first() {
        let mut cfg = config("9606", Path::new("/nonexistent/k.out"), Path::new("r_#.fa"));
        cfg.paired = true;
        cfg.fasta_input = true;
        let mut out = Vec::new();
        let err = extract_reads(&cfg, &mut out, ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
    }

    #[test]
    fn test_missing_report_is_file_access_error() {
        let cfg = config("9606", Path::new("/nonexistent/k.out"), Path::new("r.fq"));
        let mut out = Vec::new();
        let err = extract_reads(&cfg, &mut out, ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, ExtractError::FileAccess { .. }));
    }

    #[test]
    fn test_missing_reads_is_file_access_error() {
        let dir = TempDir::new().unwrap();
        let kraken = write(&dir, "k.out", KRAKEN);
        let cfg = config("9606", &kraken, &dir.path().join("missing.fq"));
        let mut out = Vec::new();
        let err = extract_reads(&cfg, &mut out, ProgressBar::hidden()).unwrap_err();
        assert!(matches!(err, ExtractError::FileAccess { .. }));
    }
}
