//src/kraken_output.rs

use ahash::AHashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::Result;
use crate::fastx::{open_reader, strip_pair_suffix};
use crate::types::{KrakenOutputLine, TaxId, TaxonSet, UNCLASSIFIED};

impl KrakenOutputLine {
    /// Parses one classifier line. Only the status, read ID and taxon fields
    /// are read; short or blank lines yield an empty ID and no taxon.
    ///
    /// The taxon field may be a bare ID (`9606`) or, with Kraken 2
    /// `--use-names`, a labelled one (`Homo sapiens (taxid 9606)`).
    pub fn parse(line: &str) -> Self {
        let mut fields = line.split('\t');
        let status = fields
            .next()
            .and_then(|f| f.trim().chars().next())
            .unwrap_or(' ');
        let read_id = fields
            .next()
            .map(|f| strip_pair_suffix(f.trim()).to_string())
            .unwrap_or_default();
        let tax_id = fields.next().and_then(parse_tax_field);

        KrakenOutputLine {
            status,
            read_id,
            tax_id,
        }
    }
}

fn parse_tax_field(field: &str) -> Option<TaxId> {
    let field = field.trim();
    if let Ok(taxid) = field.parse() {
        return Some(taxid);
    }
    let start = field.rfind("(taxid ")? + "(taxid ".len();
    let end = start + field[start..].find(')')?;
    field[start..end].trim().parse().ok()
}

/// Which reads matched the requested taxa, and how many matched each taxon.
///
/// Written once from the classification output, then only read while
/// filtering. A read listed twice keeps its last assignment, and the counter
/// of the earlier taxon is given back, so the counters always sum to
/// [`Verdicts::total_matched`].
#[derive(Debug, Default, Clone)]
pub struct Verdicts {
    assignments: AHashMap<String, TaxId>,
    counts: AHashMap<TaxId, u64>,
}

impl Verdicts {
    pub fn from_path<P: AsRef<Path>>(path: P, taxa: &TaxonSet) -> Result<Self> {
        let reader = open_reader(path)?;
        Self::from_reader(reader, taxa)
    }

    pub fn from_reader<R: BufRead>(reader: R, taxa: &TaxonSet) -> Result<Self> {
        let want_unclassified = taxa.contains(&UNCLASSIFIED);
        let mut verdicts = Verdicts::default();
        let mut lines_read: u64 = 0;

        for line_result in reader.lines() {
            let line = line_result?;
            lines_read += 1;
            let record = KrakenOutputLine::parse(&line);
            if record.read_id.is_empty() {
                continue;
            }

            match record.tax_id {
                Some(taxid) if taxa.contains(&taxid) => verdicts.assign(record.read_id, taxid),
                _ if want_unclassified && record.is_unclassified() => {
                    verdicts.assign(record.read_id, UNCLASSIFIED)
                }
                _ => {}
            }
        }

        log::info!(
            "Read {} classification lines, {} reads matched",
            lines_read,
            verdicts.total_matched()
        );
        Ok(verdicts)
    }

    pub fn assign(&mut self, read_id: String, taxid: TaxId) {
        if let Some(previous) = self.assignments.insert(read_id, taxid) {
            if let Some(count) = self.counts.get_mut(&previous) {
                *count -= 1;
            }
        }
        *self.counts.entry(taxid).or_insert(0) += 1;
    }

    pub fn contains(&self, read_id: &str) -> bool {
        self.assignments.contains_key(read_id)
    }

    pub fn taxon_of(&self, read_id: &str) -> Option<TaxId> {
        self.assignments.get(read_id).copied()
    }

    /// Reads matched to `taxid`; zero for taxa that never matched.
    pub fn count(&self, taxid: TaxId) -> u64 {
        self.counts.get(&taxid).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &AHashMap<TaxId, u64> {
        &self.counts
    }

    pub fn total_matched(&self) -> u64 {
        self.assignments.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}
