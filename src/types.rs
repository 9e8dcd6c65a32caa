//src/types.rs

use ahash::AHashSet;

/// A taxon identifier as written by the classifier.
pub type TaxId = u32;

/// Kraken reports unclassified reads under taxon 0.
pub const UNCLASSIFIED: TaxId = 0;

/// The set of taxa whose reads are extracted.
pub type TaxonSet = AHashSet<TaxId>;

/// A structured representation of one Kraken output line:
/// ```text
/// <C|U>\t<read_id>\t<taxid>\t<length>\t<hitlist>
/// ```
/// `tax_id` is `None` when the field is missing or unparseable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KrakenOutputLine {
    pub status: char, // 'C' or 'U'
    pub read_id: String,
    pub tax_id: Option<TaxId>,
}

impl KrakenOutputLine {
    pub fn is_unclassified(&self) -> bool {
        self.status == 'U' || self.tax_id == Some(UNCLASSIFIED)
    }
}

/// Read file framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqFormat {
    Fasta,
    Fastq,
}

impl SeqFormat {
    /// Character opening every record header.
    pub fn marker(self) -> char {
        match self {
            SeqFormat::Fasta => '>',
            SeqFormat::Fastq => '@',
        }
    }
}

/// One framed read.
///
/// For FASTQ, `sequence` holds exactly one line and `plus`/`quality` are set.
/// For FASTA, `sequence` holds every line up to the next header, unwrapped
/// lines kept as they appear in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    pub id: String,
    pub header_line: String,
    pub sequence: Vec<String>,
    pub plus: Option<String>,
    pub quality: Option<String>,
}
