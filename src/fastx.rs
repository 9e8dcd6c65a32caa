//src/fastx.rs

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{ExtractError, Result};
use crate::types::{SeqFormat, SequenceRecord};

fn is_gz(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false)
}

/// Opens `path` for line reading, transparently decompressing `.gz`.
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path).map_err(|e| ExtractError::file_access(path, e))?;

    let reader: Box<dyn BufRead> = if is_gz(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

/// Buffered record sink. Call [`RecordWriter::finish`] once everything is
/// written; dropping it instead discards errors from the final flush and,
/// for gzip, from writing the trailer.
pub enum RecordWriter {
    Stdout(BufWriter<io::StdoutLock<'static>>),
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl RecordWriter {
    pub fn finish(self) -> Result<()> {
        match self {
            RecordWriter::Stdout(mut w) => w.flush()?,
            RecordWriter::Plain(mut w) => w.flush()?,
            RecordWriter::Gzip(encoder) => encoder.finish()?.flush()?,
        }
        Ok(())
    }
}

impl Write for RecordWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RecordWriter::Stdout(w) => w.write(buf),
            RecordWriter::Plain(w) => w.write(buf),
            RecordWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RecordWriter::Stdout(w) => w.flush(),
            RecordWriter::Plain(w) => w.flush(),
            RecordWriter::Gzip(w) => w.flush(),
        }
    }
}

/// Stdout when `path` is `None`, gzip when it ends in `.gz`.
pub fn create_writer(path: Option<&Path>) -> Result<RecordWriter> {
    let Some(path) = path else {
        return Ok(RecordWriter::Stdout(BufWriter::new(io::stdout().lock())));
    };
    let f = File::create(path).map_err(|e| ExtractError::file_access(path, e))?;

    let writer = if is_gz(path) {
        RecordWriter::Gzip(GzEncoder::new(BufWriter::new(f), Compression::default()))
    } else {
        RecordWriter::Plain(BufWriter::new(f))
    };
    Ok(writer)
}

/// Removes a trailing `/1`, `/2`, `.1` or `.2` mate suffix.
pub fn strip_pair_suffix(id: &str) -> &str {
    let bytes = id.as_bytes();
    if bytes.len() >= 2 {
        let sep = bytes[bytes.len() - 2];
        let mate = bytes[bytes.len() - 1];
        if (sep == b'/' || sep == b'.') && (mate == b'1' || mate == b'2') {
            return &id[..id.len() - 2];
        }
    }
    id
}

/// `@read7/1 length=150` -> `read7`
pub fn read_id_from_header(header: &str, marker: char) -> &str {
    let name = header.strip_prefix(marker).unwrap_or(header);
    let name = name.split_whitespace().next().unwrap_or("");
    strip_pair_suffix(name)
}

/// Expands a paired path template such as `sample_R#.fq.gz` into its two mates.
pub fn mate_paths(template: &Path, placeholder: char) -> Result<(PathBuf, PathBuf)> {
    let template_str = template.to_string_lossy();
    if !template_str.contains(placeholder) {
        return Err(ExtractError::Configuration(format!(
            "paired read path {template_str:?} does not contain the placeholder '{placeholder}'"
        )));
    }
    let placeholder = placeholder.to_string();
    Ok((
        PathBuf::from(template_str.replace(&placeholder, "1")),
        PathBuf::from(template_str.replace(&placeholder, "2")),
    ))
}

/// Pulls one [`SequenceRecord`] at a time out of a FASTA or FASTQ stream.
///
/// Lines found while looking for a header are skipped, so the reader
/// resynchronises on the next `>`/`@` after junk. FASTQ records are exactly
/// four lines; FASTA records run until the next header.
pub struct FastxReader<R: BufRead> {
    reader: R,
    format: SeqFormat,
    line: String,
    pending_header: Option<String>,
}

impl<R: BufRead> FastxReader<R> {
    pub fn new(reader: R, format: SeqFormat) -> Self {
        FastxReader {
            reader,
            format,
            line: String::new(),
            pending_header: None,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Ok(None);
        }
        Ok(Some(self.line.trim_end_matches(['\n', '\r']).to_string()))
    }

    fn next_header(&mut self) -> Result<Option<String>> {
        if let Some(header) = self.pending_header.take() {
            return Ok(Some(header));
        }
        let marker = self.format.marker();
        while let Some(line) = self.next_line()? {
            if line.starts_with(marker) {
                return Ok(Some(line));
            }
            if !line.is_empty() {
                log::debug!("Skipping line outside a record: {line:?}");
            }
        }
        Ok(None)
    }

    pub fn read_next(&mut self) -> Result<Option<SequenceRecord>> {
        let Some(header_line) = self.next_header()? else {
            return Ok(None);
        };
        let id = read_id_from_header(&header_line, self.format.marker()).to_string();

        match self.format {
            SeqFormat::Fastq => {
                let (Some(seq), Some(plus), Some(quality)) =
                    (self.next_line()?, self.next_line()?, self.next_line()?)
                else {
                    log::warn!("Truncated FASTQ record {id:?} at end of input");
                    return Ok(None);
                };
                Ok(Some(SequenceRecord {
                    id,
                    header_line,
                    sequence: vec![seq],
                    plus: Some(plus),
                    quality: Some(quality),
                }))
            }
            SeqFormat::Fasta => {
                let mut sequence = Vec::new();
                while let Some(line) = self.next_line()? {
                    if line.starts_with('>') {
                        self.pending_header = Some(line);
                        break;
                    }
                    if !line.is_empty() {
                        sequence.push(line);
                    }
                }
                Ok(Some(SequenceRecord {
                    id,
                    header_line,
                    sequence,
                    plus: None,
                    quality: None,
                }))
            }
        }
    }
}

impl<R: BufRead> Iterator for FastxReader<R> {
    type Item = Result<SequenceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}
