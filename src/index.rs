use crate::error::{Error, IoResultExt, Result};
use crate::hash::HashAlgo;
use crate::names::is_normalized;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: &str = "1.0.0";
pub const FORMAT_REVISION: u32 = 1;

/// Marker written after every payload in the data blob.
pub const SENTINEL: &str = "!@#$!@#$!@#$";

pub const INDEX_EXTENSION: &str = "txr";
pub const DATA_EXTENSION: &str = "txd";

/// First line of the index: describes the archive as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(rename = "txr_ver")]
    pub format_version: String,
    #[serde(rename = "txr_fmt")]
    pub format_revision: u32,
    pub sentinel: String,
    #[serde(rename = "files")]
    pub file_count: usize,
    /// Size of the data blob, sentinels included.
    pub total_bytes: u64,
    #[serde(default, skip_serializing_if = "HashAlgo::is_default")]
    pub hash: HashAlgo,
}

impl Header {
    pub fn new(file_count: usize, total_bytes: u64, hash: HashAlgo) -> Self {
        Header {
            format_version: FORMAT_VERSION.to_string(),
            format_revision: FORMAT_REVISION,
            sentinel: SENTINEL.to_string(),
            file_count,
            total_bytes,
            hash,
        }
    }

    pub fn sentinel_len(&self) -> u64 {
        self.sentinel.len() as u64
    }

    fn check_supported(&self) -> Result<()> {
        let major = FORMAT_VERSION.split('.').next();
        if self.format_version.split('.').next() != major {
            return Err(Error::Format(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }
        if self.format_revision == 0 || self.format_revision > FORMAT_REVISION {
            return Err(Error::Format(format!(
                "unsupported format revision {}",
                self.format_revision
            )));
        }
        if self.sentinel.is_empty() {
            return Err(Error::Format("empty sentinel".to_string()));
        }
        Ok(())
    }
}

/// Metadata for one archived file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub idx: usize,
    pub hash: String,
    pub offset: u64,
    pub filesize: u64,
    /// Relative to the archive root, `/`-separated.
    pub filename: String,
}

/// Header plus entry table, exactly as stored in an index file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub header: Header,
    pub entries: Vec<FileEntry>,
}

impl Index {
    /// Column order of the entry table. The hash column is named after the algorithm.
    pub fn columns(hash: HashAlgo) -> [&'static str; 5] {
        ["idx", hash.name(), "offset", "filesize", "filename"]
    }

    /// Read and validate an index file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).at(path)?;
        Index::read_from(BufReader::new(file)).map_err(|e| match e {
            Error::Io { source, .. } => Error::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Write the index to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).at(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer).at(path)?;
        writer.flush().at(path)
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> io::Result<()> {
        serde_json::to_writer(&mut writer, &self.header)?;
        writer.write_all(b"\n")?;

        let mut table = csv::WriterBuilder::new()
            .terminator(csv::Terminator::CRLF)
            .from_writer(writer);
        table.write_record(Index::columns(self.header.hash))?;
        for entry in &self.entries {
            table.write_record([
                entry.idx.to_string(),
                entry.hash.clone(),
                entry.offset.to_string(),
                entry.filesize.to_string(),
                entry.filename.clone(),
            ])?;
        }
        table.flush()
    }

    /// Parse index text held in memory.
    pub fn parse(text: &str) -> Result<Self> {
        Index::read_from(text.as_bytes())
    }

    /// Read an index: one JSON header record, then the CSV entry table.
    ///
    /// Anything that is not a well-formed, supported index, including
    /// non-UTF-8 text, is a `Format` error. Failures of the reader itself
    /// surface as `Io` errors without a path.
    pub fn read_from<R: BufRead>(mut reader: R) -> Result<Self> {
        let mut first = Vec::new();
        reader.read_until(b'\n', &mut first).map_err(unsourced)?;
        if first.pop() != Some(b'\n') {
            return Err(Error::Format("missing header record".to_string()));
        }
        if first.last() == Some(&b'\r') {
            first.pop();
        }
        let header: Header = serde_json::from_slice(&first)
            .map_err(|e| Error::Format(format!("header record: {}", e)))?;
        header.check_supported()?;

        let mut table = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);
        let columns = table.headers().map_err(table_error)?.clone();
        let expected = Index::columns(header.hash);
        if !columns.iter().eq(expected.iter().copied()) {
            return Err(Error::Format(format!(
                "expected columns {}, found {}",
                expected.join(","),
                columns.iter().collect::<Vec<_>>().join(",")
            )));
        }

        let mut entries = Vec::new();
        for record in table.records() {
            let record = record.map_err(table_error)?;
            entries.push(FileEntry {
                idx: parse_field(&record, 0, "idx")?,
                hash: record[1].to_string(),
                offset: parse_field(&record, 2, "offset")?,
                filesize: parse_field(&record, 3, "filesize")?,
                filename: record[4].to_string(),
            });
        }

        let index = Index { header, entries };
        index.validate()?;
        Ok(index)
    }

    /// Check the header against the entries: counts, positions, cumulative
    /// offsets, total size, digest shape, filename form and uniqueness.
    pub fn validate(&self) -> Result<()> {
        let header = &self.header;
        if self.entries.len() != header.file_count {
            return Err(Error::Format(format!(
                "header lists {} files, table has {}",
                header.file_count,
                self.entries.len()
            )));
        }

        let mut offset = 0u64;
        let mut seen = HashSet::with_capacity(self.entries.len());
        for (pos, entry) in self.entries.iter().enumerate() {
            if entry.idx != pos {
                return Err(Error::Format(format!(
                    "entry {} at position {}",
                    entry.idx, pos
                )));
            }
            if entry.offset != offset {
                return Err(Error::Format(format!(
                    "{}: offset {} does not follow previous entry (expected {})",
                    entry.filename, entry.offset, offset
                )));
            }
            if entry.hash.len() != header.hash.hex_len()
                || !entry.hash.bytes().all(|b| b.is_ascii_hexdigit())
            {
                return Err(Error::Format(format!(
                    "{}: not a {} digest: {}",
                    entry.filename, header.hash, entry.hash
                )));
            }
            if !is_normalized(&entry.filename) {
                return Err(Error::Format(format!(
                    "filename not normalized: {}",
                    entry.filename
                )));
            }
            if !seen.insert(entry.filename.as_str()) {
                return Err(Error::Format(format!(
                    "duplicate filename {}",
                    entry.filename
                )));
            }
            offset = entry
                .filesize
                .checked_add(header.sentinel_len())
                .and_then(|step| offset.checked_add(step))
                .ok_or_else(|| Error::Format(format!("{}: size overflow", entry.filename)))?;
        }

        if offset != header.total_bytes {
            return Err(Error::Format(format!(
                "header claims {} bytes, entries account for {}",
                header.total_bytes, offset
            )));
        }
        Ok(())
    }
}

fn unsourced(source: io::Error) -> Error {
    Error::Io {
        path: PathBuf::new(),
        source,
    }
}

fn table_error(e: csv::Error) -> Error {
    let message = e.to_string();
    match e.into_kind() {
        csv::ErrorKind::Io(source) => unsourced(source),
        _ => Error::Format(format!("entry table: {}", message)),
    }
}

fn parse_field<T: std::str::FromStr>(
    record: &csv::StringRecord,
    column: usize,
    name: &str,
) -> Result<T> {
    let value = &record[column];
    value
        .parse()
        .map_err(|_| Error::Format(format!("bad {} value {:?}", name, value)))
}
