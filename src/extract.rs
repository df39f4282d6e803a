use crate::error::{Error, IoResultExt, Result};
use crate::index::{FileEntry, Header, Index, DATA_EXTENSION};
use crate::names::check_name;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn, Dispatch};

/// What to do with the recorded content hash during extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashCheck {
    /// Do not recompute hashes.
    Skip,
    /// Log mismatches and write the file anyway.
    Lenient,
    /// Abort on the first mismatch.
    #[default]
    Strict,
}

/// Reconstructs files from an index and its data blob.
#[derive(Debug, Clone)]
pub struct Extractor {
    check: HashCheck,
    verify_sentinel: bool,
    write_files: bool,
    dispatch: Dispatch,
}

impl Default for Extractor {
    fn default() -> Self {
        Extractor {
            check: HashCheck::default(),
            verify_sentinel: true,
            write_files: true,
            dispatch: Dispatch::none(),
        }
    }
}

impl Extractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn verify(mut self, check: HashCheck) -> Self {
        self.check = check;
        self
    }

    /// Require the sentinel to follow every payload in the blob.
    pub fn verify_sentinel(mut self, verify_sentinel: bool) -> Self {
        self.verify_sentinel = verify_sentinel;
        self
    }

    /// When false, entries are read and checked but nothing is written.
    pub fn write_files(mut self, write_files: bool) -> Self {
        self.write_files = write_files;
        self
    }

    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Extract every entry of `index_path` below `target_root`.
    ///
    /// The data blob defaults to the index path with a `txd` extension, and the
    /// target root to the index path without its extension.
    pub fn extract(
        &self,
        index_path: &Path,
        data_path: Option<&Path>,
        target_root: Option<&Path>,
    ) -> Result<Vec<FileEntry>> {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let data_path = data_path
                .map_or_else(|| index_path.with_extension(DATA_EXTENSION), Path::to_path_buf);
            let target_root = match target_root {
                Some(target) => target.to_path_buf(),
                None if self.write_files => default_target(index_path)?,
                None => PathBuf::new(),
            };

            let index = Index::open(index_path)?;
            info!(
                files = index.header.file_count,
                total_bytes = index.header.total_bytes,
                hash = %index.header.hash,
                "read index {}",
                index_path.display()
            );

            info!(path = %data_path.display(), "reading data");
            let file = File::open(&data_path).at(&data_path)?;
            let available = file.metadata().at(&data_path)?.len();
            if available != index.header.total_bytes {
                warn!(
                    expected = index.header.total_bytes,
                    actual = available,
                    "data blob size differs from index header"
                );
            }
            let mut data = BufReader::new(file);

            for entry in &index.entries {
                let relative = check_name(&entry.filename)?;
                let content =
                    self.read_entry(&mut data, &data_path, available, &index.header, entry)?;
                self.check_hash(&index.header, entry, &content)?;

                if self.write_files {
                    let dest = target_root.join(relative);
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent).at(parent)?;
                    }
                    let mut out = File::create(&dest).at(&dest)?;
                    out.write_all(&content).at(&dest)?;
                }
            }

            Ok(index.entries)
        })
    }

    fn read_entry<R: Read + Seek>(
        &self,
        data: &mut R,
        data_path: &Path,
        available: u64,
        header: &Header,
        entry: &FileEntry,
    ) -> Result<Vec<u8>> {
        let end = entry.offset + entry.filesize;
        if end > available {
            return Err(Error::MissingData {
                filename: entry.filename.clone(),
                offset: entry.offset,
                filesize: entry.filesize,
                available,
            });
        }

        debug!(
            idx = entry.idx,
            offset = entry.offset,
            filesize = entry.filesize,
            filename = %entry.filename,
            "entry"
        );
        data.seek(SeekFrom::Start(entry.offset)).at(data_path)?;
        let mut content = vec![0u8; entry.filesize as usize];
        data.read_exact(&mut content).at(data_path)?;

        if self.verify_sentinel {
            let sentinel = header.sentinel.as_bytes();
            let mut marker = vec![0u8; sentinel.len()];
            if end + header.sentinel_len() > available {
                return Err(Error::Format(format!(
                    "{}: data blob ends before sentinel at offset {}",
                    entry.filename, end
                )));
            }
            data.read_exact(&mut marker).at(data_path)?;
            if marker != sentinel {
                return Err(Error::Format(format!(
                    "{}: sentinel not found at offset {}",
                    entry.filename, end
                )));
            }
        }
        Ok(content)
    }

    fn check_hash(&self, header: &Header, entry: &FileEntry, content: &[u8]) -> Result<()> {
        if self.check == HashCheck::Skip {
            return Ok(());
        }
        let actual = header.hash.digest_hex(content);
        if actual.eq_ignore_ascii_case(&entry.hash) {
            return Ok(());
        }
        if self.check == HashCheck::Strict {
            return Err(Error::Integrity {
                filename: entry.filename.clone(),
                expected: entry.hash.clone(),
                actual,
            });
        }
        error!(
            filename = %entry.filename,
            expected = %entry.hash,
            actual = %actual,
            "hash mismatch"
        );
        Ok(())
    }
}

fn default_target(index_path: &Path) -> Result<PathBuf> {
    match (index_path.file_stem(), index_path.extension()) {
        (Some(stem), Some(_)) => Ok(index_path.with_file_name(stem)),
        _ => Err(Error::path(
            index_path,
            "cannot derive a target directory from the index name",
        )),
    }
}

/// Extract `index_path` beside itself with default settings.
pub fn extract(index_path: &Path) -> Result<Vec<FileEntry>> {
    Extractor::new().extract(index_path, None, None)
}
