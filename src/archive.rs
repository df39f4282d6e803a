use crate::error::{Error, IoResultExt, Result};
use crate::hash::HashAlgo;
use crate::index::{FileEntry, Header, Index, DATA_EXTENSION, INDEX_EXTENSION, SENTINEL};
use crate::names::archive_name;
use crate::scanner::scan_directory;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, Dispatch};

/// Result of an archive run.
#[derive(Debug, Clone)]
pub struct Archived {
    pub index_path: PathBuf,
    pub data_path: PathBuf,
    /// Always populated, even when neither file was written.
    pub index: Index,
}

/// Builds an index and data blob from files under a root directory.
#[derive(Debug, Clone)]
pub struct Archiver {
    hash: HashAlgo,
    write_index: bool,
    write_data: bool,
    dispatch: Dispatch,
}

impl Default for Archiver {
    fn default() -> Self {
        Archiver {
            hash: HashAlgo::default(),
            write_index: true,
            write_data: true,
            dispatch: Dispatch::none(),
        }
    }
}

impl Archiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash(mut self, hash: HashAlgo) -> Self {
        self.hash = hash;
        self
    }

    pub fn write_index(mut self, write_index: bool) -> Self {
        self.write_index = write_index;
        self
    }

    pub fn write_data(mut self, write_data: bool) -> Self {
        self.write_data = write_data;
        self
    }

    /// Logging sink for this archiver. Defaults to discarding everything.
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Archive `files`, in order, relative to `root`.
    ///
    /// Paths default to `<root>.txr` and `<root>.txd` beside the root directory.
    pub fn archive(
        &self,
        root: &Path,
        files: &[PathBuf],
        index_path: Option<&Path>,
        data_path: Option<&Path>,
    ) -> Result<Archived> {
        tracing::dispatcher::with_default(&self.dispatch, || {
            let index_path =
                index_path.map_or_else(|| sibling(root, INDEX_EXTENSION), Path::to_path_buf);
            let data_path =
                data_path.map_or_else(|| sibling(root, DATA_EXTENSION), Path::to_path_buf);
            let index = self.run(root, files, &data_path)?;

            if self.write_index {
                info!(path = %index_path.display(), "writing index");
                index.save(&index_path)?;
            }

            Ok(Archived {
                index_path,
                data_path,
                index,
            })
        })
    }

    /// Scan `root` with `pattern` and archive every match.
    pub fn archive_dir(
        &self,
        root: &Path,
        pattern: &str,
        index_path: Option<&Path>,
        data_path: Option<&Path>,
    ) -> Result<Archived> {
        let files = scan_directory(root, pattern)?;
        self.archive(root, &files, index_path, data_path)
    }

    fn run(&self, root: &Path, files: &[PathBuf], data_path: &Path) -> Result<Index> {
        if files.is_empty() {
            return Err(Error::EmptyInput);
        }

        // Resolve every name before touching the output.
        let resolved_root = root.canonicalize().at(root)?;
        let mut seen = HashSet::with_capacity(files.len());
        let mut names = Vec::with_capacity(files.len());
        for file in files {
            let name = archive_name(root, file)?;
            let source = root.join(&name);
            // symlinks may point anywhere
            if !source.canonicalize().at(&source)?.starts_with(&resolved_root) {
                return Err(Error::path(file, "resolves outside archive root"));
            }
            if !seen.insert(name.clone()) {
                return Err(Error::path(file, "duplicate filename"));
            }
            names.push(name);
        }

        let mut data = if self.write_data {
            info!(path = %data_path.display(), "writing data");
            let file = File::create(data_path).at(data_path)?;
            Some(BufWriter::new(file))
        } else {
            None
        };

        let sentinel = SENTINEL.as_bytes();
        let mut entries = Vec::with_capacity(files.len());
        let mut offset = 0u64;

        for (idx, name) in names.into_iter().enumerate() {
            let source = root.join(&name);
            let content = fs::read(&source).at(&source)?;
            let entry = FileEntry {
                idx,
                hash: self.hash.digest_hex(&content),
                offset,
                filesize: content.len() as u64,
                filename: name,
            };
            debug!(
                idx = entry.idx,
                offset = entry.offset,
                filesize = entry.filesize,
                hash = %entry.hash,
                filename = %entry.filename,
                "entry"
            );

            if let Some(writer) = data.as_mut() {
                writer.write_all(&content).at(data_path)?;
                writer.write_all(sentinel).at(data_path)?;
            }
            offset += entry.filesize + sentinel.len() as u64;
            entries.push(entry);
        }

        if let Some(mut writer) = data {
            writer.flush().at(data_path)?;
        }

        let header = Header::new(entries.len(), offset, self.hash);
        info!(
            version = %header.format_version,
            revision = header.format_revision,
            files = header.file_count,
            total_bytes = header.total_bytes,
            hash = %header.hash,
            "archive header"
        );
        Ok(Index { header, entries })
    }
}

/// `<root>.<extension>`, next to the root directory.
fn sibling(root: &Path, extension: &str) -> PathBuf {
    let trimmed: PathBuf = root.components().collect();
    let mut name = OsString::from(trimmed.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Archive `files` under `root` with default settings.
pub fn archive(root: &Path, files: &[PathBuf]) -> Result<Archived> {
    Archiver::new().archive(root, files, None, None)
}
