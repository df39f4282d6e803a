use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while archiving or extracting.
#[derive(Error, Debug)]
pub enum Error {
    /// A filename escapes its root, is not valid UTF-8, or collides with another entry.
    #[error("invalid path {}: {reason}", path.display())]
    Path { path: PathBuf, reason: &'static str },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The index could not be parsed, is unsupported, or is internally inconsistent.
    #[error("malformed index: {0}")]
    Format(String),

    #[error("hash mismatch: {filename}: {actual} != {expected}")]
    Integrity {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("data blob truncated: {filename} needs {filesize} bytes at offset {offset}, blob has {available}")]
    MissingData {
        filename: String,
        offset: u64,
        filesize: u64,
        available: u64,
    },

    #[error("no files to archive")]
    EmptyInput,

    #[error("no files found for {}/{pattern}", root.display())]
    NoFilesFound { root: PathBuf, pattern: String },

    #[error("invalid glob pattern {pattern:?}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHash(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn path(path: impl Into<PathBuf>, reason: &'static str) -> Self {
        Error::Path {
            path: path.into(),
            reason,
        }
    }
}

/// Attaches the offending path to an `io::Error`.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
