use crate::error::{Error, IoResultExt, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Pattern used when the caller does not give one: every file, recursively.
pub const DEFAULT_PATTERN: &str = "**/*";

/// Expand `root/pattern` into the regular files it matches, sorted by path.
/// Symlinks and directories are skipped.
pub fn scan_directory(root: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let root_str = root
        .to_str()
        .ok_or_else(|| Error::path(root, "not valid UTF-8"))?;
    let full = format!(
        "{}/{}",
        glob::Pattern::escape(root_str.trim_end_matches(['/', '\\'])),
        pattern
    );
    let paths = glob::glob(&full).map_err(|e| Error::Pattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let mut files = Vec::new();
    for path in paths {
        let path = path.map_err(|e| {
            let path = e.path().to_path_buf();
            Error::Io {
                path,
                source: e.into_error(),
            }
        })?;
        let metadata = fs::symlink_metadata(&path).at(&path)?;
        if metadata.is_file() {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(Error::NoFilesFound {
            root: root.to_path_buf(),
            pattern: pattern.to_string(),
        });
    }

    // Sort by path for determinism
    files.sort();
    Ok(files)
}
