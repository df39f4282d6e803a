//! Conversion between filesystem paths and the `/`-separated names stored in
//! an index.
use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Name of `file` relative to `root`.
///
/// `file` may be given either under `root` or already relative to it. Parent
/// segments, absolute remainders and non-UTF-8 names are rejected.
pub fn archive_name(root: &Path, file: &Path) -> Result<String> {
    let relative = match file.strip_prefix(root) {
        Ok(relative) => relative,
        Err(_) if file.is_relative() => file,
        Err(_) => return Err(Error::path(file, "outside archive root")),
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(
                part.to_str()
                    .ok_or_else(|| Error::path(file, "not valid UTF-8"))?,
            ),
            Component::CurDir => {}
            _ => return Err(Error::path(file, "outside archive root")),
        }
    }

    if parts.is_empty() {
        return Err(Error::path(file, "names the archive root itself"));
    }
    Ok(parts.join("/"))
}

/// True when `name` is `/`-separated with no empty, `.` or trailing segments.
///
/// A leading `/` is left for [`check_name`] to reject as an escape.
pub fn is_normalized(name: &str) -> bool {
    name.split('/')
        .enumerate()
        .all(|(i, segment)| segment != "." && (i == 0 || !segment.is_empty()))
}

/// Relative path for a stored name, ensuring it stays below the target root.
pub fn check_name(name: &str) -> Result<PathBuf> {
    if name.is_empty() {
        return Err(Error::path(name, "empty filename"));
    }
    for segment in name.split('/') {
        match segment {
            "" | ".." => return Err(Error::path(name, "escapes the target root")),
            "." => return Err(Error::path(name, "non-normalized filename")),
            // a backslash would be a separator on Windows only
            _ if segment.contains('\\') => {
                return Err(Error::path(name, "non-normalized separator"))
            }
            _ => {}
        }
    }
    let path = Path::new(name);
    if !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(Error::path(name, "escapes the target root"));
    }
    Ok(path.to_path_buf())
}
