//! API path helpers.
//!
//! API paths are `/`-separated and relative to the backend root. The root is
//! the empty string. Leading, trailing and repeated separators are ignored;
//! `..` segments are rejected so a path can never escape the root.

use crate::error::BackendError;

/// Normalize a caller-supplied path.
pub fn normalize(path: &str) -> Result<String, BackendError> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(BackendError::InvalidPath(path.to_string())),
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Join a normalized directory path and a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Parent directory of a normalized path (the root's parent is the root).
pub fn dirname(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Final segment of a normalized path.
pub fn basename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

/// Split a file name into stem and extension (extension keeps its dot).
///
/// A leading dot does not start an extension: `.bashrc` has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

/// Whether any segment of the path is hidden (starts with a dot).
pub fn is_hidden(path: &str) -> bool {
    path.split('/').any(|segment| segment.starts_with('.'))
}
