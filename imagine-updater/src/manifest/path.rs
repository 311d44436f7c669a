//! Relative install path handling.
//!
//! Manifest and catalog paths are stored with `/` separators and must stay
//! inside the install directory once joined to it.

use std::path::{Path, PathBuf};

/// Normalise a manifest path to its canonical `a/b/c` form.
///
/// Backslashes become `/` and `.` segments are dropped. Returns `None` for
/// empty paths, absolute paths, drive or scheme prefixes, empty segments
/// and `..` segments.
pub fn normalize_relative_path(raw: &str) -> Option<String> {
    let unified = raw.trim().replace('\\', "/");
    if unified.is_empty() || unified.starts_with('/') {
        return None;
    }

    let mut parts = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | ".." => return None,
            "." => continue,
            s if s.contains(':') || s.chars().any(char::is_control) => return None,
            s => parts.push(s),
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Join a normalised relative path onto `root`.
///
/// Returns `None` when `relative` is not a safe relative path.
pub fn resolve_in(root: &Path, relative: &str) -> Option<PathBuf> {
    let normalized = normalize_relative_path(relative)?;
    let mut full = root.to_path_buf();
    for segment in normalized.split('/') {
        full.push(segment);
    }
    Some(full)
}
