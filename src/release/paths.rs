//! Release-relative paths.
//!
//! Archive entries and manifest records use `/`-separated paths relative to
//! the release directory. Anything that could land outside the destination is
//! rejected before it touches the filesystem.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Path of `path` relative to `root`, `/`-separated.
/// Returns `None` if `path` is not under `root` or is not valid UTF-8.
pub fn relative_posix_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Resolve a release-relative path under `root`.
pub fn validate_path(root: &Path, relative: &str) -> Result<PathBuf> {
    if relative.is_empty() {
        return Err(Error::UnsafePath(relative.to_string()));
    }

    if relative.starts_with('/') || Path::new(relative).is_absolute() {
        return Err(Error::AbsolutePath(relative.to_string()));
    }

    let mut full = root.to_path_buf();
    for part in relative.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(Error::UnsafePath(relative.to_string())),
            _ => {}
        }
        // Reject anything the platform would interpret as more than one
        // normal component (drive prefixes, backslashes on Windows)
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => full.push(part),
            _ => return Err(Error::UnsafePath(relative.to_string())),
        }
    }

    if full == root {
        return Err(Error::UnsafePath(relative.to_string()));
    }
    Ok(full)
}
