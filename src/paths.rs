//! Destination paths for exported files.
//!
//! Tablet names may contain anything, so every path segment goes through
//! [`normalize`] before it touches the filesystem. [`PathAllocator`] then hands
//! out paths that are unique within one export job.

use std::collections::HashMap;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use thiserror::Error;
use tracing::trace;

/// Device names some filesystems refuse as a file stem.
const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Errors from path resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The item has no path segments, so there is no file name to derive.
    #[error("document path is empty")]
    EmptyPath,
}

/// Makes a single tablet name safe to use as a file or folder name.
///
/// Control characters and `" * / : < > ? \ |` become `-`. A stem matching a
/// reserved device name (`NUL`, `COM1`, ...) gets `-1` appended before its
/// extension.
#[must_use]
pub fn normalize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '"' | '*' | '/' | ':' | '<' | '>' | '?' | '\\' | '|' | '\u{0}'..='\u{1f}' | '\u{7f}' => {
                '-'
            }
            c => c,
        })
        .collect();

    let (stem, ext) = split_extension(&replaced);
    if RESERVED_NAMES.contains(&stem) {
        format!("{stem}-1{ext}")
    } else {
        replaced
    }
}

/// Splits `name` at the last `.` of its final `/`-separated component.
///
/// The extension keeps its dot; a name without one yields `""`.
fn split_extension(name: &str) -> (&str, &str) {
    let start = name.rfind('/').map_or(0, |i| i + 1);
    match name[start..].rfind('.') {
        Some(dot) => name.split_at(start + dot),
        None => (name, ""),
    }
}

/// Turns a normalized segment into one that cannot address another directory.
fn defuse_segment(segment: String) -> String {
    match segment.as_str() {
        "." => "-".to_string(),
        ".." => "--".to_string(),
        _ => segment,
    }
}

/// Computes `root / wrapper / segments... ` with the last segment ending in `.{format}`.
///
/// Every segment and the wrapper are normalized independently. Empty
/// components (an empty wrapper, say) are skipped. The result is cleaned
/// lexically and uses the host separator.
///
/// # Errors
///
/// Returns [`PathError::EmptyPath`] when `segments` is empty.
pub fn resolve_path(
    root: &Path,
    wrapper: &str,
    segments: &[String],
    format: &str,
) -> Result<PathBuf, PathError> {
    resolve_slash_path(root, wrapper, segments, format).map(|joined| to_host_path(&joined))
}

fn resolve_slash_path(
    root: &Path,
    wrapper: &str,
    segments: &[String],
    format: &str,
) -> Result<String, PathError> {
    let (last, parents) = segments.split_last().ok_or(PathError::EmptyPath)?;

    let suffix = format!(".{format}");
    let file_name = if split_extension(last).1 == suffix {
        last.clone()
    } else {
        format!("{last}{suffix}")
    };

    let mut parts: Vec<String> = Vec::with_capacity(segments.len() + 2);
    parts.push(root_to_slash(root));
    parts.push(defuse_segment(normalize(wrapper)));
    parts.extend(parents.iter().map(|s| defuse_segment(normalize(s))));
    parts.push(defuse_segment(normalize(&file_name)));

    let joined = parts
        .iter()
        .filter(|part| !part.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("/");
    Ok(clean(&joined))
}

fn root_to_slash(root: &Path) -> String {
    let root = root.to_string_lossy();
    if MAIN_SEPARATOR == '/' {
        root.into_owned()
    } else {
        root.replace(MAIN_SEPARATOR, "/")
    }
}

fn to_host_path(slash_path: &str) -> PathBuf {
    if MAIN_SEPARATOR == '/' {
        PathBuf::from(slash_path)
    } else {
        PathBuf::from(slash_path.replace('/', &MAIN_SEPARATOR.to_string()))
    }
}

/// Lexical cleanup of a `/`-separated path: collapses repeated separators,
/// drops `.` and resolves `..` against preceding components.
fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match out.last() {
                Some(&last) if last != ".." => {
                    out.pop();
                }
                _ if rooted => {}
                _ => out.push(".."),
            },
            part => out.push(part),
        }
    }

    let body = out.join("/");
    match (rooted, body.is_empty()) {
        (true, _) => format!("/{body}"),
        (false, true) => ".".to_string(),
        (false, false) => body,
    }
}

/// Hands out destination paths that are unique within one export job.
///
/// Clone it to take a checkpoint; assigning the clone back undoes every
/// allocation made since.
#[derive(Debug, Clone, Default)]
pub struct PathAllocator {
    /// Resolved path to the number of times it has been requested.
    seen: HashMap<String, usize>,
}

impl PathAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves a path like [`resolve_path`], renaming on collision.
    ///
    /// The `n`th repeat of a path inserts `-{n}` before the last segment's own
    /// extension and tries again, so `file2` colliding with an existing
    /// `file2-1` becomes `file2-1-1`.
    ///
    /// # Errors
    ///
    /// Returns [`PathError::EmptyPath`] when `segments` is empty.
    pub fn resolve_unique_path(
        &mut self,
        root: &Path,
        wrapper: &str,
        segments: &[String],
        format: &str,
    ) -> Result<PathBuf, PathError> {
        let mut segments = segments.to_vec();
        loop {
            let candidate = resolve_slash_path(root, wrapper, &segments, format)?;
            let count = self.seen.entry(candidate.clone()).or_insert(0);
            let repeats = *count;
            *count += 1;

            if repeats == 0 {
                trace!(path = %candidate, "allocated export path");
                return Ok(to_host_path(&candidate));
            }

            if let Some(last) = segments.last_mut() {
                let (stem, ext) = split_extension(last);
                *last = format!("{stem}-{repeats}{ext}");
            }
        }
    }

    /// Number of distinct paths requested so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Returns true if nothing has been allocated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
