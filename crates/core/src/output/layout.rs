//! Destination directory and file name resolution.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::retry::ErrorKind;

/// Errors from destination resolution.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to create output directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl OutputError {
    /// Classify this error for the retry policy.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            // ENOSPC
            OutputError::Create { source, .. } if source.raw_os_error() == Some(28) => {
                ErrorKind::DiskFull
            }
            OutputError::Create { .. } => ErrorKind::Io,
        }
    }
}

/// Resolves where a job's output lands.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    base_dir: PathBuf,
    per_source_subdirs: bool,
}

impl OutputLayout {
    pub fn new(base_dir: impl Into<PathBuf>, per_source_subdirs: bool) -> Self {
        Self {
            base_dir: base_dir.into(),
            per_source_subdirs,
        }
    }

    /// Resolve (and create) the destination directory for a job.
    ///
    /// Items of the same collection share one subdirectory; jobs with
    /// no collection land in the base directory.
    pub fn resolve(&self, collection: Option<&str>) -> Result<PathBuf, OutputError> {
        let dir = match collection {
            Some(name) if self.per_source_subdirs => self.base_dir.join(sanitize_name(name)),
            _ => self.base_dir.clone(),
        };

        std::fs::create_dir_all(&dir).map_err(|source| OutputError::Create {
            path: dir.clone(),
            source,
        })?;

        Ok(dir)
    }
}

/// Make a string safe to use as a file or directory name.
///
/// Replaces characters that are invalid on common filesystems, trims
/// whitespace and strips trailing dots.
pub fn sanitize_name(name: &str) -> String {
    const INVALID: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

    let cleaned: String = name
        .chars()
        .map(|c| if INVALID.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_end_matches('.');

    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Pick a path in `dir` for `stem.ext` that does not collide with an
/// existing file, appending `_1`, `_2`, ... as needed.
pub fn unique_path(dir: &Path, stem: &str, ext: &str) -> PathBuf {
    let candidate = dir.join(format!("{}.{}", stem, ext));
    if !candidate.exists() {
        return candidate;
    }

    let mut suffix = 1;
    loop {
        let candidate = dir.join(format!("{}_{}.{}", stem, suffix, ext));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}
