//! File lifecycle management: staging, archiving, and retention cleanup
//!
//! [`FileStore`] owns the two local directories of the pipeline: the staging
//! directory where freshly encoded message files are written, and the archive
//! root where delivered files are filed into per-day buckets.
//!
//! Archiving is deliberately copy-then-delete-source, never an atomic move:
//! an exclusive-create copy makes a destination-exists race detectable, so a
//! collision is resolved by retrying under a new name instead of silently
//! overwriting or hard-failing. A file that cannot be safely copied stays in
//! staging — nothing is ever lost between successful delivery and archival
//! bookkeeping.

use crate::config::FileNamingPolicy;
use crate::error::{ArchiveError, Result};
use chrono::{DateTime, Days, Local, NaiveDate};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Fallback timestamp pattern used when the configured one is invalid
const DEFAULT_TIMESTAMP_PATTERN: &str = "%Y%m%d%H%M%S";

/// Date format for archive bucket directory names
const BUCKET_FORMAT: &str = "%Y-%m-%d";

/// Maximum numeric collision suffixes tried before switching to a random token
const MAX_NUMERIC_SUFFIXES: u32 = 10;

/// Length of the random collision token
const RANDOM_TOKEN_LEN: usize = 8;

/// Manages staged message files and their date-bucketed archive
#[derive(Debug, Clone)]
pub struct FileStore {
    staging_dir: PathBuf,
    archive_root: PathBuf,
}

impl FileStore {
    /// Create a file store over the given staging and archive directories
    ///
    /// Directories are created lazily on first use, not here.
    #[must_use]
    pub fn new(staging_dir: impl Into<PathBuf>, archive_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            archive_root: archive_root.into(),
        }
    }

    /// The staging directory message files are written into
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Write message content to a uniquely-named file in the staging directory
    ///
    /// The filename is `{prefix}{timestamp}{suffix}` per the naming policy.
    /// An invalid timestamp pattern never fails creation: the fixed default
    /// pattern is used instead and the degradation is logged. A name collision
    /// within the same timestamp gets an incrementing numeric suffix.
    ///
    /// # Errors
    ///
    /// Returns an error only when the staging directory cannot be created or
    /// the file cannot be written.
    pub fn create_file(&self, content: &str, policy: &FileNamingPolicy) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.staging_dir)?;

        let now = Local::now();
        let timestamp = match render_pattern(&policy.timestamp_pattern, now) {
            Some(rendered) => rendered,
            None => {
                warn!(
                    pattern = %policy.timestamp_pattern,
                    fallback = DEFAULT_TIMESTAMP_PATTERN,
                    "Invalid timestamp pattern in naming policy, using fallback"
                );
                now.format(DEFAULT_TIMESTAMP_PATTERN).to_string()
            }
        };

        let base = format!("{}{}{}", policy.prefix, timestamp, policy.suffix);
        let path = unique_staging_path(&self.staging_dir, &base);
        std::fs::write(&path, content)?;
        debug!(path = %path.display(), bytes = content.len(), "Staged message file");
        Ok(path)
    }

    /// Archive a delivered file into `archive_root/YYYY-MM-DD/`
    ///
    /// The bucket date and the `_uploaded_HHMMSS` name component both derive
    /// from `uploaded_at` (upload-completion time); `None` means now.
    /// Collision policy, applied in order: the untouched name, numeric
    /// suffixes `_1`..`_10`, then an 8-character random token. If the
    /// exclusive-create copy still reports a pre-existing destination (a race
    /// with a concurrent writer), one more fresh token is tried.
    ///
    /// On success the staged source file is deleted. On any failure the
    /// source is left in place.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket directory cannot be created, every
    /// collision resolution strategy is exhausted, or the copy fails.
    pub fn archive(&self, path: &Path, uploaded_at: Option<DateTime<Local>>) -> Result<PathBuf> {
        let uploaded_at = uploaded_at.unwrap_or_else(Local::now);
        let bucket = self
            .archive_root
            .join(uploaded_at.format(BUCKET_FORMAT).to_string());
        std::fs::create_dir_all(&bucket)?;

        let base = archived_base_name(path, uploaded_at);
        let dest = free_destination(&bucket, &base)
            .ok_or_else(|| ArchiveError::Exhausted {
                path: path.to_path_buf(),
            })?;

        let dest = match copy_exclusive(path, &dest) {
            Ok(()) => dest,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                // Lost a race with a concurrent writer; retry exactly once
                // under a fresh random token
                let retry = bucket.join(with_token(&base, &random_token()));
                warn!(
                    dest = %dest.display(),
                    retry = %retry.display(),
                    "Archive destination appeared concurrently, retrying with fresh token"
                );
                copy_exclusive(path, &retry).map_err(|e| ArchiveError::CopyFailed {
                    src: path.to_path_buf(),
                    dest: retry.clone(),
                    reason: e.to_string(),
                })?;
                retry
            }
            Err(err) => {
                return Err(ArchiveError::CopyFailed {
                    src: path.to_path_buf(),
                    dest,
                    reason: err.to_string(),
                }
                .into());
            }
        };

        // Source removal failure is not an archive failure: the copy is
        // already safe in the bucket. The leftover will be re-delivered.
        if let Err(e) = std::fs::remove_file(path) {
            warn!(
                path = %path.display(),
                error = %e,
                "Archived copy succeeded but staged source could not be removed"
            );
        }

        debug!(
            source = %path.display(),
            dest = %dest.display(),
            "Archived delivered file"
        );
        Ok(dest)
    }

    /// Delete archived files older than `retention_days`, returning how many
    /// files were removed
    ///
    /// Whole date buckets are aged by their directory name; emptied bucket
    /// directories are removed too. Directories whose name is not a valid
    /// `YYYY-MM-DD` date are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error only when the archive root exists but cannot be read.
    pub fn cleanup_archives(&self, retention_days: u32) -> Result<usize> {
        let cutoff = Local::now()
            .date_naive()
            .checked_sub_days(Days::new(u64::from(retention_days)))
            .unwrap_or(NaiveDate::MIN);

        let entries = match std::fs::read_dir(&self.archive_root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0usize;
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let Ok(bucket_date) = NaiveDate::parse_from_str(name, BUCKET_FORMAT) else {
                warn!(bucket = name, "Skipping archive directory with non-date name");
                continue;
            };
            if bucket_date >= cutoff {
                continue;
            }

            let bucket_path = entry.path();
            for file in std::fs::read_dir(&bucket_path)? {
                let file = file?;
                if file.file_type()?.is_file() {
                    match std::fs::remove_file(file.path()) {
                        Ok(()) => deleted += 1,
                        Err(e) => warn!(
                            path = %file.path().display(),
                            error = %e,
                            "Failed to delete aged archive file"
                        ),
                    }
                }
            }
            // Only empty buckets are removed; anything left behind (deletion
            // failures, stray subdirectories) keeps the bucket
            if let Err(e) = std::fs::remove_dir(&bucket_path) {
                debug!(
                    bucket = %bucket_path.display(),
                    error = %e,
                    "Aged bucket not removed (not empty)"
                );
            }
        }

        if deleted > 0 {
            debug!(deleted, retention_days, "Archive retention cleanup complete");
        }
        Ok(deleted)
    }

    /// List files left in the staging directory
    ///
    /// A non-empty result at startup means a previous run crashed between
    /// write and delivery; the coordinator re-delivers them (at-least-once).
    ///
    /// # Errors
    ///
    /// Returns an error when the staging directory exists but cannot be read.
    pub fn pending_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match std::fs::read_dir(&self.staging_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Remove a staged file without archiving it
    ///
    /// Used when `auto_archive` is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be removed.
    pub fn remove_staged(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }
}

/// Render a chrono pattern, returning `None` when it is unusable
///
/// A pattern is unusable when chrono rejects it outright or when it contains
/// no format specifiers at all (the output would never change between files).
fn render_pattern(pattern: &str, now: DateTime<Local>) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", now.format(pattern)).ok()?;
    if out.is_empty() || out == pattern {
        return None;
    }
    Some(out)
}

/// Resolve a staging-name collision with incrementing numeric suffixes
fn unique_staging_path(dir: &Path, base: &str) -> PathBuf {
    let candidate = dir.join(base);
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1u32;
    loop {
        let candidate = dir.join(with_suffix(base, &format!("_{n}")));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Build the archived base name: `{stem}_uploaded_{HHMMSS}{.ext}`
fn archived_base_name(path: &Path, uploaded_at: DateTime<Local>) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("archived");
    let time = uploaded_at.format("%H%M%S");
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_uploaded_{time}.{ext}"),
        None => format!("{stem}_uploaded_{time}"),
    }
}

/// Find a free destination in the bucket per the collision ladder
fn free_destination(bucket: &Path, base: &str) -> Option<PathBuf> {
    let candidate = bucket.join(base);
    if !candidate.exists() {
        return Some(candidate);
    }
    for n in 1..=MAX_NUMERIC_SUFFIXES {
        let candidate = bucket.join(with_suffix(base, &format!("_{n}")));
        if !candidate.exists() {
            return Some(candidate);
        }
    }
    // Numeric ladder exhausted; a random token ends the search either way
    let candidate = bucket.join(with_token(base, &random_token()));
    if candidate.exists() {
        return None;
    }
    Some(candidate)
}

/// Insert a suffix before the extension: `report.txt` + `_1` → `report_1.txt`
fn with_suffix(base: &str, suffix: &str) -> String {
    match base.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}{suffix}.{ext}"),
        None => format!("{base}{suffix}"),
    }
}

fn with_token(base: &str, token: &str) -> String {
    with_suffix(base, &format!("_{token}"))
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Copy refusing to overwrite the destination
///
/// `create_new` makes a destination-exists race observable as
/// `ErrorKind::AlreadyExists` instead of a silent overwrite.
fn copy_exclusive(src: &Path, dest: &Path) -> std::io::Result<()> {
    let mut reader = std::fs::File::open(src)?;
    let mut writer = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)?;
    std::io::copy(&mut reader, &mut writer)?;
    Ok(())
}
