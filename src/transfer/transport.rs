//! Transport trait and remote filesystem types
//!
//! [`RemoteTransport`] is the seam between the session state machine and a
//! concrete protocol client. Implementations wrap one physical connection;
//! the session owns when that connection is opened and torn down.

use crate::error::TransferError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransferError>;

/// One entry of a remote directory listing
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    /// Entry name (no directory component)
    pub name: String,
    /// Whether the entry is a directory
    pub is_dir: bool,
    /// Whether the entry is a regular file
    pub is_file: bool,
    /// Size in bytes, when the server reports one
    pub size: Option<u64>,
    /// Last modification time, when the server reports one
    pub modified: Option<DateTime<Utc>>,
}

/// Attributes of a single remote path
#[derive(Debug, Clone)]
pub struct RemoteAttributes {
    /// Size in bytes, when the server reports one
    pub size: Option<u64>,
    /// Last modification time, when the server reports one
    pub modified: Option<DateTime<Utc>>,
    /// Whether the path is a directory
    pub is_dir: bool,
}

/// Trait for remote file-transfer endpoints
///
/// This trait defines the primitives the delivery pipeline needs from a
/// remote endpoint: session lifecycle, existence/stat/list probes, upload,
/// and delete. Implementations can speak a real protocol
/// ([`FtpTransport`](crate::transfer::FtpTransport)) or keep everything
/// in-process ([`InMemoryTransport`](crate::transfer::InMemoryTransport)).
///
/// Error contract: a path the server refuses to inspect must surface as
/// [`TransferError::PermissionDenied`], never as `Ok(false)` or
/// [`TransferError::NotFound`] — the directory validation fallback depends
/// on the distinction.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Establish the connection and authenticate
    ///
    /// # Errors
    ///
    /// Returns `ConnectionFailed` or `AuthFailed`; the caller reports the
    /// failure and owns any retry policy.
    async fn connect(&self) -> TransportResult<()>;

    /// Tear down the connection, discarding any half-open state
    ///
    /// # Errors
    ///
    /// Returns an error if the goodbye exchange fails; the connection is
    /// dropped regardless.
    async fn disconnect(&self) -> TransportResult<()>;

    /// Whether the remote path exists (file or directory)
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` when the server refuses the probe — which
    /// is explicitly not the same as `Ok(false)`.
    async fn exists(&self, path: &str) -> TransportResult<bool>;

    /// List a remote directory, optionally stopping after `limit` entries
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `PermissionDenied`, or a protocol error.
    async fn list_dir(&self, path: &str, limit: Option<usize>)
    -> TransportResult<Vec<RemoteEntry>>;

    /// Fetch attributes of a remote path
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `PermissionDenied`, or a protocol error.
    async fn attributes(&self, path: &str) -> TransportResult<RemoteAttributes>;

    /// Transfer bytes to the remote path
    ///
    /// Transport success only means the protocol exchange completed; the
    /// session independently verifies the destination exists afterwards.
    ///
    /// # Errors
    ///
    /// Returns a protocol or connection error.
    async fn upload(&self, bytes: &[u8], remote_path: &str) -> TransportResult<()>;

    /// Delete a remote file
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `PermissionDenied`, or a protocol error.
    async fn delete(&self, path: &str) -> TransportResult<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

/// Join a remote directory and a file name with exactly one separator
#[must_use]
pub fn join_remote(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_remote_normalizes_separators() {
        assert_eq!(join_remote("/inbox", "a.txt"), "/inbox/a.txt");
        assert_eq!(join_remote("/inbox/", "a.txt"), "/inbox/a.txt");
        assert_eq!(join_remote("/inbox", "/a.txt"), "/inbox/a.txt");
        assert_eq!(join_remote("/", "a.txt"), "/a.txt");
        assert_eq!(join_remote("", "a.txt"), "/a.txt");
    }
}
