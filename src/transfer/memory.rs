//! In-memory implementation of [`RemoteTransport`]
//!
//! A complete in-process remote filesystem with failure injection. It backs
//! the crate's own test suite and gives embedders a dry-run endpoint that
//! exercises the full session/coordinator machinery without a network.

use crate::error::TransferError;
use crate::transfer::transport::{
    RemoteAttributes, RemoteEntry, RemoteTransport, TransportResult,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    connected: bool,
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    // Failure injection
    connect_failures: u32,
    upload_failures: u32,
    deny_stat: bool,
    deny_list: bool,
    deny_delete: bool,
    drop_uploaded_bytes: bool,
    // Call counters
    connects: u32,
    disconnects: u32,
    uploads: u32,
}

/// In-memory remote endpoint with failure injection
///
/// Cloning shares the underlying filesystem, so a test can keep a handle for
/// assertions while the session owns another.
#[derive(Clone)]
pub struct InMemoryTransport {
    inner: Arc<Mutex<Inner>>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    /// Create an empty remote filesystem containing only the root directory
    #[must_use]
    pub fn new() -> Self {
        let mut inner = Inner::default();
        inner.dirs.insert("/".to_string());
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding this lock only happens on test assertion
        // failure; propagating the poison hides the original panic
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Create a remote directory
    pub fn add_dir(&self, path: &str) {
        self.lock().dirs.insert(normalize(path));
    }

    /// Seed a remote file
    pub fn add_file(&self, path: &str, bytes: &[u8]) {
        self.lock().files.insert(normalize(path), bytes.to_vec());
    }

    /// Content of a remote file, if present
    #[must_use]
    pub fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&normalize(path)).cloned()
    }

    /// Names of all remote files (full paths)
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.lock().files.keys().cloned().collect()
    }

    /// Fail the next `count` connect attempts
    pub fn fail_next_connects(&self, count: u32) {
        self.lock().connect_failures = count;
    }

    /// Fail the next `count` uploads with a connection-class error
    pub fn fail_next_uploads(&self, count: u32) {
        self.lock().upload_failures = count;
    }

    /// Make `exists`/`attributes` report permission denied
    pub fn set_deny_stat(&self, deny: bool) {
        self.lock().deny_stat = deny;
    }

    /// Make `list_dir` report permission denied
    pub fn set_deny_list(&self, deny: bool) {
        self.lock().deny_list = deny;
    }

    /// Make `delete` report permission denied
    pub fn set_deny_delete(&self, deny: bool) {
        self.lock().deny_delete = deny;
    }

    /// Make uploads report success without recording the file
    ///
    /// Simulates a server that acknowledges a transfer it silently discarded,
    /// which is exactly what post-upload verification exists to catch.
    pub fn set_drop_uploaded_bytes(&self, drop: bool) {
        self.lock().drop_uploaded_bytes = drop;
    }

    /// Number of successful connects so far
    #[must_use]
    pub fn connect_count(&self) -> u32 {
        self.lock().connects
    }

    /// Number of disconnect calls so far
    #[must_use]
    pub fn disconnect_count(&self) -> u32 {
        self.lock().disconnects
    }

    /// Number of upload attempts so far (including injected failures)
    #[must_use]
    pub fn upload_count(&self) -> u32 {
        self.lock().uploads
    }
}

#[async_trait]
impl RemoteTransport for InMemoryTransport {
    async fn connect(&self) -> TransportResult<()> {
        let mut inner = self.lock();
        if inner.connect_failures > 0 {
            inner.connect_failures -= 1;
            return Err(TransferError::ConnectionFailed(
                "injected connect failure".into(),
            ));
        }
        inner.connected = true;
        inner.connects += 1;
        Ok(())
    }

    async fn disconnect(&self) -> TransportResult<()> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.disconnects += 1;
        Ok(())
    }

    async fn exists(&self, path: &str) -> TransportResult<bool> {
        let inner = self.lock();
        require_connected(&inner)?;
        if inner.deny_stat {
            return Err(TransferError::PermissionDenied {
                path: path.to_string(),
            });
        }
        let path = normalize(path);
        Ok(inner.files.contains_key(&path) || inner.dirs.contains(&path))
    }

    async fn list_dir(
        &self,
        path: &str,
        limit: Option<usize>,
    ) -> TransportResult<Vec<RemoteEntry>> {
        let inner = self.lock();
        require_connected(&inner)?;
        if inner.deny_list {
            return Err(TransferError::PermissionDenied {
                path: path.to_string(),
            });
        }
        let dir = normalize(path);
        if !inner.dirs.contains(&dir) {
            return Err(TransferError::NotFound { path: dir });
        }

        let mut entries = Vec::new();
        let prefix = if dir == "/" { "/".to_string() } else { format!("{dir}/") };
        for (file, bytes) in &inner.files {
            if let Some(rest) = file.strip_prefix(&prefix)
                && !rest.contains('/')
            {
                entries.push(RemoteEntry {
                    name: rest.to_string(),
                    is_dir: false,
                    is_file: true,
                    size: Some(bytes.len() as u64),
                    modified: Some(Utc::now()),
                });
            }
        }
        for sub in &inner.dirs {
            if let Some(rest) = sub.strip_prefix(&prefix)
                && !rest.is_empty()
                && !rest.contains('/')
            {
                entries.push(RemoteEntry {
                    name: rest.to_string(),
                    is_dir: true,
                    is_file: false,
                    size: None,
                    modified: None,
                });
            }
        }
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    async fn attributes(&self, path: &str) -> TransportResult<RemoteAttributes> {
        let inner = self.lock();
        require_connected(&inner)?;
        if inner.deny_stat {
            return Err(TransferError::PermissionDenied {
                path: path.to_string(),
            });
        }
        let path = normalize(path);
        if inner.dirs.contains(&path) {
            return Ok(RemoteAttributes {
                size: None,
                modified: None,
                is_dir: true,
            });
        }
        match inner.files.get(&path) {
            Some(bytes) => Ok(RemoteAttributes {
                size: Some(bytes.len() as u64),
                modified: Some(Utc::now()),
                is_dir: false,
            }),
            None => Err(TransferError::NotFound { path }),
        }
    }

    async fn upload(&self, bytes: &[u8], remote_path: &str) -> TransportResult<()> {
        let mut inner = self.lock();
        require_connected(&inner)?;
        inner.uploads += 1;
        if inner.upload_failures > 0 {
            inner.upload_failures -= 1;
            return Err(TransferError::Protocol(
                "connection reset during transfer".into(),
            ));
        }
        if inner.drop_uploaded_bytes {
            return Ok(());
        }
        inner.files.insert(normalize(remote_path), bytes.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &str) -> TransportResult<()> {
        let mut inner = self.lock();
        require_connected(&inner)?;
        if inner.deny_delete {
            return Err(TransferError::PermissionDenied {
                path: path.to_string(),
            });
        }
        let path = normalize(path);
        if inner.files.remove(&path).is_none() {
            return Err(TransferError::NotFound { path });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn require_connected(inner: &Inner) -> TransportResult<()> {
    if inner.connected {
        Ok(())
    } else {
        Err(TransferError::NotConnected)
    }
}

/// Leading slash, no trailing slash (except the root itself)
fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}
