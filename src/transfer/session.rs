//! Session state machine over a [`RemoteTransport`]
//!
//! A [`TransferSession`] wraps exactly one physical connection:
//!
//! ```text
//! Disconnected --connect()--> Connected              (on success)
//! Disconnected --connect()--> Disconnected           (on auth/network error)
//! Connected    --disconnect()--> Disconnected
//! Connected    --connection-level op failure--> Disconnected
//! ```
//!
//! The session never reconnects on failure by itself — the retrying caller
//! owns that policy. It may, as a convenience, attempt one connect before an
//! operation when currently disconnected (auto-connect-on-demand).
//!
//! The central subtlety lives in [`validate_directory`]
//! (#method.validate_directory): permission-asymmetric servers grant read,
//! stat, and write permissions independently and sometimes inconsistently.
//! "Cannot prove the directory exists" is therefore never treated as "the
//! directory does not exist", and a failed non-essential probe (write test,
//! attribute fetch) never blocks an operation a weaker check already cleared.

use crate::error::TransferError;
use crate::transfer::transport::{
    RemoteAttributes, RemoteEntry, RemoteTransport, TransportResult, join_remote,
};
use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::{debug, info, warn};

/// Connection state of a [`TransferSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No usable connection
    Disconnected,
    /// Authenticated connection established
    Connected,
}

/// A single remote connection plus the diagnostics built on top of it
pub struct TransferSession {
    transport: Box<dyn RemoteTransport>,
    state: SessionState,
    verify_uploads: bool,
}

impl TransferSession {
    /// Create a session over the given transport; upload verification is on
    #[must_use]
    pub fn new(transport: Box<dyn RemoteTransport>) -> Self {
        Self {
            transport,
            state: SessionState::Disconnected,
            verify_uploads: true,
        }
    }

    /// Enable or disable post-upload destination verification
    #[must_use]
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify_uploads = verify;
        self
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Establish the connection; a no-op when already connected
    ///
    /// # Errors
    ///
    /// A connect failure is reported, not retried internally; the session
    /// remains `Disconnected`.
    pub async fn connect(&mut self) -> TransportResult<()> {
        if self.state == SessionState::Connected {
            return Ok(());
        }
        match self.transport.connect().await {
            Ok(()) => {
                self.state = SessionState::Connected;
                info!(transport = self.transport.name(), "Session connected");
                Ok(())
            }
            Err(e) => {
                warn!(
                    transport = self.transport.name(),
                    error = %e,
                    "Session connect failed"
                );
                Err(e)
            }
        }
    }

    /// Tear down the connection, discarding any half-open state
    ///
    /// Always safe to call; a failed goodbye still leaves the session
    /// `Disconnected`.
    pub async fn disconnect(&mut self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!(error = %e, "Transport disconnect reported an error");
        }
        self.state = SessionState::Disconnected;
    }

    /// Whether the remote path exists
    ///
    /// # Errors
    ///
    /// `PermissionDenied` when the server refuses the probe; connection-level
    /// failures drop the session to `Disconnected`.
    pub async fn exists(&mut self, path: &str) -> TransportResult<bool> {
        self.ensure_connected().await?;
        let result = self.transport.exists(path).await;
        self.observe(result)
    }

    /// List a remote directory
    ///
    /// # Errors
    ///
    /// See [`RemoteTransport::list_dir`].
    pub async fn list_dir(
        &mut self,
        path: &str,
        limit: Option<usize>,
    ) -> TransportResult<Vec<RemoteEntry>> {
        self.ensure_connected().await?;
        let result = self.transport.list_dir(path, limit).await;
        self.observe(result)
    }

    /// Fetch attributes of a remote path
    ///
    /// # Errors
    ///
    /// See [`RemoteTransport::attributes`].
    pub async fn attributes(&mut self, path: &str) -> TransportResult<RemoteAttributes> {
        self.ensure_connected().await?;
        let result = self.transport.attributes(path).await;
        self.observe(result)
    }

    /// Delete a remote file
    ///
    /// # Errors
    ///
    /// See [`RemoteTransport::delete`].
    pub async fn delete(&mut self, path: &str) -> TransportResult<()> {
        self.ensure_connected().await?;
        let result = self.transport.delete(path).await;
        self.observe(result)
    }

    /// Upload bytes and verify the destination exists afterwards
    ///
    /// Upload success is defined as "destination exists after transfer", not
    /// merely "no error during transfer". A size mismatch between local and
    /// remote after a reported-successful upload is logged as a warning, not
    /// treated as failure — verification of content is best-effort. A
    /// permission-denied existence probe is tolerated the same way: the
    /// transfer itself succeeded, which is the stronger signal.
    ///
    /// # Errors
    ///
    /// Returns `UploadFailed` when the destination provably does not exist
    /// after the transfer, or the underlying transfer error.
    pub async fn upload(&mut self, bytes: &[u8], remote_path: &str) -> TransportResult<()> {
        self.ensure_connected().await?;
        let result = self.transport.upload(bytes, remote_path).await;
        self.observe(result)?;

        if !self.verify_uploads {
            return Ok(());
        }

        let existence = self.transport.exists(remote_path).await;
        match self.observe(existence) {
            Ok(true) => {
                self.check_uploaded_size(bytes.len() as u64, remote_path).await;
                Ok(())
            }
            Ok(false) => Err(TransferError::UploadFailed {
                path: remote_path.to_string(),
                reason: "destination missing after transfer".to_string(),
            }),
            Err(TransferError::PermissionDenied { .. }) => {
                warn!(
                    path = remote_path,
                    "Cannot verify upload (stat denied); transfer itself succeeded"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort size comparison after a verified upload
    async fn check_uploaded_size(&mut self, local_size: u64, remote_path: &str) {
        let attrs = self.transport.attributes(remote_path).await;
        match self.observe(attrs) {
            Ok(attrs) => {
                if let Some(remote_size) = attrs.size
                    && remote_size != local_size
                {
                    warn!(
                        path = remote_path,
                        local_size,
                        remote_size,
                        "Uploaded size differs from local size"
                    );
                }
            }
            Err(e) => {
                debug!(path = remote_path, error = %e, "Could not fetch attributes for size check");
            }
        }
    }

    /// Validate that a remote directory exists and is usable as an upload
    /// destination
    ///
    /// Algorithm:
    /// 1. `exists(dir)`. On `PermissionDenied`, fall back to a single-entry
    ///    directory listing as a secondary existence probe; if that succeeds
    ///    the directory is treated as existing and accessible enough to
    ///    proceed (though not necessarily writable). `false` fails with
    ///    `NotFound`.
    /// 2. On `true`, fetch attributes; a non-directory fails with
    ///    `NotADirectory`. An attribute-fetch failure is tolerated — the
    ///    existence check already succeeded.
    ///
    /// Passing validation does not guarantee write access; see
    /// [`probe_write_access`](Self::probe_write_access).
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotADirectory`, `PermissionDenied` (only when every
    /// probe was denied), or a connection error.
    pub async fn validate_directory(&mut self, dir: &str) -> TransportResult<()> {
        self.ensure_connected().await?;

        let existence = self.transport.exists(dir).await;
        match self.observe(existence) {
            Ok(true) => {
                let attrs = self.transport.attributes(dir).await;
                match self.observe(attrs) {
                    Ok(attrs) if attrs.is_dir => Ok(()),
                    Ok(_) => Err(TransferError::NotADirectory {
                        path: dir.to_string(),
                    }),
                    Err(e) => {
                        warn!(
                            dir,
                            error = %e,
                            "Directory exists but attributes could not be fetched; proceeding"
                        );
                        Ok(())
                    }
                }
            }
            Ok(false) => Err(TransferError::NotFound {
                path: dir.to_string(),
            }),
            Err(TransferError::PermissionDenied { .. }) => {
                debug!(dir, "Directory stat denied; falling back to listing probe");
                let listing = self.transport.list_dir(dir, Some(1)).await;
                match self.observe(listing) {
                    Ok(_) => {
                        warn!(
                            dir,
                            "Directory stat denied but listing succeeded; treating as accessible"
                        );
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort write-permission probe
    ///
    /// Uploads a small uniquely-named temp file, confirms its existence, and
    /// deletes it. Returns whether the probe upload was accepted. Every
    /// failure along the way is reported as a warning only — some servers
    /// permit upload but deny existence checks or deletes, and the probe must
    /// never block core functionality.
    pub async fn probe_write_access(&mut self, dir: &str) -> bool {
        let name = format!(
            ".writetest_{}_{}.tmp",
            Utc::now().format("%H%M%S"),
            probe_token()
        );
        let path = join_remote(dir, &name);

        if let Err(e) = self.ensure_connected().await {
            warn!(dir, error = %e, "Write probe skipped: cannot connect");
            return false;
        }

        let upload = self.transport.upload(b"write probe", &path).await;
        if let Err(e) = self.observe(upload) {
            warn!(dir, error = %e, "Write probe upload failed");
            return false;
        }

        let existence = self.transport.exists(&path).await;
        match self.observe(existence) {
            Ok(true) => {}
            Ok(false) => {
                warn!(dir, probe = %path, "Write probe uploaded but is not visible");
            }
            Err(e) => {
                warn!(dir, error = %e, "Write probe uploaded but existence check failed");
            }
        }

        let deletion = self.transport.delete(&path).await;
        if let Err(e) = self.observe(deletion) {
            warn!(dir, probe = %path, error = %e, "Write probe file could not be deleted");
        }
        true
    }

    /// Auto-connect-on-demand: one connect attempt when disconnected
    async fn ensure_connected(&mut self) -> TransportResult<()> {
        if self.state == SessionState::Connected {
            return Ok(());
        }
        debug!(
            transport = self.transport.name(),
            "Session disconnected, auto-connecting"
        );
        self.connect().await
    }

    /// Drop to `Disconnected` when an operation failed at connection level
    fn observe<T>(&mut self, result: TransportResult<T>) -> TransportResult<T> {
        if let Err(e) = &result
            && e.is_connection_error()
        {
            debug!(error = %e, "Connection-level failure, session now disconnected");
            self.state = SessionState::Disconnected;
        }
        result
    }
}

fn probe_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(char::from)
        .collect()
}
