//! FTP implementation of [`RemoteTransport`]
//!
//! Wraps a blocking `suppaftp` client; every operation runs on the blocking
//! thread pool via `spawn_blocking` so the async pipeline never stalls on
//! socket I/O. One physical connection is held behind a mutex — the session
//! serializes all access, the mutex only guards against misuse.
//!
//! FTP reports both "no such file" and "permission denied" as a 550 reply,
//! so the two are told apart by reply text. Servers word these replies
//! inconsistently; the classifier errs towards `PermissionDenied` only on an
//! explicit denial phrase, which is what the directory-validation fallback
//! needs to stay sound.

use crate::config::EndpointConfig;
use crate::error::TransferError;
use crate::transfer::transport::{
    RemoteAttributes, RemoteEntry, RemoteTransport, TransportResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use suppaftp::list::File as ListEntry;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};
use tracing::debug;

/// FTP transport over a single authenticated connection
pub struct FtpTransport {
    endpoint: EndpointConfig,
    stream: Arc<Mutex<Option<FtpStream>>>,
}

impl FtpTransport {
    /// Create a transport for the given endpoint; no connection is made yet
    #[must_use]
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            stream: Arc::new(Mutex::new(None)),
        }
    }

    /// Run a closure against the connected stream on the blocking pool
    async fn with_stream<T, F>(&self, op: F) -> TransportResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> TransportResult<T> + Send + 'static,
    {
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            let mut guard = stream
                .lock()
                .map_err(|_| TransferError::TaskJoin("transport mutex poisoned".into()))?;
            let ftp = guard.as_mut().ok_or(TransferError::NotConnected)?;
            op(ftp)
        })
        .await
        .map_err(|e| TransferError::TaskJoin(e.to_string()))?
    }
}

#[async_trait]
impl RemoteTransport for FtpTransport {
    async fn connect(&self) -> TransportResult<()> {
        let endpoint = self.endpoint.clone();
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            let addr = format!("{}:{}", endpoint.host, endpoint.port);
            let mut ftp = FtpStream::connect(addr.as_str())
                .map_err(|e| TransferError::ConnectionFailed(e.to_string()))?;
            ftp.login(endpoint.username.as_str(), endpoint.password.as_str())
                .map_err(|e| TransferError::AuthFailed(e.to_string()))?;
            ftp.transfer_type(FileType::Binary)
                .map_err(|e| classify(e, &addr))?;

            let mut guard = stream
                .lock()
                .map_err(|_| TransferError::TaskJoin("transport mutex poisoned".into()))?;
            // A leftover dead connection is simply dropped
            *guard = Some(ftp);
            Ok(())
        })
        .await
        .map_err(|e| TransferError::TaskJoin(e.to_string()))?
    }

    async fn disconnect(&self) -> TransportResult<()> {
        let stream = Arc::clone(&self.stream);
        tokio::task::spawn_blocking(move || {
            let mut guard = stream
                .lock()
                .map_err(|_| TransferError::TaskJoin("transport mutex poisoned".into()))?;
            if let Some(mut ftp) = guard.take() {
                // The connection is dropped either way; a failed goodbye is
                // only worth a debug line
                if let Err(e) = ftp.quit() {
                    debug!(error = %e, "QUIT failed while disconnecting");
                }
            }
            Ok(())
        })
        .await
        .map_err(|e| TransferError::TaskJoin(e.to_string()))?
    }

    async fn exists(&self, path: &str) -> TransportResult<bool> {
        let path = path.to_string();
        self.with_stream(move |ftp| match ftp.size(path.as_str()) {
            Ok(_) => Ok(true),
            Err(err) => match classify(err, &path) {
                // SIZE answers 550 for directories too; a CWD probe settles it
                TransferError::NotFound { .. } => directory_exists(ftp, &path),
                other => Err(other),
            },
        })
        .await
    }

    async fn list_dir(
        &self,
        path: &str,
        limit: Option<usize>,
    ) -> TransportResult<Vec<RemoteEntry>> {
        let path = path.to_string();
        self.with_stream(move |ftp| {
            let lines = ftp
                .list(Some(path.as_str()))
                .map_err(|e| classify(e, &path))?;
            let mut entries = Vec::new();
            for line in &lines {
                match ListEntry::try_from(line.as_str()) {
                    Ok(parsed) => entries.push(RemoteEntry {
                        name: parsed.name().to_string(),
                        is_dir: parsed.is_directory(),
                        is_file: parsed.is_file(),
                        size: Some(parsed.size() as u64),
                        modified: Some(DateTime::<Utc>::from(parsed.modified())),
                    }),
                    Err(e) => {
                        debug!(line = %line, error = %e, "Skipping unparseable LIST line");
                    }
                }
                if let Some(limit) = limit
                    && entries.len() >= limit
                {
                    break;
                }
            }
            Ok(entries)
        })
        .await
    }

    async fn attributes(&self, path: &str) -> TransportResult<RemoteAttributes> {
        let path = path.to_string();
        self.with_stream(move |ftp| {
            if directory_exists(ftp, &path)? {
                return Ok(RemoteAttributes {
                    size: None,
                    modified: None,
                    is_dir: true,
                });
            }
            let size = ftp.size(path.as_str()).map_err(|e| classify(e, &path))?;
            // MDTM is optional server-side; missing support degrades to None
            let modified = ftp
                .mdtm(path.as_str())
                .ok()
                .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
            Ok(RemoteAttributes {
                size: Some(size as u64),
                modified,
                is_dir: false,
            })
        })
        .await
    }

    async fn upload(&self, bytes: &[u8], remote_path: &str) -> TransportResult<()> {
        let path = remote_path.to_string();
        let bytes = bytes.to_vec();
        self.with_stream(move |ftp| {
            let mut reader = Cursor::new(bytes);
            ftp.put_file(path.as_str(), &mut reader)
                .map_err(|e| classify(e, &path))?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, path: &str) -> TransportResult<()> {
        let path = path.to_string();
        self.with_stream(move |ftp| ftp.rm(path.as_str()).map_err(|e| classify(e, &path)))
            .await
    }

    fn name(&self) -> &'static str {
        "ftp"
    }
}

/// Probe whether `path` is a directory by changing into it and back
fn directory_exists(ftp: &mut FtpStream, path: &str) -> TransportResult<bool> {
    let original = ftp.pwd().map_err(|e| classify(e, path))?;
    match ftp.cwd(path) {
        Ok(()) => {
            ftp.cwd(original.as_str())
                .map_err(|e| classify(e, &original))?;
            Ok(true)
        }
        Err(err) => match classify(err, path) {
            TransferError::NotFound { .. } => Ok(false),
            other => Err(other),
        },
    }
}

/// Map an FTP error onto the domain error taxonomy
fn classify(err: FtpError, path: &str) -> TransferError {
    match err {
        FtpError::ConnectionError(e) => TransferError::Protocol(format!("connection error: {e}")),
        FtpError::UnexpectedResponse(response) => {
            let body = String::from_utf8_lossy(&response.body).trim().to_string();
            match response.status {
                Status::NotLoggedIn => TransferError::AuthFailed(body),
                Status::FileUnavailable => {
                    if is_denial(&body) {
                        TransferError::PermissionDenied {
                            path: path.to_string(),
                        }
                    } else {
                        TransferError::NotFound {
                            path: path.to_string(),
                        }
                    }
                }
                status => TransferError::Protocol(format!("unexpected reply ({status:?}): {body}")),
            }
        }
        other => TransferError::Protocol(other.to_string()),
    }
}

/// Whether a 550 reply body spells out a permission problem
fn is_denial(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("denied") || body.contains("permission") || body.contains("access")
}
