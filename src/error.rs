//! Error types for outbox-relay
//!
//! This module provides comprehensive error handling for the library, including:
//! - Domain-specific error types (Transfer, Archive, Encode, Config)
//! - Connection-level error classification used by the session state machine
//! - Context information (paths, configuration keys, remote names)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for outbox-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for outbox-relay
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "endpoint.host")
        key: Option<String>,
    },

    /// Remote transfer error (connect, stat, list, upload, delete)
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// Archiving error (collision resolution, copy, cleanup)
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Message encoding error
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data source error (fetch, mark-processed, statistics)
    #[error("data source error: {0}")]
    Source(String),

    /// Shutdown in progress - not starting new delivery cycles
    #[error("shutdown in progress: not starting new delivery cycles")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Remote transfer errors
///
/// Variants carry enough context to distinguish the conditions the directory
/// validation fallback cares about: a path that provably does not exist is
/// `NotFound`, while a path the server refuses to even stat is
/// `PermissionDenied` — the two must never be conflated.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Failed to establish the TCP/protocol connection
    #[error("failed to connect to remote endpoint: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected by the remote endpoint
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// An operation was attempted without an established session
    #[error("no active session")]
    NotConnected,

    /// The remote endpoint denied access to a path
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The remote path access was denied to
        path: String,
    },

    /// The remote path does not exist
    #[error("remote path not found: {path}")]
    NotFound {
        /// The remote path that was not found
        path: String,
    },

    /// The remote path exists but is not a directory
    #[error("not a directory: {path}")]
    NotADirectory {
        /// The remote path that is not a directory
        path: String,
    },

    /// An upload transferred but the destination could not be confirmed
    #[error("upload failed for {path}: {reason}")]
    UploadFailed {
        /// The remote destination path
        path: String,
        /// The reason the upload was considered failed
        reason: String,
    },

    /// Protocol-level error reported by the remote endpoint
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The blocking transport task panicked or was cancelled
    #[error("transport task failed: {0}")]
    TaskJoin(String),
}

impl TransferError {
    /// Returns true if the error indicates the underlying connection is no
    /// longer usable and the session must drop to `Disconnected`.
    ///
    /// Protocol errors are classified by message content since FTP servers
    /// report connection loss in free-form reply text.
    pub fn is_connection_error(&self) -> bool {
        match self {
            TransferError::ConnectionFailed(_)
            | TransferError::AuthFailed(_)
            | TransferError::NotConnected
            | TransferError::TaskJoin(_) => true,
            TransferError::Protocol(msg) => {
                let msg = msg.to_lowercase();
                msg.contains("connection")
                    || msg.contains("timed out")
                    || msg.contains("timeout")
                    || msg.contains("broken pipe")
                    || msg.contains("reset")
            }
            TransferError::PermissionDenied { .. }
            | TransferError::NotFound { .. }
            | TransferError::NotADirectory { .. }
            | TransferError::UploadFailed { .. } => false,
        }
    }
}

/// Archiving errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Copying the staged file into the archive failed
    ///
    /// The field is named `src`, not `source`: these are paths, and a field
    /// called `source` would be wired up as the error's cause chain.
    #[error("failed to copy {src} to {dest}: {reason}")]
    CopyFailed {
        /// The staged source file
        src: PathBuf,
        /// The archive destination
        dest: PathBuf,
        /// The underlying I/O failure
        reason: String,
    },

    /// All collision resolution strategies were exhausted
    #[error("could not find a free archive name for {path}")]
    Exhausted {
        /// The file that could not be archived
        path: PathBuf,
    },
}

/// Message encoding errors
///
/// Encoding is total for every supported value type; this only fires for
/// input that has no text form at all, which is a configuration or
/// programming error rather than a runtime condition to recover from.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// A field value could not be rendered as text
    #[error("field {key} is not renderable: {reason}")]
    Unrenderable {
        /// The field key whose value could not be rendered
        key: String,
        /// Why the value has no text form
        reason: String,
    },
}
