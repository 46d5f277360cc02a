//! Remote transfer: transport trait, protocol clients, session machinery
//!
//! Layered bottom-up:
//! - [`transport`] defines [`RemoteTransport`], the protocol-agnostic seam
//! - [`ftp`] speaks FTP over a blocking client on the blocking thread pool
//! - [`memory`] is an in-process endpoint with failure injection
//! - [`session`] owns connection state and the diagnostics built on top
//!   (directory validation, write probing, post-upload verification)

pub mod ftp;
pub mod memory;
pub mod session;
pub mod transport;

pub use ftp::FtpTransport;
pub use memory::InMemoryTransport;
pub use session::{SessionState, TransferSession};
pub use transport::{
    RemoteAttributes, RemoteEntry, RemoteTransport, TransportResult, join_remote,
};
