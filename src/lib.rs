//! # outbox-relay
//!
//! A batch delivery pipeline: pending records are pulled from a data source,
//! rendered into fixed-width or delimited message files, staged locally,
//! uploaded to a remote FTP endpoint with bounded retries, archived into
//! per-day buckets, and finally marked processed at the source.
//!
//! Delivery is at-least-once. A record is marked processed only after its
//! file is confirmed on the remote endpoint, and files left in staging by a
//! crashed run re-deliver on the next cycle.
//!
//! ## Architecture
//!
//! - [`source`] — the [`DataSource`](source::DataSource) seam to whatever
//!   store holds pending records
//! - [`encoder`] — pure rendering of records into message text
//! - [`filestore`] — staging, date-bucketed archiving, retention cleanup
//! - [`transfer`] — transport trait, FTP client, in-memory endpoint, and the
//!   session state machine (directory validation, write probing, post-upload
//!   verification)
//! - [`retry`] — the exponential backoff law (doubles per retry, 30 s cap)
//! - [`coordinator`] — the single-task loop tying it all together
//!
//! ## Example
//!
//! ```no_run
//! use outbox_relay::{Config, DeliveryCoordinator};
//! use outbox_relay::source::InMemorySource;
//! use outbox_relay::transfer::FtpTransport;
//!
//! # async fn run(config: Config) -> outbox_relay::Result<()> {
//! let transport = FtpTransport::new(config.endpoint.clone());
//! let source = InMemorySource::new();
//! let coordinator =
//!     DeliveryCoordinator::new(config, Box::new(source), Box::new(transport))?;
//! outbox_relay::run_with_shutdown(coordinator).await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

pub mod config;
pub mod coordinator;
pub mod encoder;
pub mod error;
pub mod filestore;
pub mod retry;
pub mod source;
pub mod transfer;
pub mod types;

pub use config::{Config, DeliveryConfig, EndpointConfig, FileNamingPolicy};
pub use coordinator::DeliveryCoordinator;
pub use encoder::{FieldKey, FieldSpec, FormatSpec, encode};
pub use error::{ArchiveError, EncodeError, Error, Result, TransferError};
pub use filestore::FileStore;
pub use retry::{Backoff, MAX_BACKOFF};
pub use types::{CycleReport, FieldValue, SourceRecord, SourceStatistics, UploadOutcome};

use tracing::warn;

/// Run a coordinator until SIGTERM/SIGINT, then shut down cleanly
///
/// The signal cancels the coordinator's token; in-flight file operations
/// complete and the remote session is disconnected before this returns.
///
/// # Errors
///
/// Propagates the coordinator's terminal error, if any.
pub async fn run_with_shutdown(mut coordinator: DeliveryCoordinator) -> Result<()> {
    let token = coordinator.cancellation_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Shutdown signal received, finishing in-flight work");
        token.cancel();
    });
    coordinator.run().await
}

/// Wait for SIGTERM or SIGINT (Ctrl-C on non-Unix platforms)
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Could not register SIGTERM handler, listening for Ctrl-C only");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Could not listen for Ctrl-C");
                }
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl-C");
        }
    }
}
