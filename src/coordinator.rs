//! The delivery loop: fetch, encode, stage, upload, reconcile
//!
//! [`DeliveryCoordinator`] drives the whole pipeline from a single task. Each
//! tick (one [`run_cycle`](DeliveryCoordinator::run_cycle)):
//!
//! 1. Picks up files left in staging by a previous run — a crash between
//!    write and delivery re-delivers them (at-least-once).
//! 2. Fetches pending records, encodes each, and stages the result. A record
//!    that fails to encode is skipped and stays pending. A record whose file
//!    is already sitting in staging from an earlier failed cycle is not
//!    staged again — repeated outage cycles must not multiply deliveries.
//! 3. Uploads every staged file with bounded retries, re-validating the
//!    remote directory before each attempt. One backoff instance is shared
//!    across the batch, so a run of failures compounds the delay across
//!    files instead of resetting per file.
//! 4. For each confirmed upload: marks the record processed, then archives
//!    the file (or deletes it when archiving is off). A mark failure is
//!    logged and the archive still happens; the record re-delivers next
//!    cycle.
//! 5. At most once an hour, deletes archived files past retention.
//!
//! Every wait is cancellation-aware: cancelling the coordinator's token
//! interrupts both the poll sleep and any in-flight backoff sleep. In-flight
//! file operations complete; remaining batch items stay staged.

use crate::config::Config;
use crate::encoder;
use crate::error::{Error, Result};
use crate::filestore::FileStore;
use crate::retry::Backoff;
use crate::source::DataSource;
use crate::transfer::{RemoteTransport, TransferSession, join_remote};
use crate::types::{CycleReport, UploadOutcome};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Minimum spacing between archive retention sweeps
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Single-task driver for the delivery pipeline
pub struct DeliveryCoordinator {
    config: Config,
    source: Box<dyn DataSource>,
    session: TransferSession,
    files: FileStore,
    cancel: CancellationToken,
    last_cleanup: Option<Instant>,
    // Records whose staged file is still awaiting delivery; keyed by record
    // id so an undelivered record is never staged a second time
    staged: HashMap<String, PathBuf>,
}

impl DeliveryCoordinator {
    /// Build a coordinator over a data source and a remote transport
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the configuration fails validation.
    pub fn new(
        config: Config,
        source: Box<dyn DataSource>,
        transport: Box<dyn RemoteTransport>,
    ) -> Result<Self> {
        config.ensure_valid()?;
        let session =
            TransferSession::new(transport).with_verification(config.delivery.verify_uploads);
        let files = FileStore::new(
            &config.delivery.staging_dir,
            &config.delivery.archive_root,
        );
        Ok(Self {
            config,
            source,
            session,
            files,
            cancel: CancellationToken::new(),
            last_cleanup: None,
            staged: HashMap::new(),
        })
    }

    /// Token that stops the run loop when cancelled
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run delivery cycles until the cancellation token fires
    ///
    /// A failed cycle is logged and the loop continues; only cancellation
    /// ends it. The session is disconnected on the way out.
    ///
    /// # Errors
    ///
    /// Currently infallible at the loop level; the signature leaves room for
    /// fatal startup conditions.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            poll_interval_secs = self.config.delivery.poll_interval.as_secs(),
            remote_dir = %self.config.endpoint.remote_dir,
            "Delivery coordinator started"
        );
        if !self.source.test_connection().await {
            warn!("Data source unreachable at startup; cycles will retry");
        } else {
            match self.source.statistics().await {
                Ok(stats) => info!(
                    total = stats.total,
                    unsent = stats.unsent,
                    sent = stats.sent,
                    "Data source reachable"
                ),
                Err(e) => warn!(error = %e, "Could not read data source statistics"),
            }
        }
        // One-time startup diagnostic; a negative result is logged by the
        // probe itself and never blocks delivery
        if self
            .session
            .probe_write_access(&self.config.endpoint.remote_dir)
            .await
        {
            debug!(dir = %self.config.endpoint.remote_dir, "Write access confirmed");
        }

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            match self.run_cycle().await {
                Ok(report) => {
                    if report.fetched > 0 || report.uploaded > 0 || report.upload_failures > 0 {
                        info!(
                            fetched = report.fetched,
                            encode_failures = report.encode_failures,
                            uploaded = report.uploaded,
                            upload_failures = report.upload_failures,
                            marked = report.marked,
                            archived = report.archived,
                            cleaned_up = report.cleaned_up,
                            "Delivery cycle complete"
                        );
                    } else {
                        debug!("Delivery cycle complete, nothing to do");
                    }
                }
                Err(Error::ShuttingDown) => break,
                Err(e) => warn!(error = %e, "Delivery cycle failed"),
            }

            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(self.config.delivery.poll_interval) => {}
            }
        }

        self.session.disconnect().await;
        info!("Delivery coordinator stopped");
        Ok(())
    }

    /// Execute one delivery cycle and report what happened
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] when cancellation fired before the
    /// cycle started, or an I/O error when staging cannot even be listed.
    /// Per-record and per-file failures are counted in the report, not
    /// raised.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        if self.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }
        let mut report = CycleReport::default();

        // Leftovers first: files staged by an earlier cycle (or a crashed
        // run) re-deliver ahead of this cycle's records, keeping whatever
        // record id they were staged for
        let leftovers = self.files.pending_files()?;
        let leftover_set: HashSet<PathBuf> = leftovers.iter().cloned().collect();
        // A tracked file that vanished (archived by hand, deleted) must not
        // suppress re-staging of its record
        self.staged.retain(|_, path| leftover_set.contains(path));
        let by_path: HashMap<PathBuf, String> = self
            .staged
            .iter()
            .map(|(id, path)| (path.clone(), id.clone()))
            .collect();

        let mut batch: Vec<(PathBuf, Option<String>)> = leftovers
            .into_iter()
            .map(|path| {
                let record_id = by_path.get(&path).cloned();
                (path, record_id)
            })
            .collect();
        if !batch.is_empty() {
            info!(count = batch.len(), "Re-delivering files left in staging");
        }

        let records = match self.source.fetch_pending().await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Could not fetch pending records; delivering staged files only");
                Vec::new()
            }
        };
        report.fetched = records.len();

        for record in &records {
            if self.staged.contains_key(&record.record_id) {
                // Already queued above via its leftover file; a second copy
                // would multiply deliveries across outage cycles
                debug!(record = %record.record_id, "Record already staged, not re-encoding");
                continue;
            }
            match encoder::encode(record, &self.config.format) {
                Ok(text) => match self.files.create_file(&text, &self.config.naming) {
                    Ok(path) => {
                        self.staged.insert(record.record_id.clone(), path.clone());
                        batch.push((path, Some(record.record_id.clone())));
                    }
                    Err(e) => {
                        warn!(record = %record.record_id, error = %e, "Could not stage message file");
                    }
                },
                Err(e) => {
                    warn!(record = %record.record_id, error = %e, "Record failed to encode, skipping");
                    report.encode_failures += 1;
                }
            }
        }

        if !batch.is_empty() {
            self.deliver_batch(batch, &mut report).await;
        }

        if self.config.delivery.auto_archive && self.cleanup_due() {
            match self
                .files
                .cleanup_archives(self.config.delivery.archive_retention_days)
            {
                Ok(deleted) => report.cleaned_up = deleted,
                Err(e) => warn!(error = %e, "Archive retention cleanup failed"),
            }
            self.last_cleanup = Some(Instant::now());
        }

        Ok(report)
    }

    /// Upload every staged file in the batch and reconcile the successes
    async fn deliver_batch(&mut self, batch: Vec<(PathBuf, Option<String>)>, report: &mut CycleReport) {
        let mut backoff = Backoff::new(self.config.delivery.initial_retry_delay);
        for (path, record_id) in batch {
            if self.cancel.is_cancelled() {
                debug!("Cancellation during batch; remaining files stay staged");
                break;
            }
            let outcome = self.deliver_file(&path, &mut backoff).await;
            if outcome.success {
                report.uploaded += 1;
                if let Some(id) = &record_id {
                    self.staged.remove(id);
                }
                self.reconcile(&path, record_id, report).await;
            } else {
                report.upload_failures += 1;
                warn!(
                    path = %path.display(),
                    attempts = outcome.attempts,
                    error = outcome.error.as_deref().unwrap_or("unknown"),
                    "Upload attempts exhausted; file stays staged"
                );
            }
        }
    }

    /// Mark the record processed and move the file out of staging
    async fn reconcile(&mut self, path: &Path, record_id: Option<String>, report: &mut CycleReport) {
        if let Some(id) = record_id {
            match self.source.mark_processed(std::slice::from_ref(&id)).await {
                Ok(()) => report.marked += 1,
                Err(e) => {
                    // The file is delivered and still gets archived; the
                    // unmarked record re-delivers next cycle
                    warn!(record = %id, error = %e, "Could not mark record processed");
                }
            }
        }

        if self.config.delivery.auto_archive {
            match self.files.archive(path, None) {
                Ok(dest) => {
                    report.archived += 1;
                    debug!(dest = %dest.display(), "Delivered file archived");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not archive delivered file");
                }
            }
        } else if let Err(e) = self.files.remove_staged(path) {
            warn!(path = %path.display(), error = %e, "Could not remove delivered file from staging");
        }
    }

    /// Upload one file with bounded retries against the shared backoff
    async fn deliver_file(&mut self, path: &Path, backoff: &mut Backoff) -> UploadOutcome {
        let remote_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("message.txt")
            .to_string();
        let remote_path = join_remote(&self.config.endpoint.remote_dir, &remote_name);

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                return UploadOutcome {
                    local_path: path.to_path_buf(),
                    remote_name,
                    success: false,
                    attempts: 0,
                    error: Some(e.to_string()),
                };
            }
        };

        let max_attempts = self.config.delivery.max_retries + 1;
        let mut attempts = 0;
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            attempts = attempt;
            // The destination is re-validated before every upload attempt; a
            // directory that vanished mid-batch fails here, with the
            // fallback ladder still tolerating stat-denied servers
            let result = match self
                .session
                .validate_directory(&self.config.endpoint.remote_dir)
                .await
            {
                Ok(()) => self.session.upload(&bytes, &remote_path).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    debug!(remote = %remote_path, attempt, "Upload confirmed");
                    return UploadOutcome {
                        local_path: path.to_path_buf(),
                        remote_name,
                        success: true,
                        attempts: attempt,
                        error: None,
                    };
                }
                Err(e) => {
                    warn!(
                        remote = %remote_path,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Upload attempt failed"
                    );
                    last_error = Some(e.to_string());
                    // Fresh connection for the next attempt
                    self.session.disconnect().await;
                    if attempt < max_attempts {
                        let delay = backoff.next_delay();
                        debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                        tokio::select! {
                            () = self.cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        UploadOutcome {
            local_path: path.to_path_buf(),
            remote_name,
            success: false,
            attempts,
            error: last_error,
        }
    }

    fn cleanup_due(&self) -> bool {
        match self.last_cleanup {
            None => true,
            Some(at) => at.elapsed() >= CLEANUP_INTERVAL,
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointConfig, FileNamingPolicy};
    use crate::encoder::{FieldSpec, FormatSpec};
    use crate::source::InMemorySource;
    use crate::transfer::InMemoryTransport;
    use crate::types::{FieldValue, SourceRecord};
    use std::collections::HashMap;
    use std::time::Duration;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config {
            endpoint: EndpointConfig {
                host: "ftp.example.com".into(),
                port: 21,
                username: "relay".into(),
                password: "secret".into(),
                remote_dir: "/inbox".into(),
            },
            format: FormatSpec {
                fields: vec![FieldSpec::named("Name", 0)],
                ..Default::default()
            },
            naming: FileNamingPolicy {
                prefix: "msg_".into(),
                suffix: ".txt".into(),
                timestamp_pattern: "%Y%m%d%H%M%S%f".into(),
            },
            ..Default::default()
        };
        config.delivery.staging_dir = dir.join("staging");
        config.delivery.archive_root = dir.join("archive");
        config.delivery.initial_retry_delay = Duration::from_millis(10);
        config
    }

    fn record(id: &str) -> SourceRecord {
        let mut fields = HashMap::new();
        fields.insert("Name".to_string(), FieldValue::Text(id.to_string()));
        SourceRecord {
            record_id: id.to_string(),
            fields,
        }
    }

    fn coordinator(
        config: Config,
        source: &InMemorySource,
        transport: &InMemoryTransport,
    ) -> DeliveryCoordinator {
        DeliveryCoordinator::new(
            config,
            Box::new(source.clone()),
            Box::new(transport.clone()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn full_cycle_uploads_marks_and_archives() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        let transport = InMemoryTransport::new();
        transport.add_dir("/inbox");
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);

        let report = coordinator.run_cycle().await.unwrap();

        assert_eq!(report.fetched, 1);
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.marked, 1);
        assert_eq!(report.archived, 1);
        assert_eq!(report.upload_failures, 0);

        assert_eq!(source.marked_ids(), vec!["r1".to_string()]);
        assert_eq!(transport.file_paths().len(), 1);
        // Staging is drained; the file lives in a date bucket now
        assert!(std::fs::read_dir(temp.path().join("staging"))
            .unwrap()
            .next()
            .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn upload_retries_with_fresh_connections() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        let transport = InMemoryTransport::new();
        transport.add_dir("/inbox");
        transport.fail_next_uploads(2);
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);

        let report = coordinator.run_cycle().await.unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.upload_failures, 0);
        // Two failures, two teardowns, success on the third attempt over a
        // fresh connection
        assert_eq!(transport.upload_count(), 3);
        assert_eq!(transport.disconnect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_leave_file_staged() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        let transport = InMemoryTransport::new();
        transport.add_dir("/inbox");
        // max_retries = 3 means 4 attempts per file
        transport.fail_next_uploads(10);
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);

        let report = coordinator.run_cycle().await.unwrap();

        assert_eq!(report.uploaded, 0);
        assert_eq!(report.upload_failures, 1);
        assert_eq!(report.marked, 0);
        assert_eq!(transport.upload_count(), 4);
        assert!(source.marked_ids().is_empty());
        // The staged file survives for the next cycle
        assert_eq!(
            std::fs::read_dir(temp.path().join("staging")).unwrap().count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_is_shared_across_the_batch() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        source.push(record("r2"));
        let transport = InMemoryTransport::new();
        transport.add_dir("/inbox");
        let mut config = test_config(temp.path());
        config.delivery.max_retries = 1;
        // File 1: fail, wait 10 ms, fail again (exhausted, no wait).
        // File 2: fail, wait 20 ms (the batch backoff already doubled), ok.
        transport.fail_next_uploads(3);
        let mut coordinator = coordinator(config, &source, &transport);

        let started = Instant::now();
        let report = coordinator.run_cycle().await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.upload_failures, 1);
        assert!(
            elapsed >= Duration::from_millis(30),
            "per-file backoff would only wait 20 ms, got {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn encode_failure_skips_record_without_marking() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        let mut bad = record("bad");
        bad.fields
            .insert("Name".to_string(), FieldValue::Float(f64::NAN));
        // NaN only trips the encoder when rendered as a decimal
        let mut config = test_config(temp.path());
        config.format.fields[0].decimal_places = Some(2);
        source.push(bad);
        source.push(record("good"));
        let transport = InMemoryTransport::new();
        transport.add_dir("/inbox");
        let mut coordinator = coordinator(config, &source, &transport);

        let report = coordinator.run_cycle().await.unwrap();

        assert_eq!(report.fetched, 2);
        assert_eq!(report.encode_failures, 1);
        assert_eq!(report.uploaded, 1);
        assert_eq!(source.marked_ids(), vec!["good".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_directory_validation_defers_the_batch() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        let transport = InMemoryTransport::new();
        // No /inbox on the remote side
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);

        let report = coordinator.run_cycle().await.unwrap();

        assert_eq!(report.uploaded, 0);
        assert_eq!(report.upload_failures, 1);
        assert_eq!(
            transport.upload_count(),
            0,
            "no transfer without a validated destination"
        );
        assert!(source.marked_ids().is_empty());
        // Next cycle re-delivers the leftover file, still tied to its record
        transport.add_dir("/inbox");
        let report = coordinator.run_cycle().await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(source.marked_ids(), vec!["r1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn outage_cycles_do_not_multiply_deliveries() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        let transport = InMemoryTransport::new();
        // Remote directory missing for several consecutive cycles
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);

        for _ in 0..3 {
            let report = coordinator.run_cycle().await.unwrap();
            assert_eq!(report.uploaded, 0);
        }
        assert_eq!(
            std::fs::read_dir(temp.path().join("staging")).unwrap().count(),
            1,
            "one staged copy regardless of how many cycles the outage spans"
        );

        // Remote recovers: exactly one delivery, one mark, one remote file
        transport.add_dir("/inbox");
        let report = coordinator.run_cycle().await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(transport.file_paths().len(), 1);
        assert_eq!(source.marked_ids(), vec!["r1".to_string()]);

        // And nothing left over afterwards
        let report = coordinator.run_cycle().await.unwrap();
        assert_eq!(report.uploaded, 0);
        assert_eq!(report.fetched, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn vanished_staged_file_gets_restaged() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        let transport = InMemoryTransport::new();
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);

        // Outage cycle stages the record once
        coordinator.run_cycle().await.unwrap();
        let staging = temp.path().join("staging");
        assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 1);

        // Someone deletes the staged file by hand; the record must be
        // staged and delivered again, not silently dropped
        for entry in std::fs::read_dir(&staging).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }
        transport.add_dir("/inbox");
        let report = coordinator.run_cycle().await.unwrap();
        assert_eq!(report.uploaded, 1);
        assert_eq!(source.marked_ids(), vec!["r1".to_string()]);
    }

    #[tokio::test]
    async fn mark_failure_still_archives_the_delivered_file() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        source.fail_next_marks(1);
        let transport = InMemoryTransport::new();
        transport.add_dir("/inbox");
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);

        let report = coordinator.run_cycle().await.unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.marked, 0);
        assert_eq!(report.archived, 1);
        // The unmarked record is still pending and will re-deliver
        assert_eq!(source.pending_count(), 1);
    }

    #[tokio::test]
    async fn auto_archive_off_deletes_delivered_files() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        let transport = InMemoryTransport::new();
        transport.add_dir("/inbox");
        let mut config = test_config(temp.path());
        config.delivery.auto_archive = false;
        let mut coordinator = coordinator(config, &source, &transport);

        let report = coordinator.run_cycle().await.unwrap();

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.archived, 0);
        assert!(!temp.path().join("archive").exists());
        assert!(std::fs::read_dir(temp.path().join("staging"))
            .unwrap()
            .next()
            .is_none());
    }

    #[tokio::test]
    async fn leftover_staged_files_are_redelivered() {
        let temp = tempfile::tempdir().unwrap();
        let staging = temp.path().join("staging");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("msg_leftover.txt"), "orphan").unwrap();

        let source = InMemorySource::new();
        let transport = InMemoryTransport::new();
        transport.add_dir("/inbox");
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);

        let report = coordinator.run_cycle().await.unwrap();

        assert_eq!(report.fetched, 0);
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.marked, 0, "orphan files have no record to mark");
        assert_eq!(
            transport.file_content("/inbox/msg_leftover.txt").unwrap(),
            b"orphan".to_vec()
        );
    }

    #[tokio::test]
    async fn cancelled_coordinator_refuses_new_cycles() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        let transport = InMemoryTransport::new();
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);

        coordinator.cancellation_token().cancel();
        let err = coordinator.run_cycle().await.unwrap_err();
        assert!(matches!(err, Error::ShuttingDown));
    }

    #[tokio::test(start_paused = true)]
    async fn run_loop_stops_on_cancellation() {
        let temp = tempfile::tempdir().unwrap();
        let source = InMemorySource::new();
        source.push(record("r1"));
        let transport = InMemoryTransport::new();
        transport.add_dir("/inbox");
        let mut coordinator = coordinator(test_config(temp.path()), &source, &transport);
        let token = coordinator.cancellation_token();

        let handle = tokio::spawn(async move { coordinator.run().await });
        // Let the first cycle complete, then cancel during the poll sleep
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(source.marked_ids(), vec!["r1".to_string()]);
    }
}
