//! Data source abstraction
//!
//! [`DataSource`] is the seam between the delivery coordinator and whatever
//! store holds pending records. The coordinator only needs four primitives:
//! fetch what is pending, mark what was delivered, check reachability, and
//! report aggregate statistics. [`InMemorySource`] is the in-process
//! implementation used by the test suite and by dry runs.

use crate::error::Result;
use crate::types::{SourceRecord, SourceStatistics};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Trait for stores that hand out pending records
///
/// Delivery is at-least-once: the coordinator marks a record processed only
/// after its file is confirmed on the remote endpoint, so a crash between
/// upload and mark re-delivers the record on the next cycle. Implementations
/// must tolerate `mark_processed` being called with ids they have already
/// marked.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch all records currently pending delivery
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Source`] when the backing store is unreachable
    /// or the query fails.
    async fn fetch_pending(&self) -> Result<Vec<SourceRecord>>;

    /// Mark the given records as delivered
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Source`] when the update fails. The caller
    /// treats this as non-fatal: the records will be re-fetched and
    /// re-delivered next cycle.
    async fn mark_processed(&self, record_ids: &[String]) -> Result<()>;

    /// Whether the backing store is currently reachable
    async fn test_connection(&self) -> bool;

    /// Aggregate statistics over the store
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Source`] when the query fails.
    async fn statistics(&self) -> Result<SourceStatistics>;
}

#[derive(Default)]
struct SourceInner {
    pending: Vec<SourceRecord>,
    marked: Vec<String>,
    fail_marks: u32,
    fail_fetches: u32,
}

/// In-memory [`DataSource`] backed by a scripted record list
///
/// Cloning shares state, so a test can keep a handle for assertions while the
/// coordinator owns another.
#[derive(Clone, Default)]
pub struct InMemorySource {
    inner: Arc<Mutex<SourceInner>>,
}

impl InMemorySource {
    /// Create an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SourceInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a record for the next fetch
    pub fn push(&self, record: SourceRecord) {
        self.lock().pending.push(record);
    }

    /// Ids that have been marked processed, in call order
    #[must_use]
    pub fn marked_ids(&self) -> Vec<String> {
        self.lock().marked.clone()
    }

    /// Records still pending (fetched but not yet marked)
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Fail the next `count` mark-processed calls
    pub fn fail_next_marks(&self, count: u32) {
        self.lock().fail_marks = count;
    }

    /// Fail the next `count` fetches
    pub fn fail_next_fetches(&self, count: u32) {
        self.lock().fail_fetches = count;
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    async fn fetch_pending(&self) -> Result<Vec<SourceRecord>> {
        let mut inner = self.lock();
        if inner.fail_fetches > 0 {
            inner.fail_fetches -= 1;
            return Err(crate::Error::Source("injected fetch failure".into()));
        }
        Ok(inner.pending.clone())
    }

    async fn mark_processed(&self, record_ids: &[String]) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_marks > 0 {
            inner.fail_marks -= 1;
            return Err(crate::Error::Source("injected mark failure".into()));
        }
        inner
            .pending
            .retain(|record| !record_ids.contains(&record.record_id));
        inner.marked.extend(record_ids.iter().cloned());
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        true
    }

    async fn statistics(&self) -> Result<SourceStatistics> {
        let inner = self.lock();
        let unsent = inner.pending.len() as u64;
        let sent = inner.marked.len() as u64;
        Ok(SourceStatistics {
            total: unsent + sent,
            unsent,
            sent,
            oldest_unsent: None,
            newest: None,
        })
    }
}
