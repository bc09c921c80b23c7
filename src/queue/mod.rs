//! The persistent queue adapter interface (spec §4.7). All operations are
//! invoked while the registry lock is held, so adapters must be fast or do
//! their own I/O buffering/threading internally.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::GearmandError;
use crate::wire::protocol::Priority;

#[derive(Debug, Clone)]
pub struct ReplayedJob {
    pub function: Bytes,
    pub unique: Bytes,
    pub data: Bytes,
    pub priority: Priority,
    pub epoch: Option<i64>,
}

/// Receives jobs from [`PersistentQueue::replay`] in storage order. The
/// registry implements this to re-submit each job as if it were a fresh
/// SUBMIT (coalescence still applies; duplicates collapse per spec §4.7).
pub trait ReplaySink {
    fn replay_job(&mut self, job: ReplayedJob);
}

#[async_trait]
pub trait PersistentQueue: Send + Sync {
    /// Durably record a background job before `JOB_CREATED` is replied.
    /// `handle` is the job's own assigned handle, used as the durable key
    /// since `unique` alone is not unique when a client omits it (multiple
    /// background jobs can share an empty `unique`).
    #[allow(clippy::too_many_arguments)]
    async fn add(
        &self,
        handle: &[u8],
        unique: &[u8],
        function: &[u8],
        data: &[u8],
        priority: Priority,
        epoch: Option<i64>,
    ) -> Result<(), GearmandError>;

    /// Durably remove a job (called on complete or terminal fail), keyed by
    /// the same handle passed to `add`.
    async fn done(&self, handle: &[u8]) -> Result<(), GearmandError>;

    /// Commit batched writes, if the backend batches them.
    async fn flush(&self) -> Result<(), GearmandError>;

    /// On startup, invoke the sink once per persisted job, in storage order.
    async fn replay(&self, sink: &mut dyn ReplaySink) -> Result<(), GearmandError>;

    /// Optional: dump current in-memory background jobs to storage on
    /// graceful shutdown. Backends that are already durably written on every
    /// `add` (e.g. [`file::FileQueue`]) can leave this a no-op.
    async fn shutdown_snapshot(&self) -> Result<(), GearmandError> {
        Ok(())
    }
}
