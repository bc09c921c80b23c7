//! The `Job` entity (spec §3). A job lives in exactly one of: a function's
//! priority queue, assigned-to-worker, or finished (at which point the
//! registry drops it).

use bytes::Bytes;
use tokio::time::Instant;

use crate::wire::protocol::Priority;

use super::connection::ConnId;

/// Opaque handle assigned by the registry: `H:<host>:<counter>`, unique for
/// the lifetime of the server process (the counter never wraps within a
/// single run).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn as_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_bytes())
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State attached to a job that is a map-reduce mapper partition: the
/// reducer function to submit to, and the WORK_DATA chunks collected so far
/// in arrival order (spec §4.6).
#[derive(Debug, Clone)]
pub struct ReduceState {
    pub reducer: Bytes,
    pub chunks: Vec<Bytes>,
    /// Connection id and unique key of the original client, so its
    /// subscription can be transferred onto the synthesized reduce job.
    pub original_client: ConnId,
    pub original_unique: Option<Bytes>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub function: Bytes,
    pub handle: JobHandle,
    pub unique: Option<Bytes>,
    pub priority: Priority,
    pub payload: Bytes,
    pub epoch: Option<i64>,
    pub created: Instant,
    pub retries_remaining: u8,
    pub numerator: u32,
    pub denominator: u32,
    pub subscribers: Vec<ConnId>,
    pub assigned_worker: Option<ConnId>,
    /// Set when a client alone subscribed to this (foreground) job
    /// disconnects before it was taken by a worker (spec §4.4 "Disconnection
    /// policy"): the job is skipped and freed the next time it is peeked.
    pub ignore: bool,
    pub background: bool,
    pub reduce: Option<ReduceState>,
}

impl Job {
    pub fn is_dispatchable(&self, now_epoch: i64) -> bool {
        self.assigned_worker.is_none() && self.epoch.map_or(true, |e| e <= now_epoch)
    }

    pub fn is_running(&self) -> bool {
        self.assigned_worker.is_some()
    }
}
