//! The `Connection` entity (spec §3). A `ConnId` is an opaque, never-reused
//! integer identity; the registry refers to connections only by id, never by
//! pointer, so connection teardown cannot leave a dangling reference (spec
//! §9's resolution of the original's intrusive back-pointer cycles).

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::job::JobHandle;
use crate::wire::protocol::Outbound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Unknown,
    Client,
    Worker,
}

/// Bound on a connection's outbound packet queue (spec §4.2); a connection
/// that cannot keep up is moved to `close_after_flush` rather than growing
/// this queue without limit.
pub const OUTBOUND_QUEUE_BOUND: usize = 1024;

pub struct ConnectionState {
    pub id: ConnId,
    pub role: Role,
    pub client_id: String,
    /// Functions this connection can perform, each with an optional timeout
    /// (spec §3 invariant 5: membership tracks CAN_DO/CAN_DO_TIMEOUT minus
    /// CANT_DO/RESET_ABILITIES), in registration order (used by GRAB_JOB
    /// scanning when `--round-robin` is not set).
    pub abilities: Vec<(Bytes, Option<Duration>)>,
    pub sleeping: bool,
    pub exceptions_enabled: bool,
    /// Prevents redundant NOOP wakeups to an already-notified worker
    /// (spec §3 invariant 7).
    pub noop_sent: bool,
    pub dead: bool,
    pub close_after_flush: bool,
    /// Jobs this connection (as a client) is subscribed to, so disconnection
    /// can mark them ignorable/detach in O(subscriptions).
    pub subscribed_jobs: Vec<JobHandle>,
    pub outbound: mpsc::Sender<Outbound>,
    pub peer_addr: String,
    /// Rotating offset into `abilities` used by GRAB_JOB scanning when
    /// `--round-robin` is set (spec §4.4), so consecutive grabs alternate
    /// across functions instead of always draining the first-registered one.
    pub round_robin_cursor: usize,
}

impl ConnectionState {
    pub fn new(id: ConnId, peer_addr: String, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            role: Role::Unknown,
            client_id: "-".to_string(),
            abilities: Vec::new(),
            sleeping: false,
            exceptions_enabled: false,
            noop_sent: false,
            dead: false,
            close_after_flush: false,
            subscribed_jobs: Vec::new(),
            outbound,
            peer_addr,
            round_robin_cursor: 0,
        }
    }

    pub fn can_do(&self, function: &[u8]) -> bool {
        self.abilities.iter().any(|(f, _)| f.as_ref() == function)
    }

    pub fn add_ability(&mut self, function: Bytes, timeout: Option<Duration>) {
        if let Some(entry) = self.abilities.iter_mut().find(|(f, _)| f == &function) {
            entry.1 = timeout;
        } else {
            self.abilities.push((function, timeout));
        }
    }

    pub fn remove_ability(&mut self, function: &[u8]) {
        self.abilities.retain(|(f, _)| f.as_ref() != function);
    }

    pub fn try_send(&mut self, packet: Outbound) {
        if self.outbound.try_send(packet).is_err() {
            self.close_after_flush = true;
        }
    }
}

/// A `(worker-connection, function, optional-timeout)` triple, tracked
/// redundantly from the function side for O(1) worker-registration-order
/// scanning during GRAB_JOB (spec §3 "Worker record").
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    pub conn: ConnId,
    pub function: Bytes,
    pub timeout: Option<Duration>,
}

pub type ConnTable = HashMap<ConnId, ConnectionState>;
