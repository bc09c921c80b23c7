//! The job registry (spec §4.5): function table, job maps, and every command
//! handler that mutates them. A single [`Registry`] is shared behind a
//! `std::sync::Mutex` (see `server::thread`); no method here ever awaits, so
//! the lock is never held across a suspension point.

pub mod hash;
pub mod reduce;

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::error::GearmandError;
use crate::queue::{PersistentQueue, ReplaySink, ReplayedJob};
use crate::types::connection::{ConnId, ConnTable, ConnectionState, Role};
use crate::types::function::Function;
use crate::types::job::{Job, JobHandle, ReduceState};
use crate::wire::protocol::{Outbound, Priority, Response};

/// Blocks on a future that is known to never actually suspend (our
/// [`PersistentQueue`] adapters do synchronous I/O under a std mutex), so a
/// `Registry` method can call them without becoming `async` itself.
fn block<T>(fut: impl std::future::Future<Output = T>) -> T {
    futures::executor::block_on(fut)
}

pub struct Registry {
    config: ServerConfig,
    queue: Arc<dyn PersistentQueue>,
    conns: ConnTable,
    functions: HashMap<Bytes, Function>,
    jobs: HashMap<JobHandle, Job>,
    by_unique: HashMap<(Bytes, Bytes), JobHandle>,
    handle_counter: u64,
}

/// One outbound packet destined for a connection other than (or in addition
/// to) the one whose packet is currently being processed.
pub type Delivery = (ConnId, Outbound);

impl Registry {
    pub fn new(config: ServerConfig, queue: Arc<dyn PersistentQueue>) -> Self {
        Self {
            config,
            queue,
            conns: ConnTable::new(),
            functions: HashMap::new(),
            jobs: HashMap::new(),
            by_unique: HashMap::new(),
            handle_counter: 0,
        }
    }

    /// Replays the persistent queue's contents at startup, re-submitting
    /// each as a fresh background job (coalescence still applies).
    pub fn replay_queue(&mut self) {
        struct Sink(Vec<ReplayedJob>);
        impl ReplaySink for Sink {
            fn replay_job(&mut self, job: ReplayedJob) {
                self.0.push(job);
            }
        }

        let mut sink = Sink(Vec::new());
        if let Err(error) = block(self.queue.clone().replay(&mut sink)) {
            warn!(%error, "failed to replay persistent queue");
            return;
        }

        for job in sink.0 {
            self.admit_job(job.function, job.unique, job.data, job.priority, true, job.epoch, false);
        }
    }

    fn next_handle(&mut self) -> JobHandle {
        self.handle_counter += 1;
        JobHandle(format!("{}{}", self.config.job_handle_prefix, self.handle_counter))
    }

    fn now_epoch() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    // ---- connection lifecycle -------------------------------------------

    pub fn register_connection(&mut self, state: ConnectionState) {
        self.conns.insert(state.id, state);
    }

    pub fn connection_mut(&mut self, id: ConnId) -> Option<&mut ConnectionState> {
        self.conns.get_mut(&id)
    }

    /// Tears down a disconnected connection: drops its worker registrations,
    /// re-queues (at the head) any job it was running as a worker, and
    /// marks any foreground job it alone subscribed to as `ignore` (spec
    /// §4.4 "Disconnection policy").
    pub fn deregister_connection(&mut self, id: ConnId) -> Vec<Delivery> {
        let Some(conn) = self.conns.remove(&id) else { return Vec::new() };

        for (function, _) in &conn.abilities {
            if let Some(f) = self.functions.get_mut(function.as_ref()) {
                f.workers.remove(&id);
            }
        }

        let running: Vec<JobHandle> = self
            .jobs
            .values()
            .filter(|j| j.assigned_worker == Some(id))
            .map(|j| j.handle.clone())
            .collect();
        for handle in running {
            if let Some(job) = self.jobs.get_mut(&handle) {
                job.assigned_worker = None;
                let (function, priority) = (job.function.clone(), job.priority);
                if let Some(f) = self.functions.get_mut(function.as_ref()) {
                    f.queue_mut(priority).push_front(handle.clone());
                    f.running = f.running.saturating_sub(1);
                }
            }
        }

        for handle in conn.subscribed_jobs {
            if let Some(job) = self.jobs.get_mut(&handle) {
                job.subscribers.retain(|c| *c != id);
                if job.subscribers.is_empty() && !job.background {
                    if job.assigned_worker.is_none() {
                        self.remove_job(&handle);
                    } else {
                        job.ignore = true;
                    }
                }
            }
        }

        self.wake_sleepers_for_all()
    }

    fn remove_job(&mut self, handle: &JobHandle) {
        if let Some(job) = self.jobs.remove(handle) {
            if let Some(unique) = &job.unique {
                self.by_unique.remove(&(job.function.clone(), unique.clone()));
            }
            if let Some(f) = self.functions.get_mut(job.function.as_ref()) {
                f.queue_mut(job.priority).retain(|h| h != handle);
            }
        }
    }

    // ---- CAN_DO / CANT_DO / RESET_ABILITIES ------------------------------

    pub fn can_do(&mut self, conn: ConnId, function: Bytes, timeout: Option<std::time::Duration>) {
        self.functions.entry(function.clone()).or_insert_with(|| Function::new(function.clone()));
        if let Some(f) = self.functions.get_mut(function.as_ref()) {
            f.workers.insert(conn);
        }
        if let Some(c) = self.conns.get_mut(&conn) {
            c.role = Role::Worker;
            c.add_ability(function, timeout);
        }
    }

    pub fn cant_do(&mut self, conn: ConnId, function: &[u8]) {
        if let Some(f) = self.functions.get_mut(function) {
            f.workers.remove(&conn);
        }
        if let Some(c) = self.conns.get_mut(&conn) {
            c.remove_ability(function);
        }
    }

    pub fn reset_abilities(&mut self, conn: ConnId) {
        let Some(c) = self.conns.get(&conn) else { return };
        let functions: Vec<Bytes> = c.abilities.iter().map(|(f, _)| f.clone()).collect();
        for function in functions {
            if let Some(f) = self.functions.get_mut(function.as_ref()) {
                f.workers.remove(&conn);
            }
        }
        if let Some(c) = self.conns.get_mut(&conn) {
            c.abilities.clear();
        }
    }

    // ---- SUBMIT_JOB / SUBMIT_REDUCE_JOB ----------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn submit_job(
        &mut self,
        conn: ConnId,
        function: Bytes,
        unique: Bytes,
        data: Bytes,
        priority: Priority,
        background: bool,
        epoch: Option<i64>,
    ) -> (Option<Outbound>, Vec<Delivery>) {
        if let Some(c) = self.conns.get_mut(&conn) {
            c.role = Role::Client;
        }

        if !unique.is_empty() {
            if let Some(existing) = self.by_unique.get(&(function.clone(), unique.clone())).cloned()
            {
                if let Some(job) = self.jobs.get_mut(&existing) {
                    if !background && !job.subscribers.contains(&conn) {
                        job.subscribers.push(conn);
                        if let Some(c) = self.conns.get_mut(&conn) {
                            c.subscribed_jobs.push(existing.clone());
                        }
                    }
                    let reply = Outbound::from(Response::JobCreated { handle: existing.as_bytes() });
                    return (Some(reply), Vec::new());
                }
            }
        }

        if data.len() as u32 > self.config.max_job_size {
            let error = GearmandError::MemoryAllocation;
            warn!(%error, size = data.len(), limit = self.config.max_job_size, "job payload exceeds configured limit");
            let reply = Response::error("argument_too_large", "job payload exceeds max-job-size");
            return (Some(Outbound::from(reply)), Vec::new());
        }

        if self.functions.get(function.as_ref()).is_some_and(Function::is_full) {
            let reply = Response::error("job_queue_full", "queue is full for this function");
            return (Some(Outbound::from(reply)), Vec::new());
        }

        let handle =
            self.admit_job(function, unique, data, priority, background, epoch, background);
        if !background {
            if let Some(job) = self.jobs.get_mut(&handle) {
                job.subscribers.push(conn);
            }
            if let Some(c) = self.conns.get_mut(&conn) {
                c.subscribed_jobs.push(handle.clone());
            }
        }

        let reply = Outbound::from(Response::JobCreated { handle: handle.as_bytes() });
        let wakeups = self.wake_sleepers_for_all();
        (Some(reply), wakeups)
    }

    /// Shared by `submit_job` and queue replay: allocates a handle, persists
    /// (if requested), and enqueues onto the owning function's priority FIFO.
    fn admit_job(
        &mut self,
        function: Bytes,
        unique: Bytes,
        data: Bytes,
        priority: Priority,
        background: bool,
        epoch: Option<i64>,
        persist: bool,
    ) -> JobHandle {
        let handle = self.next_handle();
        let unique_opt = if unique.is_empty() { None } else { Some(unique.clone()) };

        if persist {
            if let Err(error) = block(self.queue.clone().add(
                handle.as_bytes().as_ref(),
                &unique,
                &function,
                &data,
                priority,
                epoch,
            )) {
                warn!(%error, "failed to persist job; admitting to memory only");
            }
        }

        let job = Job {
            function: function.clone(),
            handle: handle.clone(),
            unique: unique_opt.clone(),
            priority,
            payload: data,
            epoch,
            created: Instant::now(),
            retries_remaining: self.config.job_retries,
            numerator: 0,
            denominator: 0,
            subscribers: Vec::new(),
            assigned_worker: None,
            ignore: false,
            background,
            reduce: None,
        };

        self.jobs.insert(handle.clone(), job);
        if let Some(unique) = unique_opt {
            self.by_unique.insert((function.clone(), unique), handle.clone());
        }

        let f = self.functions.entry(function.clone()).or_insert_with(|| Function::new(function));
        f.queue_mut(priority).push_back(handle.clone());

        handle
    }

    #[allow(clippy::too_many_arguments)]
    pub fn submit_reduce_job(
        &mut self,
        conn: ConnId,
        function: Bytes,
        unique: Bytes,
        reducer: Bytes,
        priority: Priority,
        epoch: Option<i64>,
        data: Bytes,
        background: bool,
    ) -> (Option<Outbound>, Vec<Delivery>) {
        let handle = self.admit_job(
            function,
            unique.clone(),
            data,
            priority,
            background,
            epoch,
            false,
        );

        if let Some(job) = self.jobs.get_mut(&handle) {
            job.reduce = Some(ReduceState {
                reducer,
                chunks: Vec::new(),
                original_client: conn,
                original_unique: if unique.is_empty() { None } else { Some(unique) },
            });
            if !background {
                job.subscribers.push(conn);
            }
        }
        if !background {
            if let Some(c) = self.conns.get_mut(&conn) {
                c.subscribed_jobs.push(handle.clone());
            }
        }

        let reply = Outbound::from(Response::JobCreated { handle: handle.as_bytes() });
        let wakeups = self.wake_sleepers_for_all();
        (Some(reply), wakeups)
    }

    // ---- GRAB_JOB / GRAB_JOB_UNIQ / GRAB_JOB_ALL --------------------------

    pub fn grab_job(&mut self, conn: ConnId, uniq: bool, all: bool) -> Option<Outbound> {
        let now = Self::now_epoch();
        let abilities: Vec<Bytes> = {
            let Some(c) = self.conns.get(&conn) else { return None };
            if c.abilities.is_empty() {
                return Some(Outbound::from(Response::NoJob));
            }
            if self.config.round_robin {
                let start = c.round_robin_cursor % c.abilities.len();
                c.abilities[start..]
                    .iter()
                    .chain(c.abilities[..start].iter())
                    .map(|(f, _)| f.clone())
                    .collect()
            } else {
                c.abilities.iter().map(|(f, _)| f.clone()).collect()
            }
        };

        for function in &abilities {
            for priority in Priority::ALL {
                // Drop anything marked ignore before considering this queue,
                // so it never masks a dispatchable job behind it.
                let ignored: Vec<JobHandle> = match self.functions.get(function.as_ref()) {
                    Some(f) => f
                        .queue(priority)
                        .iter()
                        .filter(|h| self.jobs.get(h).is_some_and(|j| j.ignore))
                        .cloned()
                        .collect(),
                    None => continue,
                };
                for handle in ignored {
                    self.remove_job(&handle);
                }

                // A job not yet due (SUBMIT_JOB_EPOCH) must not block a later,
                // already-due job queued behind it at the same priority, so
                // scan past it rather than stopping at the first front entry.
                let handle = {
                    let Some(f) = self.functions.get_mut(function.as_ref()) else { continue };
                    let jobs = &self.jobs;
                    let queue = f.queue_mut(priority);
                    let idx = queue
                        .iter()
                        .position(|h| jobs.get(h).is_some_and(|j| j.is_dispatchable(now)));
                    idx.and_then(|i| queue.remove(i))
                };

                if let Some(handle) = handle {
                    let job = self.jobs.get_mut(&handle).expect("handle just taken from queue");
                    job.assigned_worker = Some(conn);
                    let job_function = job.function.clone();
                    let reducer = job.reduce.as_ref().map(|r| r.reducer.clone());
                    let unique = job.unique.clone().unwrap_or_default();

                    if let Some(f) = self.functions.get_mut(job_function.as_ref()) {
                        f.running += 1;
                    }
                    if let Some(c) = self.conns.get_mut(&conn) {
                        c.round_robin_cursor = c.round_robin_cursor.wrapping_add(1);
                        c.sleeping = false;
                        c.noop_sent = false;
                    }

                    let job = self.jobs.get(&handle).expect("handle just assigned");
                    return Some(Outbound::from(if all {
                        Response::JobAssignAll {
                            handle: job.handle.as_bytes(),
                            function: job.function.clone(),
                            unique,
                            reducer: reducer.unwrap_or_default(),
                            data: job.payload.clone(),
                        }
                    } else if uniq {
                        Response::JobAssignUniq {
                            handle: job.handle.as_bytes(),
                            function: job.function.clone(),
                            unique,
                            data: job.payload.clone(),
                        }
                    } else {
                        Response::JobAssign {
                            handle: job.handle.as_bytes(),
                            function: job.function.clone(),
                            data: job.payload.clone(),
                        }
                    }));
                }
            }
        }

        Some(Outbound::from(Response::NoJob))
    }

    // ---- PRE_SLEEP --------------------------------------------------------

    pub fn pre_sleep(&mut self, conn: ConnId) -> Option<Outbound> {
        let now = Self::now_epoch();
        let has_work = self.conns.get(&conn).is_some_and(|c| {
            c.abilities.iter().any(|(f, _)| self.function_has_dispatchable(f, now))
        });

        if has_work {
            if let Some(c) = self.conns.get_mut(&conn) {
                c.noop_sent = true;
            }
            Some(Outbound::from(Response::Noop))
        } else {
            if let Some(c) = self.conns.get_mut(&conn) {
                c.sleeping = true;
            }
            None
        }
    }

    fn function_has_dispatchable(&self, function: &[u8], now: i64) -> bool {
        let Some(f) = self.functions.get(function) else { return false };
        Priority::ALL.iter().any(|p| {
            f.queue(*p)
                .iter()
                .any(|h| self.jobs.get(h).is_some_and(|j| j.is_dispatchable(now) && !j.ignore))
        })
    }

    /// After a job becomes dispatchable, wakes every sleeping worker able to
    /// perform its function (bounded by `--worker-wakeup`, 0 = all), so
    /// `PRE_SLEEP`'s deferred NOOP is honored (spec §3 invariant 7).
    fn wake_sleepers_for_all(&mut self) -> Vec<Delivery> {
        let now = Self::now_epoch();
        let mut out = Vec::new();

        for function in self.functions.keys().cloned().collect::<Vec<_>>() {
            if !self.function_has_dispatchable(&function, now) {
                continue;
            }

            let mut woken = 0u32;
            let limit = self.config.worker_wakeup;
            let worker_ids: Vec<ConnId> = self
                .functions
                .get(function.as_ref())
                .map(|f| f.workers.iter().copied().collect())
                .unwrap_or_default();

            for id in worker_ids {
                if limit != 0 && woken >= limit {
                    break;
                }
                let Some(c) = self.conns.get_mut(&id) else { continue };
                if c.sleeping && !c.noop_sent {
                    c.sleeping = false;
                    c.noop_sent = true;
                    out.push((id, Outbound::from(Response::Noop)));
                    woken += 1;
                }
            }
        }

        out
    }

    // ---- WORK_DATA / WORK_WARNING / WORK_STATUS --------------------------

    pub fn work_data(&mut self, handle: &[u8], data: Bytes) -> Vec<Delivery> {
        let handle = JobHandle(String::from_utf8_lossy(handle).into_owned());
        if let Some(job) = self.jobs.get_mut(&handle) {
            if let Some(reduce) = job.reduce.as_mut() {
                reduce.chunks.push(data);
                return Vec::new();
            }
        }
        self.fan_out(&handle, |h, d| Response::WorkData { handle: h, data: d }, data)
    }

    pub fn work_warning(&mut self, handle: &[u8], data: Bytes) -> Vec<Delivery> {
        let handle = JobHandle(String::from_utf8_lossy(handle).into_owned());
        self.fan_out(&handle, |h, d| Response::WorkWarning { handle: h, data: d }, data)
    }

    pub fn work_status(&mut self, handle: &[u8], numerator: u32, denominator: u32) -> Vec<Delivery> {
        let handle = JobHandle(String::from_utf8_lossy(handle).into_owned());
        let Some(job) = self.jobs.get_mut(&handle) else { return Vec::new() };
        job.numerator = numerator;
        job.denominator = denominator;

        let subscribers = job.subscribers.clone();
        let handle_bytes = job.handle.as_bytes();
        subscribers
            .into_iter()
            .map(|c| {
                (
                    c,
                    Outbound::from(Response::WorkStatus {
                        handle: handle_bytes.clone(),
                        numerator,
                        denominator,
                    }),
                )
            })
            .collect()
    }

    fn fan_out(
        &self,
        handle: &JobHandle,
        build: impl Fn(Bytes, Bytes) -> Response,
        data: Bytes,
    ) -> Vec<Delivery> {
        let Some(job) = self.jobs.get(handle) else { return Vec::new() };
        let handle_bytes = job.handle.as_bytes();
        job.subscribers
            .iter()
            .map(|&c| (c, Outbound::from(build(handle_bytes.clone(), data.clone()))))
            .collect()
    }

    // ---- WORK_COMPLETE / WORK_FAIL / WORK_EXCEPTION ----------------------

    pub fn work_complete(&mut self, handle: &[u8], data: Bytes) -> Vec<Delivery> {
        let handle = JobHandle(String::from_utf8_lossy(handle).into_owned());
        let Some(job) = self.jobs.get(&handle).cloned() else { return Vec::new() };

        if job.reduce.is_some() {
            return self.finalize_reduce_job(&handle, data);
        }

        let handle_bytes = job.handle.as_bytes();
        let out = if job.ignore {
            Vec::new()
        } else {
            job.subscribers
                .iter()
                .map(|&c| {
                    (c, Outbound::from(Response::WorkComplete {
                        handle: handle_bytes.clone(),
                        data: data.clone(),
                    }))
                })
                .collect()
        };

        self.finalize_job(&handle);
        out
    }

    pub fn work_fail(&mut self, handle: &[u8]) -> Vec<Delivery> {
        let handle = JobHandle(String::from_utf8_lossy(handle).into_owned());
        let Some(job) = self.jobs.get_mut(&handle) else { return Vec::new() };

        if !job.background && job.retries_remaining > 0 {
            job.retries_remaining -= 1;
            job.assigned_worker = None;
            let priority = job.priority;
            let function = job.function.clone();
            if let Some(f) = self.functions.get_mut(function.as_ref()) {
                f.queue_mut(priority).push_back(handle);
                f.running = f.running.saturating_sub(1);
            }
            return self.wake_sleepers_for_all();
        }

        let handle_bytes = job.handle.as_bytes();
        let out = job
            .subscribers
            .iter()
            .map(|&c| (c, Outbound::from(Response::WorkFail { handle: handle_bytes.clone() })))
            .collect();

        self.finalize_job(&handle);
        out
    }

    pub fn work_exception(&mut self, handle: &[u8], data: Bytes) -> Vec<Delivery> {
        let handle = JobHandle(String::from_utf8_lossy(handle).into_owned());
        let Some(job) = self.jobs.get(&handle) else { return Vec::new() };
        let handle_bytes = job.handle.as_bytes();

        job.subscribers
            .iter()
            .filter(|&&c| self.conns.get(&c).is_some_and(|c| c.exceptions_enabled))
            .map(|&c| {
                (c, Outbound::from(Response::WorkException {
                    handle: handle_bytes.clone(),
                    data: data.clone(),
                }))
            })
            .collect()
    }

    fn finalize_job(&mut self, handle: &JobHandle) {
        if let Some(job) = self.jobs.get(handle) {
            if job.background {
                if let Err(error) = block(self.queue.clone().done(handle.as_bytes().as_ref())) {
                    warn!(%error, "failed to mark persisted job done");
                }
            }
            if job.assigned_worker.is_some() {
                if let Some(f) = self.functions.get_mut(job.function.as_ref()) {
                    f.running = f.running.saturating_sub(1);
                }
            }
            for subscriber in job.subscribers.clone() {
                if let Some(c) = self.conns.get_mut(&subscriber) {
                    c.subscribed_jobs.retain(|h| h != handle);
                }
            }
        }
        self.remove_job(handle);
    }

    fn finalize_reduce_job(&mut self, handle: &JobHandle, data: Bytes) -> Vec<Delivery> {
        let Some(job) = self.jobs.get_mut(handle) else { return Vec::new() };
        let Some(reduce) = job.reduce.as_mut() else { return Vec::new() };
        reduce.chunks.push(data);

        let joined = reduce::join_chunks(&reduce.chunks);
        let reducer = reduce.reducer.clone();
        let original_client = reduce.original_client;
        let original_unique = reduce.original_unique.clone().unwrap_or_default();

        self.finalize_job(handle);

        let new_handle =
            self.admit_job(reducer, original_unique, joined, Priority::Normal, false, None, false);
        if let Some(job) = self.jobs.get_mut(&new_handle) {
            job.subscribers.push(original_client);
        }
        if let Some(c) = self.conns.get_mut(&original_client) {
            c.subscribed_jobs.push(new_handle);
        }

        self.wake_sleepers_for_all()
    }

    // ---- GET_STATUS / GET_STATUS_UNIQUE -----------------------------------

    pub fn get_status(&self, handle: &[u8]) -> Outbound {
        let handle = JobHandle(String::from_utf8_lossy(handle).into_owned());
        match self.jobs.get(&handle) {
            Some(job) => Outbound::from(Response::StatusRes {
                handle: job.handle.as_bytes(),
                known: true,
                running: job.is_running(),
                numerator: job.numerator,
                denominator: job.denominator,
            }),
            None => Outbound::from(Response::StatusRes {
                handle: Bytes::copy_from_slice(&handle.as_bytes()),
                known: false,
                running: false,
                numerator: 0,
                denominator: 0,
            }),
        }
    }

    /// `GET_STATUS_UNIQUE` carries no function argument on the wire, so the
    /// lookup scans by unique key alone (spec §4.4).
    pub fn get_status_unique(&self, unique: &[u8]) -> Outbound {
        match self.jobs.values().find(|j| j.unique.as_deref() == Some(unique)) {
            Some(job) => Outbound::from(Response::StatusResUnique {
                handle: job.handle.as_bytes(),
                known: true,
                running: job.is_running(),
                numerator: job.numerator,
                denominator: job.denominator,
            }),
            None => Outbound::from(Response::StatusResUnique {
                handle: Bytes::new(),
                known: false,
                running: false,
                numerator: 0,
                denominator: 0,
            }),
        }
    }

    // ---- misc -------------------------------------------------------------

    pub fn set_client_id(&mut self, conn: ConnId, id: Bytes) {
        if let Some(c) = self.conns.get_mut(&conn) {
            c.client_id = String::from_utf8_lossy(&id).into_owned();
        }
    }

    pub fn set_exceptions(&mut self, conn: ConnId, enabled: bool) {
        if let Some(c) = self.conns.get_mut(&conn) {
            c.exceptions_enabled = enabled;
        }
    }

    pub fn all_yours(&mut self, _conn: ConnId) {
        debug!("ALL_YOURS received (multi-listener coordination is a no-op here)");
    }

    pub fn max_queue(&mut self, function: Bytes, size: u32) {
        self.functions.entry(function.clone()).or_insert_with(|| Function::new(function)).max_queue_size =
            Some(size);
    }

    pub fn create_function(&mut self, function: Bytes) {
        self.functions.entry(function.clone()).or_insert_with(|| Function::new(function));
    }

    pub fn drop_function(&mut self, function: &[u8]) {
        self.functions.remove(function);
    }

    pub fn status_rows(&self) -> Vec<crate::wire::admin::StatusRow> {
        let mut rows: Vec<_> = self
            .functions
            .values()
            .map(|f| crate::wire::admin::StatusRow {
                name: f.name.to_vec(),
                running: f.running,
                total: f.queued_count() as u32 + f.running,
                workers: f.workers.len() as u32,
            })
            .collect();
        // Sorted by the documented hash bucket rather than lexically, so
        // `status` traversal order matches the reference implementation's
        // closed-hash iteration order (spec §4.5).
        rows.sort_by_key(|r| (hash::bucket(&r.name), r.name.clone()));
        rows
    }

    pub fn worker_rows(&self) -> Vec<crate::wire::admin::WorkerRow> {
        self.conns
            .values()
            .filter(|c| c.role == Role::Worker)
            .map(|c| crate::wire::admin::WorkerRow {
                fd: c.id.0,
                ip: c.peer_addr.clone(),
                id: c.client_id.clone(),
                functions: c.abilities.iter().map(|(f, _)| f.to_vec()).collect(),
            })
            .collect()
    }
}
