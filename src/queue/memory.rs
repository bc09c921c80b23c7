//! An in-memory "retention" adapter, grounded on the original
//! implementation's `retention` queue plugin: `add`/`done`/`flush` are no-ops
//! against durable storage (the job only lives in the registry's own
//! memory), but a snapshot is written on graceful shutdown and replayed back
//! on the next startup — enough to survive a clean restart, not a hard kill
//! (spec §4.7's `shutdown_snapshot` is explicitly optional/"in-memory
//! retention" shaped).

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{PersistentQueue, ReplaySink, ReplayedJob};
use crate::error::GearmandError;
use crate::wire::protocol::Priority;

#[derive(Debug, Clone)]
struct Record {
    handle: Bytes,
    function: Bytes,
    unique: Bytes,
    data: Bytes,
    priority: Priority,
    epoch: Option<i64>,
}

pub struct MemoryQueue {
    snapshot_path: Option<PathBuf>,
    records: Mutex<Vec<Record>>,
}

impl MemoryQueue {
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        Self { snapshot_path, records: Mutex::new(Vec::new()) }
    }
}

fn priority_code(p: Priority) -> i32 {
    match p {
        Priority::High => 0,
        Priority::Normal => 1,
        Priority::Low => 2,
    }
}

fn priority_from_code(c: i32) -> Priority {
    match c {
        0 => Priority::High,
        2 => Priority::Low,
        _ => Priority::Normal,
    }
}

#[async_trait]
impl PersistentQueue for MemoryQueue {
    async fn add(
        &self,
        handle: &[u8],
        unique: &[u8],
        function: &[u8],
        data: &[u8],
        priority: Priority,
        epoch: Option<i64>,
    ) -> Result<(), GearmandError> {
        self.records.lock().unwrap().push(Record {
            handle: Bytes::copy_from_slice(handle),
            function: Bytes::copy_from_slice(function),
            unique: Bytes::copy_from_slice(unique),
            data: Bytes::copy_from_slice(data),
            priority,
            epoch,
        });
        Ok(())
    }

    async fn done(&self, handle: &[u8]) -> Result<(), GearmandError> {
        let mut records = self.records.lock().unwrap();
        records.retain(|r| r.handle.as_ref() != handle);
        Ok(())
    }

    async fn flush(&self) -> Result<(), GearmandError> {
        Ok(())
    }

    async fn replay(&self, sink: &mut dyn ReplaySink) -> Result<(), GearmandError> {
        let Some(path) = &self.snapshot_path else { return Ok(()) };
        let Ok(contents) = std::fs::read_to_string(path) else { return Ok(()) };

        let mut lines = contents.lines();
        while let Some(header) = lines.next() {
            let Some(data) = lines.next() else { break };
            let Some(record) = parse_snapshot_record(header, data) else { continue };

            sink.replay_job(ReplayedJob {
                function: record.function.clone(),
                unique: record.unique.clone(),
                data: record.data.clone(),
                priority: record.priority,
                epoch: record.epoch,
            });
            self.records.lock().unwrap().push(record);
        }

        let _ = std::fs::remove_file(path);
        Ok(())
    }

    async fn shutdown_snapshot(&self) -> Result<(), GearmandError> {
        let Some(path) = &self.snapshot_path else { return Ok(()) };
        let records = self.records.lock().unwrap();

        let mut out = String::new();
        for r in records.iter() {
            out.push_str(&format!(
                "{};{};{};{};{}\n",
                String::from_utf8_lossy(&r.handle),
                String::from_utf8_lossy(&r.function),
                String::from_utf8_lossy(&r.unique),
                priority_code(r.priority),
                r.epoch.unwrap_or(0),
            ));
            out.push_str(&String::from_utf8_lossy(&r.data));
            out.push('\n');
        }

        std::fs::write(path, out).map_err(GearmandError::Errno)
    }
}

/// Parses one snapshot record from its header line (`handle;function;unique;
/// priority_code;epoch`) plus the following raw data line.
fn parse_snapshot_record(header: &str, data: &str) -> Option<Record> {
    let mut parts = header.splitn(5, ';');
    let handle = parts.next()?;
    let function = parts.next()?;
    let unique = parts.next()?;
    let priority: i32 = parts.next()?.parse().ok()?;
    let epoch: i64 = parts.next()?.parse().ok()?;

    Some(Record {
        handle: Bytes::copy_from_slice(handle.as_bytes()),
        function: Bytes::copy_from_slice(function.as_bytes()),
        unique: Bytes::copy_from_slice(unique.as_bytes()),
        data: Bytes::copy_from_slice(data.as_bytes()),
        priority: priority_from_code(priority),
        epoch: if epoch == 0 { None } else { Some(epoch) },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    mod tempfile_like_path {
        pub fn unique() -> std::path::PathBuf {
            std::env::temp_dir().join(format!(
                "gearmand-rs-test-{}-{:?}",
                std::process::id(),
                std::time::SystemTime::now()
            ))
        }
    }

    #[tokio::test]
    async fn add_then_done_removes_record() {
        let q = MemoryQueue::new(None);
        q.add(b"H:1", b"u1", b"f", b"data", Priority::Normal, None).await.unwrap();
        assert_eq!(q.records.lock().unwrap().len(), 1);
        q.done(b"H:1").await.unwrap();
        assert_eq!(q.records.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn done_on_one_of_two_empty_unique_jobs_only_removes_that_one() {
        // Two background jobs with no client-supplied unique key must not
        // collide: each was admitted under its own handle.
        let q = MemoryQueue::new(None);
        q.add(b"H:1", b"", b"f", b"first", Priority::Normal, None).await.unwrap();
        q.add(b"H:2", b"", b"f", b"second", Priority::Normal, None).await.unwrap();
        q.done(b"H:1").await.unwrap();

        let remaining = q.records.lock().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].handle.as_ref(), b"H:2");
    }

    #[tokio::test]
    async fn shutdown_snapshot_then_replay_roundtrips_function_and_unique() {
        let path = tempfile_like_path::unique();
        let q = MemoryQueue::new(Some(path.clone()));
        q.add(b"H:1", b"u1", b"f", b"payload", Priority::High, None).await.unwrap();
        q.shutdown_snapshot().await.unwrap();

        struct Collect(Vec<ReplayedJob>);
        impl ReplaySink for Collect {
            fn replay_job(&mut self, job: ReplayedJob) {
                self.0.push(job);
            }
        }

        let q2 = MemoryQueue::new(Some(path));
        let mut sink = Collect(Vec::new());
        q2.replay(&mut sink).await.unwrap();

        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.0[0].function.as_ref(), b"f");
        assert_eq!(sink.0[0].unique.as_ref(), b"u1");
    }
}
