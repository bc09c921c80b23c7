//! An append-only, line-oriented file adapter, grounded on the same
//! `retention` queue plugin's on-disk record shape as [`super::memory`], but
//! generalized so every `add`/`done` is written synchronously rather than
//! only dumped at shutdown — durable across a hard kill, not just a clean
//! restart.
//!
//! Record format, one per line pair:
//! ```text
//! handle;function;unique;priority_code;epoch;len\n
//! <data, len bytes>\n
//! ```
//! Records are keyed by `handle`, not `(function, unique)`, since `unique` is
//! not actually unique when a client omits it. `done` appends a tombstone
//! header (`priority_code` replaced with `-1`, `len` 0, no data line) rather
//! than rewriting the file in place; `replay` compacts tombstoned records
//! away as it rebuilds in-memory state, and the file is rewritten compacted
//! once replay completes.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use super::{PersistentQueue, ReplaySink, ReplayedJob};
use crate::error::GearmandError;
use crate::wire::protocol::Priority;

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

pub struct FileQueue {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileQueue {
    pub fn open(path: PathBuf) -> Result<Self, GearmandError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(GearmandError::Errno)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    fn append_line(&self, line: &str) -> Result<(), GearmandError> {
        let mut file = self.file.lock().unwrap();
        file.write_all(line.as_bytes()).map_err(GearmandError::Errno)?;
        file.flush().map_err(GearmandError::Errno)
    }
}

#[async_trait]
impl PersistentQueue for FileQueue {
    async fn add(
        &self,
        handle: &[u8],
        unique: &[u8],
        function: &[u8],
        data: &[u8],
        priority: Priority,
        epoch: Option<i64>,
    ) -> Result<(), GearmandError> {
        let header = format!(
            "{};{};{};{};{};{}\n",
            String::from_utf8_lossy(handle),
            String::from_utf8_lossy(function),
            String::from_utf8_lossy(unique),
            priority_code(priority),
            epoch.unwrap_or(0),
            data.len(),
        );
        self.append_line(&header)?;
        self.append_line(&format!("{}\n", String::from_utf8_lossy(data)))
    }

    async fn done(&self, handle: &[u8]) -> Result<(), GearmandError> {
        let header = format!("{};;;-1;0;0\n", String::from_utf8_lossy(handle));
        self.append_line(&header)
    }

    async fn flush(&self) -> Result<(), GearmandError> {
        self.file.lock().unwrap().flush().map_err(GearmandError::Errno)
    }

    async fn replay(&self, sink: &mut dyn ReplaySink) -> Result<(), GearmandError> {
        let read_file = File::open(&self.path).map_err(GearmandError::Errno)?;
        let mut lines = BufReader::new(read_file).lines();

        let mut live: Vec<(String, String, String, i32, i64, Bytes)> = Vec::new();
        while let Some(header) = lines.next() {
            let header = header.map_err(GearmandError::Errno)?;
            let mut parts = header.splitn(6, ';');
            let (Some(handle), Some(function), Some(unique), Some(priority), Some(epoch), Some(_len)) = (
                parts.next(),
                parts.next(),
                parts.next(),
                parts.next().and_then(|v| v.parse::<i32>().ok()),
                parts.next().and_then(|v| v.parse::<i64>().ok()),
                parts.next(),
            ) else {
                continue;
            };

            if priority < 0 {
                live.retain(|(h, ..)| h != handle);
                continue;
            }

            let Some(data_line) = lines.next() else { break };
            let data_line = data_line.map_err(GearmandError::Errno)?;
            live.retain(|(h, ..)| h != handle);
            live.push((
                handle.to_string(),
                function.to_string(),
                unique.to_string(),
                priority,
                epoch,
                Bytes::copy_from_slice(data_line.as_bytes()),
            ));
        }

        let mut compacted = String::new();
        for (handle, function, unique, priority, epoch, data) in &live {
            sink.replay_job(ReplayedJob {
                function: Bytes::copy_from_slice(function.as_bytes()),
                unique: Bytes::copy_from_slice(unique.as_bytes()),
                data: data.clone(),
                priority: priority_from_code(*priority),
                epoch: if *epoch == 0 { None } else { Some(*epoch) },
            });
            compacted.push_str(&format!(
                "{};{};{};{};{};{}\n",
                handle,
                function,
                unique,
                priority,
                epoch,
                data.len(),
            ));
            compacted.push_str(&String::from_utf8_lossy(data));
            compacted.push('\n');
        }

        std::fs::write(&self.path, compacted).map_err(GearmandError::Errno)?;
        *self.file.lock().unwrap() = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(GearmandError::Errno)?;
        Ok(())
    }
}
