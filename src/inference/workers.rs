//! Background writer persisting prediction records.
//!
//! A single task owns the predictions file. Request handlers only enqueue
//! records, so read-modify-write cycles never interleave and a slow disk
//! never adds latency to a response.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

use crate::common::error::ServeResult;

use super::domain::PredictionRecord;

/// Counters describing what the writer did with submitted records.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LoggerStats {
    pub written: u64,
    /// Rejected by a full queue, a stopped writer or a non-array log root.
    pub dropped: u64,
    /// Lost to an I/O or encoding failure.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> LoggerStats {
        LoggerStats {
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

struct Job {
    record: PredictionRecord,
    due: Instant,
}

/// Cheap, cloneable submission side of the logger.
#[derive(Clone)]
pub struct LoggerHandle {
    tx: mpsc::Sender<Job>,
    delay: Duration,
    counters: Arc<Counters>,
}

impl LoggerHandle {
    /// Queue a record without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, record: PredictionRecord) -> bool {
        let job = Job {
            record,
            due: Instant::now() + self.delay,
        };
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("prediction log queue full, record dropped");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("prediction logger stopped, record dropped");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn stats(&self) -> LoggerStats {
        self.counters.snapshot()
    }
}

/// Owner of the writer task.
pub struct PredictionLogger {
    handle: LoggerHandle,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl PredictionLogger {
    /// Spawn the writer on the current tokio runtime.
    pub fn spawn(path: impl Into<PathBuf>, delay: Duration, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stop, stop_rx) = oneshot::channel();
        let counters = Arc::new(Counters::default());
        let path = path.into();

        info!(path = %path.display(), delay_ms = delay.as_millis() as u64, "prediction logger started");
        let task = tokio::spawn(run(rx, stop_rx, path, counters.clone()));

        Self {
            handle: LoggerHandle {
                tx,
                delay,
                counters,
            },
            stop,
            task,
        }
    }

    pub fn handle(&self) -> LoggerHandle {
        self.handle.clone()
    }

    /// Stop accepting records, write everything already queued, then return
    /// the final counters. Pending delays are skipped.
    pub async fn shutdown(self) -> LoggerStats {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            error!(error = %err, "prediction logger task failed");
        }
        let stats = self.handle.stats();
        info!(?stats, "prediction logger stopped");
        stats
    }
}

async fn run(
    mut rx: mpsc::Receiver<Job>,
    mut stop: oneshot::Receiver<()>,
    path: PathBuf,
    counters: Arc<Counters>,
) {
    // Jobs leave the channel on arrival and wait out their delay here.
    let mut pending: VecDeque<Job> = VecDeque::new();
    let mut closing = false;
    let mut open = true;

    loop {
        // Every job carries the same delay, so the front is always due first.
        let due = pending.front().map(|job| job.due);
        tokio::select! {
            _ = &mut stop, if !closing => {
                closing = true;
                rx.close();
            }
            job = rx.recv(), if open => match job {
                Some(job) => pending.push_back(job),
                None => open = false,
            },
            _ = time::sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                if let Some(job) = pending.pop_front() {
                    write_job(&path, &job, &counters).await;
                }
            }
        }

        if closing {
            while let Some(job) = pending.pop_front() {
                write_job(&path, &job, &counters).await;
            }
        }
        if !open && pending.is_empty() {
            break;
        }
    }
}

async fn write_job(path: &Path, job: &Job, counters: &Counters) {
    match append_record(path, &job.record).await {
        Ok(AppendOutcome::Appended { total }) => {
            counters.written.fetch_add(1, Ordering::Relaxed);
            debug!(path = %path.display(), total, "prediction recorded");
        }
        Ok(AppendOutcome::Skipped) => {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(path = %path.display(), error = %err, "failed to record prediction");
        }
    }
}

/// What a single append did to the log file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The record was written; `total` records are now in the file.
    Appended { total: usize },
    /// The file's root is not an array, so nothing was written.
    Skipped,
}

/// Append one record to the JSON array at `path`.
///
/// A missing file starts a new array and so does one holding invalid JSON.
/// A valid document whose root is not an array is left untouched.
pub async fn append_record(path: &Path, record: &PredictionRecord) -> ServeResult<AppendOutcome> {
    let mut records = match fs::read(path).await {
        Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!(path = %path.display(), "predictions log root is not a list, record not appended");
                return Ok(AppendOutcome::Skipped);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "invalid JSON in predictions log, starting with an empty list");
                Vec::new()
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => Vec::new(),
        Err(err) => return Err(err.into()),
    };

    records.push(serde_json::to_value(record)?);
    write_atomically(path, &encode_pretty(&records)?).await?;
    Ok(AppendOutcome::Appended {
        total: records.len(),
    })
}

/// Pretty JSON with four-space indentation.
fn encode_pretty(records: &[Value]) -> ServeResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    records.serialize(&mut ser)?;
    Ok(out)
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).await?;
    }
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    let staging = path.with_file_name(name);

    fs::write(&staging, bytes).await?;
    fs::rename(&staging, path).await
}
