use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::session::Session;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Remote persistence collaborator. Appends are idempotent-unsafe: a retried
/// append may double-count, which the capture-then-zero flush discipline
/// minimizes but cannot eliminate.
pub trait StepStore {
    fn append_steps(&mut self, user_id: &str, delta: u64) -> Result<(), StoreError>;
    fn append_session(&mut self, session: &Session) -> Result<(), StoreError>;
}

/// Accumulates unflushed step deltas and pushes them to the store on a
/// fixed cadence, re-queuing on failure.
///
/// The backlog is captured and zeroed before the store call so steps
/// credited during the call are not double-counted; on failure the captured
/// value is added back (never overwritten) so those same steps are not
/// lost. In-memory only: a process death loses the current backlog, an
/// accepted data-loss window.
pub struct SyncBuffer {
    user_id: String,
    backlog: u64,
    flushed_total: u64,
    failure_count: u64,
}

impl SyncBuffer {
    pub fn new(user_id: &str) -> Self {
        SyncBuffer {
            user_id: user_id.to_string(),
            backlog: 0,
            flushed_total: 0,
            failure_count: 0,
        }
    }

    pub fn accumulate(&mut self, steps: u64) {
        self.backlog += steps;
    }

    pub fn backlog(&self) -> u64 {
        self.backlog
    }

    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// One flush attempt. A failure is not an error to the user, only a
    /// logged retry; the caller keeps ticking.
    pub fn flush(&mut self, store: &mut dyn StepStore) -> Result<(), StoreError> {
        if self.backlog == 0 {
            return Ok(());
        }

        let captured = self.backlog;
        self.backlog = 0;

        match store.append_steps(&self.user_id, captured) {
            Ok(()) => {
                self.flushed_total += captured;
                log::debug!("[sync] flushed {} steps", captured);
                Ok(())
            }
            Err(err) => {
                // Add back, never overwrite: steps accumulated during the
                // call must survive.
                self.backlog += captured;
                self.failure_count += 1;
                log::warn!(
                    "[sync] flush of {} steps failed ({}), backlog now {}",
                    captured,
                    err,
                    self.backlog
                );
                Err(err)
            }
        }
    }
}

/// File-backed store used by the binaries: step deltas as JSON lines,
/// sessions as one JSON document each.
pub struct JsonStore {
    dir: PathBuf,
}

#[derive(Serialize)]
struct StepRecord<'a> {
    timestamp_ms: u64,
    user_id: &'a str,
    delta: u64,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(JsonStore { dir })
    }
}

impl StepStore for JsonStore {
    fn append_steps(&mut self, user_id: &str, delta: u64) -> Result<(), StoreError> {
        let record = StepRecord {
            timestamp_ms: crate::sensors::current_epoch_ms(),
            user_id,
            delta,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join("steps.jsonl"))?;
        writeln!(file, "{}", serde_json::to_string(&record)?)?;
        Ok(())
    }

    fn append_session(&mut self, session: &Session) -> Result<(), StoreError> {
        let path = self.dir.join(format!("{}.json", session.id));
        fs::write(path, session.to_json()?)?;
        Ok(())
    }
}
