// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Per-replica preservation state of archived container files.
//!
//! Every `(filename, replica)` pair moves through a small state machine:
//!
//! ```text
//!   Register ─► UPLOAD_STARTED ──Confirm──► UPLOAD_COMPLETED
//!                   ▲     │                       │
//!                 Retry  Fail                    Fail
//!                   │     ▼                       │
//!               UPLOAD_FAILED ◄───────────────────┘
//! ```
//!
//! A file first seen by a listing job, without any upload having been
//! registered, enters `UNKNOWN` and leaves it through `Register`, `Confirm`
//! or `Fail`.
//!
//! All rows of one file live in a single document keyed by filename, so the
//! aggregate view of a file is a single read.


use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::{KeyValueStore, KeyValueStoreExt as _};
use crate::replica::ReplicaId;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum UploadState {
    UploadStarted,
    UploadCompleted,
    UploadFailed,
    Unknown,
}

/// Named preservation actions. Each one is only valid from certain states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Transition {
    /// A copy has been registered for storage.
    Register,
    /// The copy was written and verified.
    Confirm,
    /// Writing failed, verification detected corruption, or the copy is gone.
    Fail,
    /// Explicit re-upload of a failed copy.
    Retry,
    /// The file was seen at the replica without further evidence.
    Observe,
}

impl Transition {
    /// Returns the state after the transition, `Ok(None)` when the current
    /// state is kept untouched, or `Err(())` when the transition is illegal.
    fn next(self, from: Option<UploadState>) -> Result<Option<UploadState>, ()> {
        use UploadState::*;
        match (self, from) {
            (Transition::Register, None | Some(Unknown)) => Ok(Some(UploadStarted)),
            (Transition::Confirm, Some(UploadStarted | Unknown | UploadCompleted)) => {
                Ok(Some(UploadCompleted))
            }
            (Transition::Fail, Some(_)) => Ok(Some(UploadFailed)),
            (Transition::Retry, Some(UploadFailed)) => Ok(Some(UploadStarted)),
            (Transition::Observe, None) => Ok(Some(Unknown)),
            (Transition::Observe, Some(_)) => Ok(None),
            _ => Err(()),
        }
    }
}

/// State of one file at one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaFileState {
    pub state: UploadState,
    pub last_changed: DateTime<Utc>,
}

impl std::fmt::Display for ReplicaFileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.state, self.last_changed.timestamp_millis())
    }
}

/// Audit log entry, recorded when history is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub replica: ReplicaId,
    pub state: UploadState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FileRecord {
    replicas: BTreeMap<ReplicaId, ReplicaFileState>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    history: Vec<StateChange>,
}

/// All known replica states of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStateOverview {
    pub filename: String,
    pub replicas: BTreeMap<ReplicaId, ReplicaFileState>,
}

impl FileStateOverview {
    /// `true` if at least one replica holds a confirmed copy.
    pub fn is_preserved_anywhere(&self) -> bool {
        self.replicas
            .values()
            .any(|s| s.state == UploadState::UploadCompleted)
    }

    pub fn overall(&self) -> UploadState {
        let states = || self.replicas.values().map(|s| s.state);
        if states().any(|s| s == UploadState::UploadFailed) {
            UploadState::UploadFailed
        } else if states().all(|s| s == UploadState::UploadCompleted) {
            UploadState::UploadCompleted
        } else if states().any(|s| s == UploadState::UploadStarted) {
            UploadState::UploadStarted
        } else {
            UploadState::Unknown
        }
    }

    /// Replicas holding a confirmed copy, in ascending id order.
    pub fn completed_replicas(&self) -> impl Iterator<Item = &ReplicaId> {
        self.replicas
            .iter()
            .filter(|(_, s)| s.state == UploadState::UploadCompleted)
            .map(|(id, _)| id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("no preservation state for '{filename}' at replica {replica}")]
    NotFound { filename: String, replica: ReplicaId },
    #[error("'{filename}' has never been observed at any replica")]
    FileNotFound { filename: String },
    #[error("cannot {transition} '{filename}' at replica {replica} from state {}", .from.map_or("<none>".to_owned(), |s| s.to_string()))]
    InvalidTransition {
        filename: String,
        replica: ReplicaId,
        from: Option<UploadState>,
        transition: Transition,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Durable record of each file's preservation state per replica.
///
/// Writes are serialized by an internal lock so that the read-modify-write of
/// a file document never interleaves, and timestamps never move backwards.
pub struct ReplicaStateStore<DB> {
    db: DB,
    keep_history: bool,
    write_lock: Mutex<()>,
}

impl<DB: KeyValueStore> ReplicaStateStore<DB> {
    pub fn new(db: DB) -> Self {
        Self {
            db,
            keep_history: false,
            write_lock: Mutex::new(()),
        }
    }

    /// Keep every superseded state as history.
    pub fn with_history(mut self, keep_history: bool) -> Self {
        self.keep_history = keep_history;
        self
    }

    /// Unconditionally overwrites the state (last write wins).
    pub fn set_state(
        &self,
        filename: &str,
        replica: &ReplicaId,
        state: UploadState,
    ) -> Result<ReplicaFileState, StateError> {
        self.update(filename, replica, |_| Ok(Some(state)))
    }

    /// Applies a named preservation action, rejecting it if the state machine
    /// does not allow it from the current state.
    pub fn apply(
        &self,
        filename: &str,
        replica: &ReplicaId,
        transition: Transition,
    ) -> Result<ReplicaFileState, StateError> {
        self.update(filename, replica, |from| {
            transition
                .next(from)
                .map_err(|()| StateError::InvalidTransition {
                    filename: filename.to_owned(),
                    replica: replica.clone(),
                    from,
                    transition,
                })
        })
    }

    pub fn get_state(
        &self,
        filename: &str,
        replica: &ReplicaId,
    ) -> Result<ReplicaFileState, StateError> {
        self.read_record(filename)?
            .and_then(|record| record.replicas.get(replica).copied())
            .ok_or_else(|| StateError::NotFound {
                filename: filename.to_owned(),
                replica: replica.clone(),
            })
    }

    /// Aggregates the state of a file across every replica it was seen at.
    pub fn get_file_state(&self, filename: &str) -> Result<FileStateOverview, StateError> {
        match self.read_record(filename)? {
            Some(record) if !record.replicas.is_empty() => Ok(FileStateOverview {
                filename: filename.to_owned(),
                replicas: record.replicas,
            }),
            _ => Err(StateError::FileNotFound {
                filename: filename.to_owned(),
            }),
        }
    }

    /// Every filename with a state row for `replica`.
    pub fn files_at(&self, replica: &ReplicaId) -> Result<Vec<String>, StateError> {
        let mut files = vec![];
        for key in self.db.keys()? {
            if let Some(record) = self.read_record(&key)? {
                if record.replicas.contains_key(replica) {
                    files.push(key);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn history(&self, filename: &str) -> Result<Vec<StateChange>, StateError> {
        Ok(self
            .read_record(filename)?
            .map(|record| record.history)
            .unwrap_or_default())
    }

    fn read_record(&self, filename: &str) -> Result<Option<FileRecord>, StateError> {
        Ok(self.db.read_obj::<FileRecord>(filename)?)
    }

    fn update(
        &self,
        filename: &str,
        replica: &ReplicaId,
        next: impl FnOnce(Option<UploadState>) -> Result<Option<UploadState>, StateError>,
    ) -> Result<ReplicaFileState, StateError> {
        let _guard = self.write_lock.lock();
        let mut record = self.read_record(filename)?.unwrap_or_default();
        let previous = record.replicas.get(replica).copied();
        let Some(state) = next(previous.map(|p| p.state))? else {
            // the transition keeps the current state, which therefore exists
            return previous.ok_or_else(|| StateError::NotFound {
                filename: filename.to_owned(),
                replica: replica.clone(),
            });
        };
        let now = Utc::now();
        let last_changed = previous.map_or(now, |p| p.last_changed.max(now));
        let updated = ReplicaFileState {
            state,
            last_changed,
        };
        record.replicas.insert(replica.clone(), updated);
        if self.keep_history {
            record.history.push(StateChange {
                replica: replica.clone(),
                state,
                at: last_changed,
            });
        }
        self.db.write_obj(filename, &record)?;
        debug!(filename, replica = %replica, %state, "preservation state updated");
        Ok(updated)
    }
}
