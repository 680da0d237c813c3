// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{collections::BTreeMap, fmt};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::BatchError;
use crate::replica::ReplicaId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Optional regular expression that filenames must match.
#[derive(Debug, Clone, Default)]
pub struct FileFilter(Option<Regex>);

impl FileFilter {
    pub fn all() -> Self {
        Self(None)
    }

    pub fn new(pattern: &str) -> Result<Self, BatchError> {
        Regex::new(pattern)
            .map(|re| Self(Some(re)))
            .map_err(|source| BatchError::InvalidFilter {
                pattern: pattern.to_owned(),
                source,
            })
    }

    pub fn matches(&self, filename: &str) -> bool {
        self.0.as_ref().is_none_or(|re| re.is_match(filename))
    }

    pub fn pattern(&self) -> Option<&str> {
        self.0.as_ref().map(Regex::as_str)
    }
}

/// What a replica is asked to do, with its parameters.
#[derive(Debug, Clone)]
pub enum JobKind {
    ListFiles {
        filter: FileFilter,
    },
    Checksum {
        filter: FileFilter,
        /// Known-good MD5 checksums. When present, mismatches are failures.
        expected: Option<BTreeMap<String, String>>,
    },
    Correct {
        filename: String,
        data: Bytes,
        checksum: String,
    },
    Remove {
        filename: String,
        /// The copy is only removed if its current checksum equals this one.
        checksum: String,
    },
}

impl JobKind {
    pub fn tag(&self) -> JobKindTag {
        match self {
            JobKind::ListFiles { .. } => JobKindTag::ListFiles,
            JobKind::Checksum { .. } => JobKindTag::Checksum,
            JobKind::Correct { .. } => JobKindTag::Correct,
            JobKind::Remove { .. } => JobKindTag::Remove,
        }
    }

    /// The one file a CORRECT or REMOVE job acts on.
    pub fn target_file(&self) -> Option<&str> {
        match self {
            JobKind::Correct { filename, .. } | JobKind::Remove { filename, .. } => {
                Some(filename)
            }
            JobKind::ListFiles { .. } | JobKind::Checksum { .. } => None,
        }
    }

    /// The filename filter of a LIST_FILES or CHECKSUM job.
    pub fn filter(&self) -> Option<&FileFilter> {
        match self {
            JobKind::ListFiles { filter } | JobKind::Checksum { filter, .. } => Some(filter),
            JobKind::Correct { .. } | JobKind::Remove { .. } => None,
        }
    }

    /// The file a non-idempotent job must hold exclusively while it runs.
    pub fn exclusive_file(&self) -> Option<&str> {
        if self.tag().is_idempotent() {
            None
        } else {
            self.target_file()
        }
    }

    /// Whether `filename` is within the scope of this job.
    pub fn covers(&self, filename: &str) -> bool {
        match self {
            JobKind::ListFiles { filter } | JobKind::Checksum { filter, .. } => {
                filter.matches(filename)
            }
            JobKind::Correct { filename: f, .. } | JobKind::Remove { filename: f, .. } => {
                f == filename
            }
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobKindTag {
    ListFiles,
    Checksum,
    Correct,
    Remove,
}

impl JobKindTag {
    /// Safe to re-run and to run concurrently on the same files.
    pub fn is_idempotent(self) -> bool {
        matches!(self, JobKindTag::ListFiles | JobKindTag::Checksum)
    }
}

/// The message dispatched to each targeted replica.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub job_id: JobId,
    pub kind: JobKind,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReplicaStatus {
    Pending,
    Running,
    Done,
    Failed,
    TimedOut,
}

impl ReplicaStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ReplicaStatus::Done | ReplicaStatus::Failed | ReplicaStatus::TimedOut
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaProgress {
    pub status: ReplicaStatus,
    /// Replica-level failure description, set with [`ReplicaStatus::Failed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplicaProgress {
    fn pending() -> Self {
        Self {
            status: ReplicaStatus::Pending,
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
    },
    Failure {
        reason: String,
    },
    /// The replica did not answer; nothing is known about its copy.
    Unknown,
}

impl FileOutcome {
    pub fn success() -> Self {
        FileOutcome::Success { payload: None }
    }

    pub fn with_payload(payload: impl Into<String>) -> Self {
        FileOutcome::Success {
            payload: Some(payload.into()),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        FileOutcome::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FileOutcome::Failure { .. })
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Success { payload: None } => f.write_str("ok"),
            FileOutcome::Success {
                payload: Some(payload),
            } => write!(f, "ok {payload}"),
            FileOutcome::Failure { reason } => write!(f, "failed: {reason}"),
            FileOutcome::Unknown => f.write_str("unknown"),
        }
    }
}

/// A single per-file entry in a replica's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileResult {
    pub filename: String,
    pub outcome: FileOutcome,
}

impl FileResult {
    pub fn new(filename: impl Into<String>, outcome: FileOutcome) -> Self {
        Self {
            filename: filename.into(),
            outcome,
        }
    }
}

/// What a replica returns after executing a job locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaReply {
    pub entries: Vec<FileResult>,
}

/// A job and everything learned so far from the replicas it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: JobId,
    pub kind: JobKindTag,
    pub submitted_at: DateTime<Utc>,
    pub replicas: BTreeMap<ReplicaId, ReplicaProgress>,
    /// filename -> replica -> outcome. Outcomes are never merged: replicas
    /// that disagree are reported side by side.
    pub results: BTreeMap<String, BTreeMap<ReplicaId, FileOutcome>>,
}

impl BatchJob {
    pub(super) fn new<'a>(
        id: JobId,
        kind: JobKindTag,
        targets: impl IntoIterator<Item = &'a ReplicaId>,
    ) -> Self {
        Self {
            id,
            kind,
            submitted_at: Utc::now(),
            replicas: targets
                .into_iter()
                .map(|id| (id.clone(), ReplicaProgress::pending()))
                .collect(),
            results: BTreeMap::new(),
        }
    }

    /// Every targeted replica is done, failed or timed out.
    pub fn is_terminal(&self) -> bool {
        self.replicas.values().all(|p| p.status.is_terminal())
    }

    pub fn status(&self, replica: &ReplicaId) -> Option<ReplicaStatus> {
        self.replicas.get(replica).map(|p| p.status)
    }

    pub fn count(&self, status: ReplicaStatus) -> usize {
        self.replicas.values().filter(|p| p.status == status).count()
    }

    pub fn outcomes(&self, filename: &str) -> Option<&BTreeMap<ReplicaId, FileOutcome>> {
        self.results.get(filename)
    }

    pub fn outcome(&self, filename: &str, replica: &ReplicaId) -> Option<&FileOutcome> {
        self.results.get(filename)?.get(replica)
    }

    /// Files with a failure reported by at least one replica.
    pub fn failed_files(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, outcomes)| outcomes.values().any(FileOutcome::is_failure))
            .map(|(filename, _)| filename.as_str())
    }

    /// Files about which no answering replica said anything.
    pub fn unknown_files(&self) -> impl Iterator<Item = &str> {
        self.results
            .iter()
            .filter(|(_, outcomes)| outcomes.values().all(|o| *o == FileOutcome::Unknown))
            .map(|(filename, _)| filename.as_str())
    }

    pub(super) fn record(&mut self, filename: String, replica: &ReplicaId, outcome: FileOutcome) {
        self.results
            .entry(filename)
            .or_default()
            .insert(replica.clone(), outcome);
    }

    /// Records an unknown outcome unless the replica already reported one.
    pub(super) fn record_unknown(&mut self, filename: String, replica: &ReplicaId) {
        self.results
            .entry(filename)
            .or_default()
            .entry(replica.clone())
            .or_insert(FileOutcome::Unknown);
    }

    pub(super) fn set_status(&mut self, replica: &ReplicaId, status: ReplicaStatus) {
        if let Some(progress) = self.replicas.get_mut(replica) {
            progress.status = status;
        }
    }

    pub(super) fn set_failed(&mut self, replica: &ReplicaId, error: String) {
        if let Some(progress) = self.replicas.get_mut(replica) {
            progress.status = ReplicaStatus::Failed;
            progress.error = Some(error);
        }
    }
}
