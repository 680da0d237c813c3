// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Batch jobs executed autonomously by every targeted replica.
//!
//! A job is sent to each replica independently and the per-file answers are
//! collected side by side. Nothing is voted on or merged: when replicas
//! disagree, the job result shows each of them. Replicas that do not answer
//! in time are marked [`ReplicaStatus::TimedOut`] and the files they might
//! hold are reported as [`FileOutcome::Unknown`].

mod coordinator;
mod job;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use smart_default::SmartDefault;

use crate::replica::ReplicaId;
use crate::state::StateError;

pub use coordinator::BatchJobCoordinator;
pub use job::{
    BatchJob, FileFilter, FileOutcome, FileResult, JobDescriptor, JobId, JobKind, JobKindTag,
    ReplicaProgress, ReplicaReply, ReplicaStatus,
};

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct BatchConfig {
    /// Time a single replica gets to answer, unless the replica overrides it.
    #[default(Duration::from_secs(30))]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub replica_timeout: Duration,
    /// Overall deadline of a job, across all of its replicas.
    #[default(Duration::from_secs(120))]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub job_timeout: Duration,
    /// How long a finished job stays queryable. Older finished jobs are
    /// dropped when the next job is submitted.
    #[default(Duration::from_secs(600))]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub job_retention: Duration,
}

/// Replicas a job is dispatched to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Targets {
    #[default]
    All,
    Only(Vec<ReplicaId>),
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub kind: JobKind,
    pub targets: Targets,
}

impl JobRequest {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            targets: Targets::All,
        }
    }

    pub fn with_targets(mut self, targets: Targets) -> Self {
        self.targets = targets;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("invalid file filter '{pattern}'")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("unknown replica {replica}")]
    UnknownReplica { replica: ReplicaId },
    #[error("job targets no replica")]
    NoTargets,
    #[error("'{filename}' is already being modified by {job}")]
    JobConflict { filename: String, job: JobId },
    #[error("unknown job {job}")]
    UnknownJob { job: JobId },
    #[error(transparent)]
    State(#[from] StateError),
}
