// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{
    collections::BTreeSet,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use ahash::{HashMap, HashMapExt as _};
use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::watch,
    task::JoinSet,
    time::{Instant, error::Elapsed},
};
use tracing::{debug, info, warn};

use super::{
    BatchConfig, BatchError, BatchJob, FileFilter, FileOutcome, FileResult, JobDescriptor, JobId,
    JobKind, JobRequest, ReplicaReply, ReplicaStatus, Targets,
};
use crate::db::KeyValueStore;
use crate::replica::{Replica, ReplicaId, ReplicaSet};
use crate::state::{ReplicaStateStore, StateError, Transition, UploadState};
use crate::transport::{ReplicaTransport, TransportError};

type ReplicaOutcome = Result<Result<ReplicaReply, TransportError>, Elapsed>;

struct JobSlot {
    job: Mutex<BatchJob>,
    done: watch::Sender<bool>,
    finished_at: OnceLock<Instant>,
}

impl JobSlot {
    fn expired(&self, retention: Duration, now: Instant) -> bool {
        self.finished_at
            .get()
            .is_some_and(|finished| *finished + retention <= now)
    }
}

struct Inner<DB> {
    replicas: Arc<ReplicaSet>,
    states: Arc<ReplicaStateStore<DB>>,
    transport: Arc<dyn ReplicaTransport>,
    config: BatchConfig,
    next_id: AtomicU64,
    jobs: RwLock<HashMap<JobId, Arc<JobSlot>>>,
    /// Destructive jobs currently running, by the filename they modify.
    in_flight: Mutex<HashMap<String, JobId>>,
}

/// Dispatches jobs to replicas, collects their answers and publishes the
/// resulting preservation states.
///
/// Each job gets one collector task, which applies replica answers to the job
/// and to the state store one at a time, in arrival order.
pub struct BatchJobCoordinator<DB> {
    inner: Arc<Inner<DB>>,
}

impl<DB> Clone for BatchJobCoordinator<DB> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<DB> BatchJobCoordinator<DB>
where
    DB: KeyValueStore + Send + Sync + 'static,
{
    pub fn new(
        replicas: Arc<ReplicaSet>,
        states: Arc<ReplicaStateStore<DB>>,
        transport: Arc<dyn ReplicaTransport>,
        config: BatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                replicas,
                states,
                transport,
                config,
                next_id: AtomicU64::new(1),
                jobs: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts a job and returns its id without waiting for any replica.
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: JobRequest) -> Result<JobId, BatchError> {
        let inner = &self.inner;
        let targets = inner.resolve_targets(&request.targets)?;
        let job_id = JobId(inner.next_id.fetch_add(1, Ordering::Relaxed));
        inner.prune_finished();

        if let Some(filename) = request.kind.exclusive_file() {
            inner.lock_file(filename, job_id)?;
            if matches!(request.kind, JobKind::Correct { .. }) {
                if let Err(e) = inner.mark_started(filename, &targets) {
                    inner.unlock_file(filename, job_id);
                    return Err(e.into());
                }
            }
        }

        let job = BatchJob::new(job_id, request.kind.tag(), targets.iter().map(|r| &r.id));
        let (done, _) = watch::channel(false);
        let slot = Arc::new(JobSlot {
            job: Mutex::new(job),
            done,
            finished_at: OnceLock::new(),
        });
        inner.jobs.write().insert(job_id, slot.clone());
        info!(
            job = %job_id,
            kind = %request.kind.tag(),
            filter = request.kind.filter().and_then(FileFilter::pattern),
            replicas = targets.len(),
            "batch job submitted"
        );

        let descriptor = Arc::new(JobDescriptor {
            job_id,
            kind: request.kind,
        });
        tokio::spawn(inner.clone().run(slot, descriptor, targets));
        Ok(job_id)
    }

    /// Waits until the job is terminal or `timeout` elapses, then returns the
    /// job as it stands. Timing out here leaves the job running.
    ///
    /// Finished jobs can be waited on until they fall out of the retention
    /// window; see [`BatchConfig::job_retention`].
    pub async fn wait(&self, job_id: JobId, timeout: Duration) -> Result<BatchJob, BatchError> {
        let slot = self.inner.slot(job_id)?;
        let mut done = slot.done.subscribe();
        if tokio::time::timeout(timeout, done.wait_for(|done| *done))
            .await
            .is_err()
        {
            debug!(job = %job_id, "stopped waiting for batch job");
        }
        let job = slot.job.lock().clone();
        Ok(job)
    }

    /// Current snapshot of a job.
    pub fn job(&self, job_id: JobId) -> Result<BatchJob, BatchError> {
        let job = self.inner.slot(job_id)?.job.lock().clone();
        Ok(job)
    }
}

impl<DB> Inner<DB>
where
    DB: KeyValueStore + Send + Sync + 'static,
{
    fn slot(&self, job_id: JobId) -> Result<Arc<JobSlot>, BatchError> {
        self.jobs
            .read()
            .get(&job_id)
            .cloned()
            .ok_or(BatchError::UnknownJob { job: job_id })
    }

    /// Drops finished jobs older than the retention window.
    fn prune_finished(&self) {
        let now = Instant::now();
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, slot| !slot.expired(self.config.job_retention, now));
        let pruned = before - jobs.len();
        if pruned > 0 {
            debug!(pruned, "dropped finished batch jobs");
        }
    }

    fn resolve_targets(&self, targets: &Targets) -> Result<Vec<Replica>, BatchError> {
        let resolved: Vec<Replica> = match targets {
            Targets::All => self.replicas.iter().cloned().collect(),
            Targets::Only(ids) => ids
                .iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .map(|id| {
                    self.replicas
                        .get(id)
                        .cloned()
                        .ok_or_else(|| BatchError::UnknownReplica {
                            replica: id.clone(),
                        })
                })
                .collect::<Result<_, _>>()?,
        };
        if resolved.is_empty() {
            return Err(BatchError::NoTargets);
        }
        Ok(resolved)
    }

    fn lock_file(&self, filename: &str, job_id: JobId) -> Result<(), BatchError> {
        let mut in_flight = self.in_flight.lock();
        if let Some(&job) = in_flight.get(filename) {
            warn!(filename, %job, "rejected conflicting destructive job");
            return Err(BatchError::JobConflict {
                filename: filename.to_owned(),
                job,
            });
        }
        in_flight.insert(filename.to_owned(), job_id);
        Ok(())
    }

    fn unlock_file(&self, filename: &str, job_id: JobId) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(filename) == Some(&job_id) {
            in_flight.remove(filename);
        }
    }

    /// Moves every copy about to be rewritten to `UPLOAD_STARTED`.
    fn mark_started(&self, filename: &str, targets: &[Replica]) -> Result<(), StateError> {
        for replica in targets {
            let transition = match self.states.get_state(filename, &replica.id) {
                Ok(current) => match current.state {
                    UploadState::UploadFailed => Some(Transition::Retry),
                    UploadState::Unknown => Some(Transition::Register),
                    UploadState::UploadStarted | UploadState::UploadCompleted => None,
                },
                Err(StateError::NotFound { .. }) => Some(Transition::Register),
                Err(e) => return Err(e),
            };
            if let Some(transition) = transition {
                self.states.apply(filename, &replica.id, transition)?;
            }
        }
        Ok(())
    }

    async fn run(
        self: Arc<Self>,
        slot: Arc<JobSlot>,
        descriptor: Arc<JobDescriptor>,
        targets: Vec<Replica>,
    ) {
        let job_id = descriptor.job_id;
        let deadline = Instant::now() + self.config.job_timeout;
        let mut tasks = JoinSet::new();
        for replica in targets {
            slot.job.lock().set_status(&replica.id, ReplicaStatus::Running);
            let transport = self.transport.clone();
            let descriptor = descriptor.clone();
            let timeout = replica.timeout.unwrap_or(self.config.replica_timeout);
            tasks.spawn(async move {
                let outcome: ReplicaOutcome =
                    tokio::time::timeout(timeout, transport.send(&replica, &descriptor)).await;
                (replica.id, outcome)
            });
        }

        let deadline_reached = tokio::time::sleep_until(deadline);
        tokio::pin!(deadline_reached);
        let mut expired = false;
        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((replica, outcome))) => {
                        self.collect(&slot, &descriptor.kind, &replica, outcome);
                    }
                    Some(Err(e)) => warn!(job = %job_id, "replica task ended abnormally: {e}"),
                    None => break,
                },
                () = &mut deadline_reached => {
                    expired = true;
                    tasks.abort_all();
                    break;
                }
            }
        }

        self.finish(&slot, &descriptor, expired);
        if let Some(filename) = descriptor.kind.exclusive_file() {
            self.unlock_file(filename, job_id);
        }
        let _ = slot.finished_at.set(Instant::now());
        slot.done.send_replace(true);
    }

    /// Applies one replica's answer to the job and the state store.
    fn collect(&self, slot: &JobSlot, kind: &JobKind, replica: &ReplicaId, outcome: ReplicaOutcome) {
        let job_id = slot.job.lock().id;
        match outcome {
            Err(_) => {
                warn!(job = %job_id, %replica, "replica timed out");
                slot.job.lock().set_status(replica, ReplicaStatus::TimedOut);
            }
            Ok(Err(e)) => {
                warn!(job = %job_id, %replica, "replica failed: {e}");
                slot.job.lock().set_failed(replica, e.to_string());
            }
            Ok(Ok(reply)) => {
                let count = reply.entries.len();
                let mut reported = BTreeSet::new();
                for entry in reply.entries {
                    if !kind.covers(&entry.filename) {
                        debug!(job = %job_id, %replica, filename = %entry.filename, "ignoring file outside job scope");
                        continue;
                    }
                    reported.insert(entry.filename.clone());
                    let entry = self.publish(kind, replica, entry);
                    slot.job.lock().record(entry.filename, replica, entry.outcome);
                }
                if let JobKind::Checksum {
                    filter,
                    expected: Some(expected),
                } = kind
                {
                    for filename in expected.keys() {
                        if filter.matches(filename) && !reported.contains(filename) {
                            slot.job.lock().record(
                                filename.clone(),
                                replica,
                                FileOutcome::failure("missing"),
                            );
                        }
                    }
                }
                info!(job = %job_id, %replica, files = count, "replica done");
                slot.job.lock().set_status(replica, ReplicaStatus::Done);
            }
        }
    }

    /// Publishes the state change implied by one per-file outcome. The outcome
    /// is returned, rewritten when it contradicts the expected checksum.
    fn publish(&self, kind: &JobKind, replica: &ReplicaId, entry: FileResult) -> FileResult {
        let FileResult { filename, outcome } = entry;
        let states = &self.states;
        let (outcome, published) = match (kind, &outcome) {
            (JobKind::ListFiles { .. }, FileOutcome::Success { .. }) => {
                let published = states.apply(&filename, replica, Transition::Observe);
                (outcome, published.map(drop))
            }
            (
                JobKind::Checksum {
                    expected: Some(expected),
                    ..
                },
                FileOutcome::Success {
                    payload: Some(actual),
                },
            ) => match expected.get(&filename) {
                Some(wanted) if wanted.eq_ignore_ascii_case(actual) => {
                    let published = states
                        .apply(&filename, replica, Transition::Observe)
                        .and_then(|current| {
                            if current.state == UploadState::UploadFailed {
                                Ok(())
                            } else {
                                states
                                    .apply(&filename, replica, Transition::Confirm)
                                    .map(drop)
                            }
                        });
                    (outcome, published)
                }
                Some(wanted) => {
                    let published = states
                        .apply(&filename, replica, Transition::Observe)
                        .and_then(|_| states.apply(&filename, replica, Transition::Fail))
                        .map(drop);
                    let reason = format!("checksum mismatch: expected {wanted}, found {actual}");
                    (FileOutcome::failure(reason), published)
                }
                None => {
                    let published = states.apply(&filename, replica, Transition::Observe);
                    (outcome, published.map(drop))
                }
            },
            (JobKind::Checksum { .. }, FileOutcome::Success { .. }) => {
                let published = states.apply(&filename, replica, Transition::Observe);
                (outcome, published.map(drop))
            }
            (JobKind::Correct { .. }, FileOutcome::Success { .. }) => {
                let published = states.apply(&filename, replica, Transition::Confirm);
                (outcome, published.map(drop))
            }
            (JobKind::Correct { .. }, FileOutcome::Failure { .. }) => {
                let published = states.apply(&filename, replica, Transition::Fail);
                (outcome, published.map(drop))
            }
            (JobKind::Remove { .. }, FileOutcome::Success { .. }) => {
                let published = states
                    .apply(&filename, replica, Transition::Observe)
                    .and_then(|_| states.apply(&filename, replica, Transition::Fail))
                    .map(drop);
                (outcome, published)
            }
            _ => (outcome, Ok(())),
        };
        if let Err(e) = published {
            warn!(filename, %replica, "could not publish preservation state: {e}");
        }
        FileResult { filename, outcome }
    }

    /// Settles replicas that never answered and fills in unknown outcomes for
    /// the files they might hold.
    fn finish(&self, slot: &JobSlot, descriptor: &JobDescriptor, expired: bool) {
        let silent: Vec<ReplicaId> = {
            let mut job = slot.job.lock();
            let pending: Vec<ReplicaId> = job
                .replicas
                .iter()
                .filter(|(_, p)| !p.status.is_terminal())
                .map(|(id, _)| id.clone())
                .collect();
            for replica in &pending {
                if expired {
                    job.set_status(replica, ReplicaStatus::TimedOut);
                } else {
                    job.set_failed(replica, "replica task ended without an answer".into());
                }
            }
            if expired && !pending.is_empty() {
                warn!(job = %descriptor.job_id, replicas = pending.len(), "job deadline reached");
            }
            job.replicas
                .iter()
                .filter(|(_, p)| p.status == ReplicaStatus::TimedOut)
                .map(|(id, _)| id.clone())
                .collect()
        };

        for replica in silent {
            let known = match self.states.files_at(&replica) {
                Ok(files) => files,
                Err(e) => {
                    warn!(%replica, "could not list known files: {e}");
                    vec![]
                }
            };
            let mut job = slot.job.lock();
            let files: BTreeSet<String> = job
                .results
                .keys()
                .cloned()
                .chain(known.into_iter().filter(|f| descriptor.kind.covers(f)))
                .collect();
            for filename in files {
                job.record_unknown(filename, &replica);
            }
        }

        let job = slot.job.lock();
        info!(
            job = %job.id,
            done = job.count(ReplicaStatus::Done),
            failed = job.count(ReplicaStatus::Failed),
            timed_out = job.count(ReplicaStatus::TimedOut),
            "batch job finished"
        );
    }
}
