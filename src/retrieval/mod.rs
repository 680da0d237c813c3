// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Fetching the bytes of an indexed record from a replica holding a
//! confirmed copy of its container file.

use std::sync::Arc;

use tracing::{debug, info};

use crate::cdx::RecordLocation;
use crate::db::KeyValueStore;
use crate::replica::{Replica, ReplicaId, ReplicaSet};
use crate::state::{ReplicaStateStore, StateError, UploadState};
use crate::transport::{ByteStream, ReplicaTransport, TransportError};

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("no replica holds a confirmed copy of '{filename}'")]
    NoCompletedReplica { filename: String },
    #[error("reading '{filename}' from replica {replica} failed")]
    ReplicaRead {
        filename: String,
        replica: ReplicaId,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    State(#[from] StateError),
}

/// Streams byte ranges of container files from a healthy replica.
///
/// Among the bit-storage replicas whose copy is `UPLOAD_COMPLETED`, the one
/// with the lowest id is used. A failed read is reported as is; trying
/// another replica is up to the caller, and every call re-evaluates replica
/// health.
pub struct RecordRetriever<DB> {
    replicas: Arc<ReplicaSet>,
    states: Arc<ReplicaStateStore<DB>>,
    transport: Arc<dyn ReplicaTransport>,
}

impl<DB: KeyValueStore> RecordRetriever<DB> {
    pub fn new(
        replicas: Arc<ReplicaSet>,
        states: Arc<ReplicaStateStore<DB>>,
        transport: Arc<dyn ReplicaTransport>,
    ) -> Self {
        Self {
            replicas,
            states,
            transport,
        }
    }

    /// The replica a fetch of `filename` would read from.
    pub fn choose_replica(&self, filename: &str) -> Result<&Replica, RetrievalError> {
        for replica in self.replicas.iter().filter(|r| r.can_serve_reads()) {
            match self.states.get_state(filename, &replica.id) {
                Ok(state) if state.state == UploadState::UploadCompleted => return Ok(replica),
                Ok(state) => {
                    debug!(filename, replica = %replica.id, state = %state.state, "copy not usable");
                }
                Err(StateError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Err(RetrievalError::NoCompletedReplica {
            filename: filename.to_owned(),
        })
    }

    /// Opens a stream over `length` bytes of `filename` at `offset`.
    pub async fn fetch(
        &self,
        filename: &str,
        offset: u64,
        length: u64,
    ) -> Result<ByteStream, RetrievalError> {
        let replica = self.choose_replica(filename)?;
        info!(filename, offset, length, replica = %replica.id, "fetching record");
        self.transport
            .read_range(replica, filename, offset, length)
            .await
            .map_err(|source| RetrievalError::ReplicaRead {
                filename: filename.to_owned(),
                replica: replica.id.clone(),
                source,
            })
    }

    pub async fn fetch_location(
        &self,
        location: &RecordLocation,
    ) -> Result<ByteStream, RetrievalError> {
        self.fetch(&location.filename, location.offset, location.length)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDB;
    use crate::replica::ReplicaKind;
    use crate::state::Transition;
    use crate::transport::LocalTransport;
    use futures::TryStreamExt as _;
    use url::Url;

    const FILE: &str = "a.warc";

    struct Fixture {
        retriever: RecordRetriever<MemoryDB>,
        states: Arc<ReplicaStateStore<MemoryDB>>,
        _dirs: Vec<tempfile::TempDir>,
    }

    /// Replicas `A` (checksum only), `B` and `C`, with `B` and `C` holding
    /// different contents for the same file so reads show where they went.
    fn fixture() -> Fixture {
        let dirs: Vec<_> = (0..3).map(|_| tempfile::tempdir().unwrap()).collect();
        std::fs::write(dirs[1].path().join(FILE), b"bbbbbbbbbb").unwrap();
        std::fs::write(dirs[2].path().join(FILE), b"cccccccccc").unwrap();
        let replica = |id: &str, kind, dir: &tempfile::TempDir| {
            Replica::new(id, kind, Url::from_directory_path(dir.path()).unwrap())
        };
        let replicas = ReplicaSet::new(vec![
            replica("C", ReplicaKind::BitStorage, &dirs[2]),
            replica("A", ReplicaKind::ChecksumOnly, &dirs[0]),
            replica("B", ReplicaKind::BitStorage, &dirs[1]),
        ])
        .unwrap();
        let states = Arc::new(ReplicaStateStore::new(MemoryDB::default()));
        Fixture {
            retriever: RecordRetriever::new(
                Arc::new(replicas),
                states.clone(),
                Arc::new(LocalTransport),
            ),
            states,
            _dirs: dirs,
        }
    }

    fn complete(states: &ReplicaStateStore<MemoryDB>, replica: &str) {
        states
            .apply(FILE, &replica.into(), Transition::Register)
            .unwrap();
        states
            .apply(FILE, &replica.into(), Transition::Confirm)
            .unwrap();
    }

    async fn fetch(retriever: &RecordRetriever<MemoryDB>) -> Result<Vec<u8>, RetrievalError> {
        let stream = retriever.fetch(FILE, 2, 4).await?;
        let chunks: Vec<_> = stream.try_collect().await.unwrap();
        Ok(chunks.concat())
    }

    #[tokio::test]
    async fn reads_from_lowest_completed_bit_storage_replica() {
        let Fixture {
            retriever,
            states,
            _dirs,
        } = fixture();
        complete(&states, "A");
        complete(&states, "C");
        assert_eq!(fetch(&retriever).await.unwrap(), b"cccc");

        complete(&states, "B");
        assert_eq!(fetch(&retriever).await.unwrap(), b"bbbb");

        states
            .apply(FILE, &"B".into(), Transition::Fail)
            .unwrap();
        assert_eq!(fetch(&retriever).await.unwrap(), b"cccc");
    }

    #[tokio::test]
    async fn no_completed_copy() {
        let Fixture {
            retriever, states, ..
        } = fixture();
        states
            .apply(FILE, &"B".into(), Transition::Register)
            .unwrap();
        let err = fetch(&retriever).await.unwrap_err();
        assert!(matches!(err, RetrievalError::NoCompletedReplica { ref filename } if filename == FILE));
    }

    #[tokio::test]
    async fn read_failure_does_not_fail_over() {
        let Fixture {
            retriever,
            states,
            _dirs,
        } = fixture();
        complete(&states, "B");
        complete(&states, "C");
        let err = retriever.fetch(FILE, 8, 4).await.err().unwrap();
        match err {
            RetrievalError::ReplicaRead {
                replica, source, ..
            } => {
                assert_eq!(replica.as_str(), "B");
                assert!(matches!(source, TransportError::OutOfRange { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
