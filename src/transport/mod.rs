// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod local;

pub use local::{CHECKSUM_LEDGER, LocalTransport, md5_hex};

use std::{io, pin::Pin};

use bytes::Bytes;
use futures::Stream;

use crate::batch::{JobDescriptor, ReplicaReply};
use crate::replica::{Replica, ReplicaId};

/// Bytes of a record, streamed from a replica.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("replica {replica} is unreachable: {reason}")]
    Unreachable { replica: ReplicaId, reason: String },
    #[error("replica {replica} does not hold '{filename}'")]
    NotFound { replica: ReplicaId, filename: String },
    #[error(
        "range {offset}+{length} is outside '{filename}' ({size} bytes) at replica {replica}"
    )]
    OutOfRange {
        replica: ReplicaId,
        filename: String,
        offset: u64,
        length: u64,
        size: u64,
    },
    #[error("replica {replica} does not support {operation}")]
    Unsupported {
        replica: ReplicaId,
        operation: &'static str,
    },
    #[error("unsupported endpoint {0}")]
    UnsupportedEndpoint(url::Url),
    #[error("replica {replica} failed: {source}")]
    Io {
        replica: ReplicaId,
        #[source]
        source: io::Error,
    },
}

/// How the core reaches replicas. Each call is delivered at most once; any
/// retry policy belongs to the caller.
#[async_trait::async_trait]
pub trait ReplicaTransport: Send + Sync {
    /// Executes a job at the replica and returns its per-file results.
    async fn send(
        &self,
        replica: &Replica,
        job: &JobDescriptor,
    ) -> Result<ReplicaReply, TransportError>;

    /// Opens a stream over `length` bytes of `filename` starting at `offset`.
    /// Returns once the stream is established, before it is drained.
    async fn read_range(
        &self,
        replica: &Replica,
        filename: &str,
        offset: u64,
        length: u64,
    ) -> Result<ByteStream, TransportError>;
}
