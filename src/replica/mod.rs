// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};
use url::Url;

/// Identity of a replica. Replica ids order lexicographically, which is the
/// deterministic tie-break used when several replicas qualify for a read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

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
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ReplicaKind {
    /// Holds the container files themselves and can serve byte ranges.
    BitStorage,
    /// Holds only a checksum ledger for the files it tracks.
    ChecksumOnly,
}

/// A storage node participating in preservation. Immutable once registered.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    pub id: ReplicaId,
    pub kind: ReplicaKind,
    pub endpoint: Url,
    /// Overrides the batch configuration's per-replica timeout.
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl Replica {
    pub fn new(id: impl Into<String>, kind: ReplicaKind, endpoint: Url) -> Self {
        Self {
            id: ReplicaId::new(id),
            kind,
            endpoint,
            timeout: None,
        }
    }

    pub fn can_serve_reads(&self) -> bool {
        self.kind == ReplicaKind::BitStorage
    }
}

/// The configured replicas, sorted by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicaSet {
    replicas: Vec<Replica>,
}

impl ReplicaSet {
    pub fn new(mut replicas: Vec<Replica>) -> anyhow::Result<Self> {
        replicas.sort_by(|a, b| a.id.cmp(&b.id));
        for pair in replicas.windows(2) {
            anyhow::ensure!(
                pair[0].id != pair[1].id,
                "duplicate replica id: {}",
                pair[0].id
            );
        }
        if let Some(replica) = replicas.iter().find(|r| r.id.as_str().trim().is_empty()) {
            anyhow::bail!("replica with endpoint {} has an empty id", replica.endpoint);
        }
        Ok(Self { replicas })
    }

    pub fn get(&self, id: &ReplicaId) -> Option<&Replica> {
        self.replicas
            .binary_search_by(|r| r.id.cmp(id))
            .ok()
            .map(|i| &self.replicas[i])
    }

    /// Iterates in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &Replica> {
        self.replicas.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ReplicaId> {
        self.replicas.iter().map(|r| &r.id)
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }
}
