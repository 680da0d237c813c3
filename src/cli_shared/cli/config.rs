// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use tracing::level_filters::LevelFilter;

use super::client::Client;
use crate::batch::BatchConfig;
use crate::db::db_engine::DbConfig;
use crate::replica::{Replica, ReplicaSet};

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct LogConfig {
    pub filters: Vec<LogValue>,
}

impl LogConfig {
    pub(in crate::cli_shared) fn to_filter_string(&self) -> String {
        self.filters
            .iter()
            .map(|f| format!("{}={}", f.module, f.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filters: vec![
                LogValue::new("parity_db", LevelFilter::WARN),
                LogValue::new("warcvault::cdx", LevelFilter::INFO),
            ],
        }
    }
}

#[serde_as]
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct LogValue {
    pub module: String,
    #[serde_as(as = "DisplayFromStr")]
    pub level: LevelFilter,
}

impl LogValue {
    pub fn new(module: &str, level: LevelFilter) -> Self {
        Self {
            module: module.to_string(),
            level,
        }
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Default, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub client: Client,
    pub parity_db: DbConfig,
    pub batch: BatchConfig,
    pub log: LogConfig,
    pub replicas: Vec<Replica>,
}

impl Config {
    pub fn db_config(&self) -> &DbConfig {
        &self.parity_db
    }

    /// The configured replicas, validated.
    pub fn replica_set(&self) -> anyhow::Result<ReplicaSet> {
        ReplicaSet::new(self.replicas.clone())
    }
}
