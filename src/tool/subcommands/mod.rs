// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod batch_cmd;
pub mod get_record_cmd;
pub mod state_cmd;

use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;

use crate::cli_shared::cli::{CliOpts, Config};
use crate::cli_shared::db_path;
use crate::db::db_engine::{Db, open_db};
use crate::replica::ReplicaSet;
use crate::state::ReplicaStateStore;
use crate::utils::version::VERSION_STRING;

/// Command-line options for the `warcvault-tool` binary
#[derive(Parser)]
#[command(name = "warcvault-tool", author = env!("CARGO_PKG_AUTHORS"), version = VERSION_STRING.as_str(), about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(flatten)]
    pub opts: CliOpts,
    #[command(subcommand)]
    pub cmd: Subcommand,
}

/// warcvault-tool sub-commands
#[derive(clap::Subcommand)]
pub enum Subcommand {
    /// Resolve a URI through a CDX index and write the record bytes to stdout
    #[command(name = "get-record")]
    GetRecord(get_record_cmd::GetRecordCommand),

    /// Run batch jobs on the configured replicas
    #[command(subcommand)]
    Batch(batch_cmd::BatchCommands),

    /// Inspect and administer preservation state
    #[command(subcommand)]
    State(state_cmd::StateCommands),
}

/// Opens the preservation state database under the configured data directory.
fn open_state_store(config: &Config) -> anyhow::Result<Arc<ReplicaStateStore<Db>>> {
    let path = db_path(config);
    let db = open_db(&path, config.db_config())
        .with_context(|| format!("cannot open state database at {}", path.display()))?;
    Ok(Arc::new(
        ReplicaStateStore::new(db).with_history(config.client.keep_state_history),
    ))
}

fn replica_set(config: &Config) -> anyhow::Result<Arc<ReplicaSet>> {
    let replicas = config.replica_set().context("invalid replica configuration")?;
    anyhow::ensure!(!replicas.is_empty(), "no replicas configured");
    Ok(Arc::new(replicas))
}
