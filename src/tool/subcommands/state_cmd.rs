// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use clap::Subcommand;
use tracing::info;

use super::open_state_store;
use crate::cli_shared::cli::Config;
use crate::replica::ReplicaId;
use crate::state::UploadState;

#[derive(Debug, Subcommand)]
pub enum StateCommands {
    /// Show the preservation state of a file at every replica
    Show {
        /// Name of the container file
        filename: String,
    },
    /// Overwrite the preservation state of a file at one replica
    Set {
        /// Name of the container file
        filename: String,
        /// Replica id
        replica: String,
        /// One of `UPLOAD_STARTED`, `UPLOAD_COMPLETED`, `UPLOAD_FAILED`, `UNKNOWN`
        state: UploadState,
    },
    /// List the files known at a replica
    Files {
        /// Replica id
        replica: String,
    },
}

impl StateCommands {
    pub fn run(self, config: Config) -> anyhow::Result<()> {
        let states = open_state_store(&config)?;
        match self {
            Self::Show { filename } => {
                let overview = states.get_file_state(&filename)?;
                println!("{filename}: {}", overview.overall());
                for (replica, state) in &overview.replicas {
                    println!("  {replica}: {} since {}", state.state, state.last_changed.to_rfc3339());
                }
                for change in states.history(&filename)? {
                    println!("  history {} {} {}", change.at.to_rfc3339(), change.replica, change.state);
                }
                Ok(())
            }
            Self::Set {
                filename,
                replica,
                state,
            } => {
                let replica = ReplicaId::new(replica);
                if config.replica_set()?.get(&replica).is_none() {
                    tracing::warn!(%replica, "replica is not configured");
                }
                let updated = states.set_state(&filename, &replica, state)?;
                info!(filename, %replica, state = %updated.state, "state set");
                Ok(())
            }
            Self::Files { replica } => {
                for filename in states.files_at(&ReplicaId::new(replica))? {
                    println!("{filename}");
                }
                Ok(())
            }
        }
    }
}
