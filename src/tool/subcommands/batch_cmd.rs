// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use bytes::Bytes;
use clap::{Args, Subcommand};
use itertools::Itertools as _;
use tracing::warn;

use super::{open_state_store, replica_set};
use crate::batch::{BatchJob, BatchJobCoordinator, FileFilter, JobKind, JobRequest, Targets};
use crate::cli_shared::cli::Config;
use crate::replica::ReplicaId;
use crate::transport::{LocalTransport, md5_hex};

/// Extra time given to a job past its own deadline before giving up on it.
const WAIT_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Only run on this replica. May be repeated; defaults to every replica
    #[arg(long = "replica")]
    replicas: Vec<String>,
}

impl TargetArgs {
    fn targets(&self) -> Targets {
        if self.replicas.is_empty() {
            Targets::All
        } else {
            Targets::Only(self.replicas.iter().map(|id| ReplicaId::new(id.as_str())).collect())
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum BatchCommands {
    /// List the files held by each replica
    List {
        /// Regular expression filenames must match
        #[arg(long)]
        filter: Option<String>,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Compute the MD5 checksum of each file at each replica
    Checksum {
        /// Regular expression filenames must match
        #[arg(long)]
        filter: Option<String>,
        /// File of known-good checksums, one `filename##md5` line per file.
        /// Mismatching copies are marked as failed
        #[arg(long)]
        expected: Option<PathBuf>,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Replace a replica's copy of a file with a known-good one
    Correct {
        /// Name of the container file at the replicas
        filename: String,
        /// Local file holding the good copy
        source: PathBuf,
        #[command(flatten)]
        targets: TargetArgs,
    },
    /// Remove a copy of a file, only where its checksum matches
    Remove {
        /// Name of the container file at the replicas
        filename: String,
        /// MD5 checksum the copy to remove must have
        #[arg(long)]
        checksum: String,
        #[command(flatten)]
        targets: TargetArgs,
    },
}

impl BatchCommands {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        let (kind, targets, verify) = match self {
            Self::List { filter, targets } => (
                JobKind::ListFiles {
                    filter: file_filter(filter.as_deref())?,
                },
                targets,
                false,
            ),
            Self::Checksum {
                filter,
                expected,
                targets,
            } => {
                let expected = expected
                    .map(|path| {
                        let content = std::fs::read_to_string(&path)
                            .with_context(|| format!("cannot read {}", path.display()))?;
                        parse_expected(&content)
                            .with_context(|| format!("invalid checksum file {}", path.display()))
                    })
                    .transpose()?;
                let verify = expected.is_some();
                (
                    JobKind::Checksum {
                        filter: file_filter(filter.as_deref())?,
                        expected,
                    },
                    targets,
                    verify,
                )
            }
            Self::Correct {
                filename,
                source,
                targets,
            } => {
                let data = tokio::fs::read(&source)
                    .await
                    .with_context(|| format!("cannot read {}", source.display()))?;
                let checksum = md5_hex(&data);
                (
                    JobKind::Correct {
                        filename,
                        data: Bytes::from(data),
                        checksum,
                    },
                    targets,
                    true,
                )
            }
            Self::Remove {
                filename,
                checksum,
                targets,
            } => (
                JobKind::Remove {
                    filename,
                    checksum: checksum.to_ascii_lowercase(),
                },
                targets,
                true,
            ),
        };

        let coordinator = BatchJobCoordinator::new(
            replica_set(&config)?,
            open_state_store(&config)?,
            Arc::new(LocalTransport),
            config.batch.clone(),
        );
        let job_id = coordinator.submit(JobRequest::new(kind).with_targets(targets.targets()))?;
        let job = coordinator
            .wait(job_id, config.batch.job_timeout + WAIT_GRACE)
            .await?;
        if !job.is_terminal() {
            warn!(job = %job_id, "job still running, reporting partial results");
        }
        print!("{}", render(&job));

        let failed = job.failed_files().collect_vec();
        if verify && !failed.is_empty() {
            anyhow::bail!("{} file(s) failed: {}", failed.len(), failed.join(", "));
        }
        Ok(())
    }
}

fn file_filter(pattern: Option<&str>) -> anyhow::Result<FileFilter> {
    Ok(match pattern {
        Some(pattern) => FileFilter::new(pattern)?,
        None => FileFilter::all(),
    })
}

/// Parses `filename##md5` lines. Whitespace-separated `filename md5` lines, as
/// written by `md5sum` in reverse order, are accepted as well.
fn parse_expected(content: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let mut expected = BTreeMap::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (filename, checksum) = line
            .split_once("##")
            .or_else(|| line.split_once(char::is_whitespace))
            .with_context(|| format!("line {}: expected 'filename##md5'", i + 1))?;
        let checksum = checksum.trim();
        anyhow::ensure!(
            checksum.len() == 32 && checksum.chars().all(|c| c.is_ascii_hexdigit()),
            "line {}: '{checksum}' is not an MD5 checksum",
            i + 1
        );
        expected.insert(filename.trim().to_owned(), checksum.to_ascii_lowercase());
    }
    Ok(expected)
}

fn render(job: &BatchJob) -> String {
    let mut out = format!("{} {}\n", job.id, job.kind);
    for (replica, progress) in &job.replicas {
        match &progress.error {
            Some(error) => out.push_str(&format!("  {replica}: {} ({error})\n", progress.status)),
            None => out.push_str(&format!("  {replica}: {}\n", progress.status)),
        }
    }
    for (filename, outcomes) in &job.results {
        out.push_str(&format!("{filename}\n"));
        for (replica, outcome) in outcomes {
            out.push_str(&format!("  {replica}: {outcome}\n"));
        }
    }
    out
}
