// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Replicas served from local directories, addressed by `file://` endpoints.
//!
//! A bit-storage replica is a flat directory of container files. A
//! checksum-only replica is a directory holding a single ledger,
//! [`CHECKSUM_LEDGER`], with one `filename##md5` line per tracked file.

use std::{
    collections::BTreeMap,
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use md5::{Digest as _, Md5};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncSeekExt as _};
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{ByteStream, ReplicaTransport, TransportError};
use crate::batch::{FileOutcome, FileResult, JobDescriptor, JobKind, ReplicaReply};
use crate::replica::{Replica, ReplicaKind};

pub const CHECKSUM_LEDGER: &str = "checksums.txt";
const LEDGER_SEPARATOR: &str = "##";
const TMP_SUFFIX: &str = ".tmp";

/// Lower-case hex MD5 of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(&Md5::digest(data)[..])
}

async fn md5_hex_of(mut reader: impl AsyncRead + Unpin) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf = vec![0; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(&hasher.finalize()[..]))
}

/// A plain file name that also fits in a ledger line.
fn is_valid_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains(['/', '\\', '\n', '\r'])
        && !filename.contains(LEDGER_SEPARATOR)
        && filename != "."
        && filename != ".."
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTransport;

impl LocalTransport {
    async fn root(replica: &Replica) -> Result<PathBuf, TransportError> {
        if replica.endpoint.scheme() != "file" {
            return Err(TransportError::UnsupportedEndpoint(replica.endpoint.clone()));
        }
        let root = replica
            .endpoint
            .to_file_path()
            .map_err(|()| TransportError::UnsupportedEndpoint(replica.endpoint.clone()))?;
        match tokio::fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => Ok(root),
            Ok(_) => Err(TransportError::Unreachable {
                replica: replica.id.clone(),
                reason: format!("{} is not a directory", root.display()),
            }),
            Err(e) => Err(TransportError::Unreachable {
                replica: replica.id.clone(),
                reason: format!("{}: {e}", root.display()),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ReplicaTransport for LocalTransport {
    async fn send(
        &self,
        replica: &Replica,
        job: &JobDescriptor,
    ) -> Result<ReplicaReply, TransportError> {
        let root = Self::root(replica).await?;
        debug!(job = %job.job_id, replica = %replica.id, kind = %job.kind.tag(), "executing job");
        let entries = match replica.kind {
            ReplicaKind::BitStorage => BitStorage { root: &root }.execute(&job.kind).await,
            ReplicaKind::ChecksumOnly => ChecksumLedger { root: &root }.execute(&job.kind).await,
        };
        entries
            .map(|entries| ReplicaReply { entries })
            .map_err(|source| TransportError::Io {
                replica: replica.id.clone(),
                source,
            })
    }

    async fn read_range(
        &self,
        replica: &Replica,
        filename: &str,
        offset: u64,
        length: u64,
    ) -> Result<ByteStream, TransportError> {
        if !replica.can_serve_reads() {
            return Err(TransportError::Unsupported {
                replica: replica.id.clone(),
                operation: "range reads",
            });
        }
        let root = Self::root(replica).await?;
        let not_found = || TransportError::NotFound {
            replica: replica.id.clone(),
            filename: filename.to_owned(),
        };
        let io_error = |source| TransportError::Io {
            replica: replica.id.clone(),
            source,
        };
        if !is_valid_filename(filename) {
            return Err(not_found());
        }
        let mut file = match tokio::fs::File::open(root.join(filename)).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(io_error(e)),
        };
        let size = file.metadata().await.map_err(io_error)?.len();
        if offset.checked_add(length).is_none_or(|end| end > size) {
            return Err(TransportError::OutOfRange {
                replica: replica.id.clone(),
                filename: filename.to_owned(),
                offset,
                length,
                size,
            });
        }
        file.seek(SeekFrom::Start(offset)).await.map_err(io_error)?;
        Ok(Box::pin(ReaderStream::new(file.take(length))))
    }
}

struct BitStorage<'a> {
    root: &'a Path,
}

impl BitStorage<'_> {
    async fn execute(&self, kind: &JobKind) -> io::Result<Vec<FileResult>> {
        Ok(match kind {
            JobKind::ListFiles { filter } => self
                .list()
                .await?
                .into_iter()
                .filter(|f| filter.matches(f))
                .map(|f| FileResult::new(f, FileOutcome::success()))
                .collect(),
            JobKind::Checksum { filter, .. } => {
                let mut entries = vec![];
                for filename in self.list().await?.into_iter().filter(|f| filter.matches(f)) {
                    let outcome = match self.checksum(&filename).await {
                        Ok(md5) => FileOutcome::with_payload(md5),
                        Err(e) => FileOutcome::failure(e.to_string()),
                    };
                    entries.push(FileResult::new(filename, outcome));
                }
                entries
            }
            JobKind::Correct {
                filename,
                data,
                checksum,
            } => vec![FileResult::new(
                filename.as_str(),
                self.correct(filename, data, checksum).await,
            )],
            JobKind::Remove { filename, checksum } => vec![FileResult::new(
                filename.as_str(),
                self.remove(filename, checksum).await,
            )],
        })
    }

    async fn list(&self) -> io::Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(self.root).await?;
        let mut files = vec![];
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                if !name.ends_with(TMP_SUFFIX) && name != CHECKSUM_LEDGER {
                    files.push(name);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    async fn checksum(&self, filename: &str) -> io::Result<String> {
        md5_hex_of(tokio::fs::File::open(self.root.join(filename)).await?).await
    }

    async fn correct(&self, filename: &str, data: &[u8], checksum: &str) -> FileOutcome {
        if !is_valid_filename(filename) {
            return FileOutcome::failure("invalid filename");
        }
        let actual = md5_hex(data);
        if !actual.eq_ignore_ascii_case(checksum) {
            return FileOutcome::failure(format!(
                "supplied data has checksum {actual}, expected {checksum}"
            ));
        }
        let tmp = self.root.join(format!("{filename}{TMP_SUFFIX}"));
        let written = async {
            tokio::fs::write(&tmp, data).await?;
            tokio::fs::rename(&tmp, self.root.join(filename)).await
        }
        .await;
        match written {
            Ok(()) => FileOutcome::with_payload(actual),
            Err(e) => {
                let _ = tokio::fs::remove_file(&tmp).await;
                FileOutcome::failure(e.to_string())
            }
        }
    }

    async fn remove(&self, filename: &str, checksum: &str) -> FileOutcome {
        if !is_valid_filename(filename) {
            return FileOutcome::failure("invalid filename");
        }
        let actual = match self.checksum(filename).await {
            Ok(actual) => actual,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return FileOutcome::failure("no such file");
            }
            Err(e) => return FileOutcome::failure(e.to_string()),
        };
        if !actual.eq_ignore_ascii_case(checksum) {
            return FileOutcome::failure(format!(
                "copy has checksum {actual}, expected {checksum}"
            ));
        }
        match tokio::fs::remove_file(self.root.join(filename)).await {
            Ok(()) => FileOutcome::success(),
            Err(e) => FileOutcome::failure(e.to_string()),
        }
    }
}

struct ChecksumLedger<'a> {
    root: &'a Path,
}

impl ChecksumLedger<'_> {
    async fn execute(&self, kind: &JobKind) -> io::Result<Vec<FileResult>> {
        let mut ledger = self.read().await?;
        Ok(match kind {
            JobKind::ListFiles { filter } => ledger
                .into_keys()
                .filter(|f| filter.matches(f))
                .map(|f| FileResult::new(f, FileOutcome::success()))
                .collect(),
            JobKind::Checksum { filter, .. } => ledger
                .into_iter()
                .filter(|(f, _)| filter.matches(f))
                .map(|(f, md5)| FileResult::new(f, FileOutcome::with_payload(md5)))
                .collect(),
            JobKind::Correct {
                filename,
                data,
                checksum,
            } => {
                let actual = md5_hex(data);
                let outcome = if !is_valid_filename(filename) {
                    FileOutcome::failure("invalid filename")
                } else if !actual.eq_ignore_ascii_case(checksum) {
                    FileOutcome::failure(format!(
                        "supplied data has checksum {actual}, expected {checksum}"
                    ))
                } else {
                    ledger.insert(filename.clone(), actual.clone());
                    self.write(&ledger).await?;
                    FileOutcome::with_payload(actual)
                };
                vec![FileResult::new(filename.as_str(), outcome)]
            }
            JobKind::Remove { filename, checksum } => {
                let outcome = match ledger.get(filename) {
                    None => FileOutcome::failure("no such file"),
                    Some(actual) if !actual.eq_ignore_ascii_case(checksum) => {
                        FileOutcome::failure(format!(
                            "copy has checksum {actual}, expected {checksum}"
                        ))
                    }
                    Some(_) => {
                        ledger.remove(filename);
                        self.write(&ledger).await?;
                        FileOutcome::success()
                    }
                };
                vec![FileResult::new(filename.as_str(), outcome)]
            }
        })
    }

    async fn read(&self) -> io::Result<BTreeMap<String, String>> {
        let content = match tokio::fs::read_to_string(self.root.join(CHECKSUM_LEDGER)).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e),
        };
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split_once(LEDGER_SEPARATOR)
                    .map(|(f, md5)| (f.to_owned(), md5.trim().to_owned()))
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("malformed checksum ledger line: {line}"),
                        )
                    })
            })
            .collect()
    }

    async fn write(&self, ledger: &BTreeMap<String, String>) -> io::Result<()> {
        let content: String = ledger
            .iter()
            .map(|(f, md5)| format!("{f}{LEDGER_SEPARATOR}{md5}\n"))
            .collect();
        let tmp = self.root.join(format!("{CHECKSUM_LEDGER}{TMP_SUFFIX}"));
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, self.root.join(CHECKSUM_LEDGER)).await
    }
}
