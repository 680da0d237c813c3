// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{
    io::{self, Write},
    sync::Arc,
};

use tracing::{debug, info};

use super::adapt::{Capture, adapt};
use super::archive::{ArchiveRecord, RecordFilter};
use super::canonicalize::{IdentityCanonicalizer, UrlCanonicalizer};
use super::record::CdxRecord;

/// Counts for one indexed container file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingReport {
    /// Index lines emitted.
    pub emitted: u64,
    /// Records rejected by the record filter.
    pub skipped: u64,
    /// Records that could not be adapted.
    pub failed: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("'{filename}' cannot be written to an index line")]
    InvalidFilename { filename: String },
    #[error("reading records of '{filename}' failed")]
    Source {
        filename: String,
        #[source]
        source: io::Error,
    },
    #[error("writing index lines for '{filename}' failed")]
    Output {
        filename: String,
        #[source]
        source: io::Error,
    },
}

/// Streams the records of a container file into index lines, in file order.
///
/// Memory use does not depend on the size of the container: each record is
/// adapted and emitted before the next one is read. Output is not sorted; see
/// [`super::sort_cdx`].
#[derive(Clone)]
pub struct CdxIndexer {
    canonicalizer: Arc<dyn UrlCanonicalizer>,
    filter: RecordFilter,
}

impl Default for CdxIndexer {
    fn default() -> Self {
        Self::new(Arc::new(IdentityCanonicalizer))
    }
}

impl CdxIndexer {
    pub fn new(canonicalizer: Arc<dyn UrlCanonicalizer>) -> Self {
        Self {
            canonicalizer,
            filter: RecordFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: RecordFilter) -> Self {
        self.filter = filter;
        self
    }

    /// The canonicalizer lookups against this index must use.
    pub fn canonicalizer(&self) -> Arc<dyn UrlCanonicalizer> {
        self.canonicalizer.clone()
    }

    /// Feeds the index line of every accepted record to `emit`.
    ///
    /// `filename` goes into the filename field verbatim and must be non-empty
    /// without whitespace.
    pub fn index_with<I, F>(
        &self,
        filename: &str,
        records: I,
        mut emit: F,
    ) -> Result<IndexingReport, IndexError>
    where
        I: IntoIterator<Item = io::Result<ArchiveRecord>>,
        F: FnMut(CdxRecord) -> io::Result<()>,
    {
        if filename.is_empty() || filename.contains(char::is_whitespace) {
            return Err(IndexError::InvalidFilename {
                filename: filename.to_owned(),
            });
        }
        let mut report = IndexingReport::default();
        for record in records {
            let record = record.map_err(|source| IndexError::Source {
                filename: filename.to_owned(),
                source,
            })?;
            let offset = record.header.offset;
            match adapt(record, self.filter) {
                Ok(Some(capture)) => {
                    emit(self.to_cdx(filename, capture)).map_err(|source| {
                        IndexError::Output {
                            filename: filename.to_owned(),
                            source,
                        }
                    })?;
                    report.emitted += 1;
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    debug!(filename, offset, "skipping record: {e}");
                    report.failed += 1;
                }
            }
        }
        info!(
            filename,
            emitted = report.emitted,
            skipped = report.skipped,
            failed = report.failed,
            "indexed container file"
        );
        Ok(report)
    }

    /// Collects the index lines of a container file in memory.
    pub fn index<I>(
        &self,
        filename: &str,
        records: I,
    ) -> Result<(Vec<CdxRecord>, IndexingReport), IndexError>
    where
        I: IntoIterator<Item = io::Result<ArchiveRecord>>,
    {
        let mut lines = vec![];
        let report = self.index_with(filename, records, |line| {
            lines.push(line);
            Ok(())
        })?;
        Ok((lines, report))
    }

    /// Writes the index lines of a container file, one per line.
    pub fn index_to_writer<I>(
        &self,
        filename: &str,
        records: I,
        mut writer: impl Write,
    ) -> Result<IndexingReport, IndexError>
    where
        I: IntoIterator<Item = io::Result<ArchiveRecord>>,
    {
        let report = self.index_with(filename, records, |line| writeln!(writer, "{line}"))?;
        writer.flush().map_err(|source| IndexError::Output {
            filename: filename.to_owned(),
            source,
        })?;
        Ok(report)
    }

    fn to_cdx(&self, filename: &str, capture: Capture) -> CdxRecord {
        CdxRecord {
            url: self.canonicalizer.canonicalize(&capture.url),
            timestamp: capture.timestamp,
            mime_type: capture.mime_type,
            status: capture.status,
            digest: Some(capture.digest),
            redirect: capture.redirect,
            filename: filename.to_owned(),
            offset: capture.offset,
            length: capture.length,
        }
    }
}
