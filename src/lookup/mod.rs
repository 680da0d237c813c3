// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Resolving a URI to the location of one of its captures.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use crate::cdx::{CaptureTimestamp, CdxReadError, CdxRecord, UrlCanonicalizer, read_cdx};

/// An index line viewed as a lookup result.
pub type IndexEntry = CdxRecord;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("no capture of '{uri}'{}", .at.as_ref().map(|at| format!(" at or before {at}")).unwrap_or_default())]
    NotFound {
        uri: String,
        at: Option<CaptureTimestamp>,
    },
    #[error("cannot load index {}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: CdxReadError,
    },
}

/// In-memory view of one or more CDX indexes, grouped by canonical URL.
///
/// Queries are canonicalized with the same canonicalizer the index was built
/// with; a different one makes equivalent URLs miss.
pub struct IndexLookup {
    canonicalizer: Arc<dyn UrlCanonicalizer>,
    /// Captures of each URL, sorted by timestamp, then filename and offset.
    entries: BTreeMap<String, Vec<IndexEntry>>,
}

impl IndexLookup {
    pub fn new(canonicalizer: Arc<dyn UrlCanonicalizer>) -> Self {
        Self {
            canonicalizer,
            entries: BTreeMap::new(),
        }
    }

    pub fn from_records(
        canonicalizer: Arc<dyn UrlCanonicalizer>,
        records: impl IntoIterator<Item = CdxRecord>,
    ) -> Self {
        let mut lookup = Self::new(canonicalizer);
        lookup.extend(records);
        lookup
    }

    /// Loads a CDX file.
    pub fn load(path: &Path, canonicalizer: Arc<dyn UrlCanonicalizer>) -> Result<Self, LookupError> {
        let load_error = |source: CdxReadError| LookupError::Load {
            path: path.to_owned(),
            source,
        };
        let file = File::open(path).map_err(|e| load_error(e.into()))?;
        let records = read_cdx(BufReader::new(file)).map_err(load_error)?;
        debug!(path = %path.display(), records = records.len(), "loaded index");
        Ok(Self::from_records(canonicalizer, records))
    }

    /// Adds index lines. Their urls must already be canonical.
    pub fn extend(&mut self, records: impl IntoIterator<Item = CdxRecord>) {
        for record in records {
            let captures = self.entries.entry(record.url.clone()).or_default();
            let key = |e: &IndexEntry| (e.timestamp.clone(), e.filename.clone(), e.offset);
            let at = captures.partition_point(|e| key(e) <= key(&record));
            captures.insert(at, record);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every capture of `uri`, oldest first.
    pub fn captures(&self, uri: &str) -> &[IndexEntry] {
        self.entries
            .get(&self.canonicalizer.canonicalize(uri))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The most recent capture of `uri`.
    pub fn resolve(&self, uri: &str) -> Result<&IndexEntry, LookupError> {
        self.captures(uri)
            .last()
            .ok_or_else(|| LookupError::NotFound {
                uri: uri.to_owned(),
                at: None,
            })
    }

    /// The latest capture of `uri` taken at or before `at`.
    pub fn resolve_at(&self, uri: &str, at: &CaptureTimestamp) -> Result<&IndexEntry, LookupError> {
        let captures = self.captures(uri);
        let before = captures.partition_point(|e| e.timestamp <= *at);
        before
            .checked_sub(1)
            .map(|i| &captures[i])
            .ok_or_else(|| LookupError::NotFound {
                uri: uri.to_owned(),
                at: Some(at.clone()),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdx::{IdentityCanonicalizer, NormalizingCanonicalizer};
    use std::io::Write as _;

    fn line(url: &str, ts: &str, offset: u64) -> CdxRecord {
        format!("{url} {ts} text/html 200 - - f.warc {offset} 10")
            .parse()
            .unwrap()
    }

    fn ts(s: &str) -> CaptureTimestamp {
        s.parse().unwrap()
    }

    fn lookup() -> IndexLookup {
        IndexLookup::from_records(
            Arc::new(IdentityCanonicalizer),
            [
                line("http://example.org/a", "20240301120000", 20),
                line("http://example.org/b", "20220101000000", 15),
                line("http://example.org/a", "20210615080000", 10),
            ],
        )
    }

    #[test]
    fn resolve_picks_latest_capture() {
        let lookup = lookup();
        assert_eq!(lookup.len(), 3);
        assert_eq!(lookup.resolve("http://example.org/a").unwrap().offset, 20);
    }

    #[test]
    fn resolve_at_picks_floor_capture() {
        let lookup = lookup();
        let uri = "http://example.org/a";
        assert_eq!(lookup.resolve_at(uri, &ts("20210615080000")).unwrap().offset, 10);
        assert_eq!(lookup.resolve_at(uri, &ts("20240301115959")).unwrap().offset, 10);
        assert_eq!(lookup.resolve_at(uri, &ts("20240301120000")).unwrap().offset, 20);
        assert_eq!(lookup.resolve_at(uri, &ts("20991231235959")).unwrap().offset, 20);
        assert!(matches!(
            lookup.resolve_at(uri, &ts("20210615075959")),
            Err(LookupError::NotFound { at: Some(_), .. })
        ));
    }

    #[test]
    fn resolve_at_accepts_timestamp_prefixes() {
        let lookup = lookup();
        let uri = "http://example.org/a";
        assert_eq!(lookup.resolve_at(uri, &ts("2025")).unwrap().offset, 20);
        assert_eq!(lookup.resolve_at(uri, &ts("20250101")).unwrap().offset, 20);
        assert_eq!(lookup.resolve_at(uri, &ts("2023")).unwrap().offset, 10);
        assert_eq!(lookup.resolve_at(uri, &ts("20240301")).unwrap().offset, 10);
        assert_eq!(lookup.resolve_at(uri, &ts("2024030112")).unwrap().offset, 20);
        assert!(lookup.resolve_at(uri, &ts("2021")).is_err());

        let single = IndexLookup::from_records(
            Arc::new(IdentityCanonicalizer),
            [line(uri, "20240301120000", 7)],
        );
        assert_eq!(single.resolve_at(uri, &ts("2025")).unwrap().offset, 7);
        assert!(single.resolve_at(uri, &ts("2023")).is_err());
    }

    #[test]
    fn unknown_uri_is_not_found() {
        let err = lookup().resolve("http://example.org/c").unwrap_err();
        assert!(matches!(err, LookupError::NotFound { ref uri, at: None } if uri == "http://example.org/c"));
        assert!(err.to_string().contains("http://example.org/c"));
    }

    #[test]
    fn query_is_canonicalized_like_the_index() {
        let identity = lookup();
        assert!(identity.resolve("http://EXAMPLE.org/a").is_err());

        let normalizing = IndexLookup::from_records(
            Arc::new(NormalizingCanonicalizer),
            [line("http://example.org/a", "20210615080000", 10)],
        );
        assert!(normalizing.resolve("HTTP://EXAMPLE.org:80/a#frag").is_ok());
    }

    #[test]
    fn load_reads_cdx_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, " CDX N b m s k r g V S").unwrap();
        writeln!(file, "{}", line("http://example.org/a", "20210615080000", 10)).unwrap();
        let lookup = IndexLookup::load(file.path(), Arc::new(IdentityCanonicalizer)).unwrap();
        assert_eq!(lookup.resolve("http://example.org/a").unwrap().offset, 10);

        let missing = IndexLookup::load(Path::new("/nonexistent/x.cdx"), Arc::new(IdentityCanonicalizer));
        assert!(matches!(missing, Err(LookupError::Load { .. })));
    }
}
