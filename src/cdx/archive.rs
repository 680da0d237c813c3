// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Records as produced by a container reader.
//!
//! Parsing container files into records happens elsewhere. The indexer only
//! needs a forward-only sequence of [`ArchiveRecord`]s in file order.

use std::{fmt, io::Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ContainerFormat {
    Arc,
    Warc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RecordKind {
    Response,
    Request,
    /// WARC `metadata` records and ARC `filedesc://` headers.
    #[strum(to_string = "metadata", serialize = "filedesc")]
    Metadata,
    Resource,
    Revisit,
    Warcinfo,
    Conversion,
    Continuation,
    /// DNS resolution captures.
    Dns,
}

/// Header fields of a record, as found in the container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordHeader {
    pub url: String,
    /// `yyyyMMddHHmmss` for ARC, RFC 3339 `WARC-Date` for WARC.
    pub date: String,
    pub mime_type: Option<String>,
    pub status: Option<u16>,
    /// Payload digest declared by the container, if any.
    pub digest: Option<String>,
    /// Position of the record inside its container file.
    pub offset: u64,
    /// Length of the whole record, headers included.
    pub length: u64,
}

pub struct ArchiveRecord {
    pub format: ContainerFormat,
    pub kind: RecordKind,
    pub header: RecordHeader,
    /// The record body, for response records starting with the HTTP headers.
    pub payload: Box<dyn Read + Send>,
}

impl fmt::Debug for ArchiveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveRecord")
            .field("format", &self.format)
            .field("kind", &self.kind)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// Which records become index lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordFilter {
    /// Keep only captures that can be played back: WARC `response` records,
    /// and every ARC record except file headers and DNS lookups.
    #[default]
    ExcludeNonResponse,
    AcceptAll,
}

impl RecordFilter {
    pub fn exclude_non_response() -> Self {
        RecordFilter::ExcludeNonResponse
    }

    pub fn accept_all() -> Self {
        RecordFilter::AcceptAll
    }

    pub fn accepts(self, record: &ArchiveRecord) -> bool {
        match (self, record.format) {
            (RecordFilter::AcceptAll, _) => true,
            (RecordFilter::ExcludeNonResponse, ContainerFormat::Warc) => {
                record.kind == RecordKind::Response
            }
            (RecordFilter::ExcludeNonResponse, ContainerFormat::Arc) => {
                let skipped_kind = matches!(
                    record.kind,
                    RecordKind::Metadata | RecordKind::Dns | RecordKind::Request | RecordKind::Warcinfo
                );
                let url = record.header.url.trim_start();
                let skipped_url = ARC_SKIPPED_URL_PREFIXES
                    .iter()
                    .any(|prefix| starts_with_ignore_case(url, prefix));
                !skipped_kind && !skipped_url
            }
        }
    }
}

/// ARC file headers and DNS lookups, recognized by URL whatever the record
/// kind the reader assigned.
const ARC_SKIPPED_URL_PREFIXES: [&str; 2] = ["filedesc:", "dns:"];

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(format: ContainerFormat, kind: RecordKind, url: &str) -> ArchiveRecord {
        ArchiveRecord {
            format,
            kind,
            header: RecordHeader {
                url: url.into(),
                ..Default::default()
            },
            payload: Box::new(std::io::empty()),
        }
    }

    #[test]
    fn default_filter_keeps_responses_only() {
        let filter = RecordFilter::default();
        let url = "http://example.org/";
        assert!(filter.accepts(&record(ContainerFormat::Warc, RecordKind::Response, url)));
        for kind in [
            RecordKind::Request,
            RecordKind::Metadata,
            RecordKind::Dns,
            RecordKind::Revisit,
            RecordKind::Warcinfo,
        ] {
            assert!(!filter.accepts(&record(ContainerFormat::Warc, kind, url)), "{kind}");
        }
        assert!(filter.accepts(&record(ContainerFormat::Arc, RecordKind::Response, url)));
        assert!(!filter.accepts(&record(ContainerFormat::Arc, RecordKind::Dns, url)));
        assert!(!filter.accepts(&record(ContainerFormat::Arc, RecordKind::Metadata, url)));
        assert!(RecordFilter::accept_all().accepts(&record(ContainerFormat::Warc, RecordKind::Dns, url)));
    }

    #[test]
    fn arc_headers_and_dns_are_skipped_by_url() {
        let filter = RecordFilter::default();
        for url in [
            "filedesc://IA-001102.arc",
            "dns:www.example.org",
            "DNS:www.example.org",
        ] {
            assert!(!filter.accepts(&record(ContainerFormat::Arc, RecordKind::Response, url)), "{url}");
            assert!(RecordFilter::accept_all().accepts(&record(ContainerFormat::Arc, RecordKind::Response, url)));
        }
        assert!(filter.accepts(&record(ContainerFormat::Arc, RecordKind::Response, "http://dns.example.org/")));
        // WARC records are typed, their URL is not consulted.
        assert!(filter.accepts(&record(ContainerFormat::Warc, RecordKind::Response, "dns:www.example.org")));
    }

    #[test]
    fn record_kind_parses_warc_types() {
        assert_eq!("response".parse::<RecordKind>().unwrap(), RecordKind::Response);
        assert_eq!("filedesc".parse::<RecordKind>().unwrap(), RecordKind::Metadata);
        assert_eq!("Metadata".parse::<RecordKind>().unwrap(), RecordKind::Metadata);
        assert!("bogus".parse::<RecordKind>().is_err());
    }
}
