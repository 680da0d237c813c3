// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Turns an archive record into the fields of an index line.

use std::io::{self, BufRead, BufReader, Cursor, Read};

use data_encoding::BASE32;
use sha2::{Digest as _, Sha256};

use super::archive::{ArchiveRecord, ContainerFormat, RecordFilter};
use super::timestamp::CaptureTimestamp;

const MAX_HTTP_HEADER_BYTES: u64 = 64 * 1024;
const HTTP_PREFIX: &[u8] = b"HTTP/";

/// What an accepted record contributes to its index line, before URL
/// canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub url: String,
    pub timestamp: CaptureTimestamp,
    pub mime_type: Option<String>,
    pub status: Option<u16>,
    pub digest: String,
    pub redirect: Option<String>,
    pub offset: u64,
    pub length: u64,
}

/// A record that could not be indexed. Never fatal for the file.
#[derive(Debug, thiserror::Error)]
pub enum AdaptError {
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
    #[error("invalid date '{0}'")]
    InvalidDate(String),
    #[error("invalid HTTP status line '{0}'")]
    InvalidStatusLine(String),
    #[error("HTTP header block exceeds {MAX_HTTP_HEADER_BYTES} bytes")]
    HeaderTooLarge,
    #[error("unreadable payload")]
    Payload(#[from] io::Error),
}

/// Adapts a record, or returns `Ok(None)` when `filter` rejects it.
pub fn adapt(record: ArchiveRecord, filter: RecordFilter) -> Result<Option<Capture>, AdaptError> {
    if !filter.accepts(&record) {
        return Ok(None);
    }
    let ArchiveRecord {
        format,
        header,
        payload,
        ..
    } = record;

    let url = header.url.trim();
    if url.is_empty() || url.contains(char::is_whitespace) {
        return Err(AdaptError::InvalidUrl(header.url.clone()));
    }
    let timestamp = match format {
        ContainerFormat::Arc => header.date.trim().parse(),
        ContainerFormat::Warc => CaptureTimestamp::from_warc_date(&header.date),
    }
    .map_err(|_| AdaptError::InvalidDate(header.date.clone()))?;

    let mut payload = BufReader::new(payload);
    let preamble = if is_http_url(url) {
        read_preamble(&mut payload)?
    } else {
        Preamble::Body(vec![])
    };
    let (http, body_start) = match preamble {
        Preamble::Http(http) => (Some(http), vec![]),
        Preamble::Body(prefix) => (None, prefix),
    };

    let digest = match header.digest.as_deref().map(str::trim) {
        Some(digest)
            if !digest.is_empty() && digest != "-" && !digest.contains(char::is_whitespace) =>
        {
            digest.to_owned()
        }
        _ => sha256_digest(Cursor::new(body_start).chain(payload))?,
    };

    let (status, mime_type, redirect) = match http {
        Some(http) => {
            let redirect = (300..400)
                .contains(&http.status)
                .then_some(http.location)
                .flatten();
            (Some(http.status), http.content_type, redirect)
        }
        None => (header.status, header.mime_type, None),
    };

    Ok(Some(Capture {
        url: url.to_owned(),
        timestamp,
        mime_type: mime_type.as_deref().and_then(normalize_mime),
        status,
        digest,
        redirect: redirect.as_deref().and_then(normalize_redirect),
        offset: header.offset,
        length: header.length,
    }))
}

fn is_http_url(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

struct HttpHeader {
    status: u16,
    content_type: Option<String>,
    location: Option<String>,
}

enum Preamble {
    Http(HttpHeader),
    /// No HTTP header; the bytes peeked at are the start of the body.
    Body(Vec<u8>),
}

/// Reads the HTTP response header block if the payload starts with one,
/// leaving the payload positioned at the start of the body.
fn read_preamble(payload: &mut impl BufRead) -> Result<Preamble, AdaptError> {
    let mut prefix = Vec::with_capacity(HTTP_PREFIX.len());
    payload
        .by_ref()
        .take(HTTP_PREFIX.len() as u64)
        .read_to_end(&mut prefix)?;
    if prefix != HTTP_PREFIX {
        return Ok(Preamble::Body(prefix));
    }

    let mut block = Cursor::new(prefix).chain(payload.by_ref().take(MAX_HTTP_HEADER_BYTES));
    let mut lines = vec![];
    let mut total = 0_u64;
    loop {
        let mut line = Vec::new();
        let n = block.read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        total += n as u64;
        if total > MAX_HTTP_HEADER_BYTES {
            return Err(AdaptError::HeaderTooLarge);
        }
        let line = String::from_utf8_lossy(&line).trim_end().to_owned();
        if line.is_empty() {
            break;
        }
        lines.push(line);
    }

    let status_line = lines.first().cloned().unwrap_or_default();
    let status = status_line
        .split_ascii_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (100..1000).contains(code))
        .ok_or(AdaptError::InvalidStatusLine(status_line))?;

    let header = |name: &str| {
        lines.iter().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_owned())
        })
    };
    Ok(Preamble::Http(HttpHeader {
        status,
        content_type: header("content-type"),
        location: header("location"),
    }))
}

/// `sha256:` followed by the Base32 SHA-256 of everything left in `body`.
fn sha256_digest(mut body: impl Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0; 64 * 1024];
    loop {
        let n = body.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{}", BASE32.encode(&hasher.finalize()[..])))
}

/// Media type without parameters, lower-cased.
fn normalize_mime(mime: &str) -> Option<String> {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    if essence.is_empty() || essence == "-" || essence.contains(char::is_whitespace) {
        return None;
    }
    Some(essence.to_ascii_lowercase())
}

fn normalize_redirect(location: &str) -> Option<String> {
    let location = location.trim();
    (!location.is_empty() && location != "-").then(|| location.replace(char::is_whitespace, "%20"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdx::archive::{RecordHeader, RecordKind};

    fn warc_response(url: &str, payload: &'static [u8]) -> ArchiveRecord {
        ArchiveRecord {
            format: ContainerFormat::Warc,
            kind: RecordKind::Response,
            header: RecordHeader {
                url: url.into(),
                date: "2009-01-02T03:04:05Z".into(),
                offset: 10,
                length: 20,
                ..Default::default()
            },
            payload: Box::new(payload),
        }
    }

    fn adapt_default(record: ArchiveRecord) -> Result<Option<Capture>, AdaptError> {
        adapt(record, RecordFilter::default())
    }

    #[test]
    fn http_response_fields_come_from_the_header_block() {
        let capture = adapt_default(warc_response(
            "http://example.org/a",
            b"HTTP/1.1 200 OK\r\nContent-Type: Text/HTML; charset=utf-8\r\n\r\n<html/>",
        ))
        .unwrap()
        .unwrap();
        assert_eq!(capture.status, Some(200));
        assert_eq!(capture.mime_type.as_deref(), Some("text/html"));
        assert_eq!(capture.timestamp.as_str(), "20090102030405");
        assert_eq!(capture.redirect, None);
        assert_eq!(capture.digest, sha256_digest(&b"<html/>"[..]).unwrap());
        assert_eq!((capture.offset, capture.length), (10, 20));
    }

    #[test]
    fn redirect_is_taken_from_location() {
        let capture = adapt_default(warc_response(
            "http://example.org/old",
            b"HTTP/1.0 301 Moved\nLocation: http://example.org/new page\n\n",
        ))
        .unwrap()
        .unwrap();
        assert_eq!(capture.status, Some(301));
        assert_eq!(capture.mime_type, None);
        assert_eq!(
            capture.redirect.as_deref(),
            Some("http://example.org/new%20page")
        );
    }

    #[test]
    fn declared_digest_is_kept() {
        let mut record = warc_response("http://example.org/", b"HTTP/1.1 204 No Content\r\n\r\n");
        record.header.digest = Some("sha1:ABCDEF".into());
        let capture = adapt_default(record).unwrap().unwrap();
        assert_eq!(capture.digest, "sha1:ABCDEF");
    }

    #[test]
    fn placeholder_digest_is_recomputed() {
        for declared in ["-", " - ", "", "sha1: AB"] {
            let mut record = warc_response("http://example.org/", b"HTTP/1.1 200 OK\r\n\r\nbody");
            record.header.digest = Some(declared.into());
            let capture = adapt_default(record).unwrap().unwrap();
            assert_eq!(capture.digest, sha256_digest(&b"body"[..]).unwrap(), "{declared:?}");
        }
    }

    #[test]
    fn non_http_payload_is_hashed_whole() {
        let mut record = warc_response("ftp://example.org/file", b"HTTP");
        record.header.mime_type = Some("application/octet-stream".into());
        let capture = adapt_default(record).unwrap().unwrap();
        assert_eq!(capture.status, None);
        assert_eq!(capture.digest, sha256_digest(&b"HTTP"[..]).unwrap());

        let capture = adapt_default(warc_response("http://example.org/raw", b"raw bytes"))
            .unwrap()
            .unwrap();
        assert_eq!(capture.status, None);
        assert_eq!(capture.digest, sha256_digest(&b"raw bytes"[..]).unwrap());
    }

    #[test]
    fn zero_length_record_is_indexed() {
        let mut record = warc_response("dns:example.org", b"");
        record.header.length = 0;
        let capture = adapt(record, RecordFilter::accept_all()).unwrap().unwrap();
        assert_eq!(capture.length, 0);
        assert_eq!(capture.digest, sha256_digest(&b""[..]).unwrap());
    }

    #[test]
    fn malformed_records_are_errors() {
        assert!(matches!(
            adapt_default(warc_response("http://example.org/a b", b"")),
            Err(AdaptError::InvalidUrl(_))
        ));
        assert!(matches!(
            adapt_default(warc_response("http://example.org/", b"HTTP/1.1 OK\r\n\r\n")),
            Err(AdaptError::InvalidStatusLine(_))
        ));
        let mut record = warc_response("http://example.org/", b"");
        record.header.date = "20090102030405".into();
        assert!(matches!(
            adapt_default(record),
            Err(AdaptError::InvalidDate(_))
        ));
    }

    #[test]
    fn filtered_records_are_skipped() {
        let mut record = warc_response("http://example.org/", b"");
        record.kind = RecordKind::Request;
        assert!(adapt_default(record).unwrap().is_none());

        let mut record = warc_response("filedesc://IA-001102.arc", b"");
        record.format = ContainerFormat::Arc;
        record.header.date = "20011102000000".into();
        assert!(adapt_default(record).unwrap().is_none());
    }
}
