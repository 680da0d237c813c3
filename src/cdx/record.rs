// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{fmt, str::FromStr};

use super::timestamp::{CaptureTimestamp, InvalidTimestamp};

const ABSENT: &str = "-";
const FIELD_COUNT: usize = 9;

/// Legend line that may head a CDX file. Loaders skip it.
pub const CDX_LEGEND: &str = " CDX N b m s k r g V S";

/// One index line: where a single capture lives inside a container file.
///
/// Textual form, space separated:
/// `url timestamp mime status digest redirect filename offset length`,
/// with `-` for absent fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CdxRecord {
    /// Canonical form of the captured URL.
    pub url: String,
    pub timestamp: CaptureTimestamp,
    pub mime_type: Option<String>,
    /// HTTP status, absent for non-HTTP captures.
    pub status: Option<u16>,
    pub digest: Option<String>,
    pub redirect: Option<String>,
    pub filename: String,
    pub offset: u64,
    pub length: u64,
}

/// Byte range of a record inside a container file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordLocation {
    pub filename: String,
    pub offset: u64,
    pub length: u64,
}

impl fmt::Display for RecordLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}+{}", self.filename, self.offset, self.length)
    }
}

impl CdxRecord {
    /// Container files are compressed per record when named `*.gz`.
    pub fn is_compressed(&self) -> bool {
        self.filename.ends_with(".gz")
    }

    pub fn location(&self) -> RecordLocation {
        RecordLocation {
            filename: self.filename.clone(),
            offset: self.offset,
            length: self.length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CdxParseError {
    #[error("expected {FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),
    #[error(transparent)]
    Timestamp(#[from] InvalidTimestamp),
    #[error("invalid {field} '{value}'")]
    Number { field: &'static str, value: String },
}

fn optional(field: &str) -> Option<&str> {
    (field != ABSENT).then_some(field)
}

fn number<T: FromStr>(field: &'static str, value: &str) -> Result<T, CdxParseError> {
    value.parse().map_err(|_| CdxParseError::Number {
        field,
        value: value.to_owned(),
    })
}

impl FromStr for CdxRecord {
    type Err = CdxParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_ascii_whitespace().collect();
        let [url, timestamp, mime, status, digest, redirect, filename, offset, length] =
            fields[..]
        else {
            return Err(CdxParseError::FieldCount(fields.len()));
        };
        Ok(Self {
            url: url.to_owned(),
            timestamp: timestamp.parse()?,
            mime_type: optional(mime).map(str::to_owned),
            status: optional(status)
                .map(|s| number("status code", s))
                .transpose()?,
            digest: optional(digest).map(str::to_owned),
            redirect: optional(redirect).map(str::to_owned),
            filename: filename.to_owned(),
            offset: number("offset", offset)?,
            length: number("length", length)?,
        })
    }
}

impl fmt::Display for CdxRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.map(|s| s.to_string());
        write!(
            f,
            "{} {} {} {} {} {} {} {} {}",
            self.url,
            self.timestamp,
            self.mime_type.as_deref().unwrap_or(ABSENT),
            status.as_deref().unwrap_or(ABSENT),
            self.digest.as_deref().unwrap_or(ABSENT),
            self.redirect.as_deref().unwrap_or(ABSENT),
            self.filename,
            self.offset,
            self.length,
        )
    }
}

/// Orders records by url, then timestamp. Records of the same capture keep
/// their relative (file) order.
pub fn sort_cdx(records: &mut [CdxRecord]) {
    records.sort_by(|a, b| a.url.cmp(&b.url).then_with(|| a.timestamp.cmp(&b.timestamp)));
}
