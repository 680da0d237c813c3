// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, Utc};

/// Capture time in the `yyyyMMddHHmmss` form, or a prefix of it.
///
/// The digits are kept verbatim so that index lines round-trip byte for byte.
/// Timestamps compare as if right-padded with zeros to 14 digits, so `"2025"`
/// stands for the start of 2025 and is later than any capture made in 2024.
/// A prefix sorts after the full timestamps it pads to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaptureTimestamp(String);

pub const MAX_TIMESTAMP_DIGITS: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid capture timestamp '{0}'")]
pub struct InvalidTimestamp(pub String);

impl CaptureTimestamp {
    pub fn from_datetime(at: &DateTime<Utc>) -> Self {
        Self(at.format("%Y%m%d%H%M%S").to_string())
    }

    /// Parses an RFC 3339 `WARC-Date` value.
    pub fn from_warc_date(value: &str) -> Result<Self, InvalidTimestamp> {
        DateTime::parse_from_rfc3339(value.trim())
            .map(|at| Self::from_datetime(&at.with_timezone(&Utc)))
            .map_err(|_| InvalidTimestamp(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn padded(&self) -> impl Iterator<Item = u8> + '_ {
        self.0
            .bytes()
            .chain(std::iter::repeat(b'0'))
            .take(MAX_TIMESTAMP_DIGITS)
    }
}

impl FromStr for CaptureTimestamp {
    type Err = InvalidTimestamp;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > MAX_TIMESTAMP_DIGITS || !s.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(InvalidTimestamp(s.to_owned()));
        }
        Ok(Self(s.to_owned()))
    }
}

impl fmt::Display for CaptureTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for CaptureTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.padded()
            .cmp(other.padded())
            .then_with(|| other.0.len().cmp(&self.0.len()))
    }
}

impl PartialOrd for CaptureTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
