// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! CDX indexes of archived captures.
//!
//! A CDX line addresses one capture by canonical URL and capture time and
//! records the container file, byte offset and length that hold it, so that a
//! single record can be fetched without scanning the container.

mod adapt;
mod archive;
mod canonicalize;
mod indexer;
mod io;
mod record;
mod timestamp;

pub use adapt::{AdaptError, Capture, adapt};
pub use archive::{ArchiveRecord, ContainerFormat, RecordFilter, RecordHeader, RecordKind};
pub use canonicalize::{IdentityCanonicalizer, NormalizingCanonicalizer, UrlCanonicalizer};
pub use indexer::{CdxIndexer, IndexError, IndexingReport};
pub use io::{CdxReadError, CdxWriter, read_cdx};
pub use record::{CDX_LEGEND, CdxParseError, CdxRecord, RecordLocation, sort_cdx};
pub use timestamp::{CaptureTimestamp, InvalidTimestamp, MAX_TIMESTAMP_DIGITS};
