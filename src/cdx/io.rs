// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{
    fs::{File, OpenOptions},
    io::{self, BufRead, BufWriter, Write},
    path::Path,
};

use super::record::{CdxParseError, CdxRecord};

#[derive(Debug, thiserror::Error)]
pub enum CdxReadError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: CdxParseError,
    },
}

fn is_skipped(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with(" CDX")
}

/// Reads every record of a CDX file, skipping blank and legend lines.
pub fn read_cdx(reader: impl BufRead) -> Result<Vec<CdxRecord>, CdxReadError> {
    let mut records = vec![];
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if is_skipped(&line) {
            continue;
        }
        let record = line.parse().map_err(|source| CdxReadError::Parse {
            line: i + 1,
            source,
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Writes a new CDX file. An existing index is never overwritten: indexing a
/// container again produces a separate artifact.
pub struct CdxWriter {
    inner: BufWriter<File>,
}

impl CdxWriter {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().write(true).create_new(true).open(path)?;
        Ok(Self {
            inner: BufWriter::new(file),
        })
    }

    pub fn write(&mut self, record: &CdxRecord) -> io::Result<()> {
        writeln!(self.inner, "{record}")
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdx::record::CDX_LEGEND;

    #[test]
    fn reads_records_skipping_legend_and_blank_lines() {
        let text = format!(
            "{}\nhttp://a/ 100 - 200 - - a.warc 0 10\n\nhttp://b/ 200 - - - - a.warc 10 5\n",
            CDX_LEGEND
        );
        let records = read_cdx(text.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].offset, 10);
    }

    #[test]
    fn reports_line_of_malformed_record() {
        let err = read_cdx("http://a/ 100 - 200 - - a.warc 0 10\nbroken\n".as_bytes())
            .unwrap_err();
        assert!(matches!(err, CdxReadError::Parse { line: 2, .. }));
    }

    #[test]
    fn writer_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cdx");
        let record: CdxRecord = "http://a/ 100 - 200 - - a.warc 0 10".parse().unwrap();

        let mut writer = CdxWriter::create(&path).unwrap();
        writer.write(&record).unwrap();
        writer.finish().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            format!("{record}\n")
        );

        let err = CdxWriter::create(&path).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }
}
