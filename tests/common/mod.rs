// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use tempfile::TempDir;

pub fn tool() -> Command {
    cargo_bin_cmd!("warcvault-tool")
}

/// An HTTP response record as it would appear inside a container file.
pub struct SyntheticRecord {
    pub url: &'static str,
    pub date: &'static str,
    pub body: &'static str,
}

impl SyntheticRecord {
    pub fn http_payload(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
            self.body.len(),
            self.body
        )
        .into_bytes()
    }

    /// The record with its container headers.
    pub fn bytes(&self) -> Vec<u8> {
        let payload = self.http_payload();
        let mut bytes = format!(
            "WARC/1.0\r\nWARC-Type: response\r\nWARC-Target-URI: {}\r\nWARC-Date: {}\r\nContent-Length: {}\r\n\r\n",
            self.url,
            self.date,
            payload.len()
        )
        .into_bytes();
        bytes.extend(payload);
        bytes.extend(b"\r\n\r\n");
        bytes
    }
}

/// A replica directory, a state directory and a configuration file naming a
/// single bit-storage replica `KB`.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("couldn't create temp dir");
        std::fs::create_dir(dir.path().join("kb")).expect("couldn't create replica dir");
        let config = format!(
            r#"
[client]
data_dir = "{}"

[batch]
replica_timeout = 5000
job_timeout = 10000

[[replicas]]
id = "KB"
kind = "bit-storage"
endpoint = "file://{}"
"#,
            dir.path().join("data").display(),
            dir.path().join("kb").display(),
        );
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, config).expect("couldn't write config");
        Self {
            dir,
            config: config_file,
        }
    }

    pub fn replica_dir(&self) -> PathBuf {
        self.dir.path().join("kb")
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn tool(&self) -> Command {
        let mut cmd = tool();
        cmd.arg("--config").arg(&self.config).arg("--color").arg("never");
        cmd
    }
}

pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) {
    std::fs::write(path, contents).expect("couldn't write file");
}
