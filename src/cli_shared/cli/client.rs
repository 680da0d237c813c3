// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::path::PathBuf;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Client {
    /// Where the preservation state database lives.
    pub data_dir: PathBuf,
    /// Keep every superseded preservation state as an audit trail.
    pub keep_state_history: bool,
}

impl Default for Client {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("org", "warcvault", "warcvault")
            .map(|dir| dir.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".warcvault"));
        Self {
            data_dir,
            keep_state_history: false,
        }
    }
}
