// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod client;
mod config;

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::{info, warn};

use crate::utils::misc::LoggingColor;

pub use self::{client::*, config::*};

/// Environment variable consulted when no `--config` flag is given.
pub const CONFIG_PATH_ENV: &str = "WARCVAULT_CONFIG_PATH";

/// Options shared by every `warcvault-tool` command.
#[derive(Default, Debug, Args)]
pub struct CliOpts {
    /// A TOML file containing relevant configurations
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Enable or disable colored logging in `stderr`
    #[arg(long, default_value = "auto", global = true)]
    pub color: LoggingColor,
    /// Also write logs to hourly rotated files in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    Cli(PathBuf),
    Env(PathBuf),
}

impl ConfigPath {
    pub fn to_path_buf(&self) -> &PathBuf {
        match self {
            ConfigPath::Cli(path) | ConfigPath::Env(path) => path,
        }
    }
}

/// Picks the configuration file: the `--config` flag wins over
/// [`CONFIG_PATH_ENV`]. A path named by the environment that does not exist
/// is ignored with a warning.
pub fn find_config_path(config: Option<&Path>) -> Option<ConfigPath> {
    if let Some(path) = config {
        return Some(ConfigPath::Cli(path.to_path_buf()));
    }
    let path = PathBuf::from(std::env::var_os(CONFIG_PATH_ENV)?);
    if path.exists() {
        info!(path = %path.display(), "using configuration from {CONFIG_PATH_ENV}");
        Some(ConfigPath::Env(path))
    } else {
        warn!(path = %path.display(), "{CONFIG_PATH_ENV} points to a missing file, using defaults");
        None
    }
}
