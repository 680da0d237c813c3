// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod cli;
pub mod logger;

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli_shared::cli::{Config, ConfigPath, find_config_path};
use crate::db::db_engine::db_root;
use crate::utils::io::read_toml;

/// Gets the preservation state database directory
pub fn db_path(config: &Config) -> PathBuf {
    db_root(&config.client.data_dir)
}

pub fn read_config(config_path_opt: Option<&Path>) -> anyhow::Result<(Option<ConfigPath>, Config)> {
    match find_config_path(config_path_opt) {
        Some(path) => {
            let toml = std::fs::read_to_string(path.to_path_buf())
                .with_context(|| format!("cannot read {}", path.to_path_buf().display()))?;
            let config = read_toml(&toml)
                .with_context(|| format!("invalid configuration {}", path.to_path_buf().display()))?;
            Ok((Some(path), config))
        }
        None => Ok((None, Config::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_config_default() {
        let (config_path, config) = read_config(None).unwrap();

        assert!(config_path.is_none() || std::env::var_os(cli::CONFIG_PATH_ENV).is_some());
        if config_path.is_none() {
            assert!(config.replicas.is_empty());
        }
    }

    #[test]
    fn read_config_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut default_config = Config::default();
        default_config.client.keep_state_history = true;
        std::fs::write(&path, toml::to_string(&default_config).unwrap()).unwrap();

        let (config_path, config) = read_config(Some(&path)).unwrap();

        assert_eq!(config_path.unwrap(), ConfigPath::Cli(path));
        assert_eq!(config, default_config);
        assert_eq!(db_path(&config), config.client.data_dir.join("paritydb"));
    }

    #[test]
    fn read_config_rejects_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[replicas]]\nid = \"A\"\nkind = \"tape\"\n").unwrap();

        let err = read_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("invalid configuration"));
    }

    #[test]
    fn read_config_missing_file() {
        assert!(read_config(Some(Path::new("/nonexistent/warcvault.toml"))).is_err());
    }
}
