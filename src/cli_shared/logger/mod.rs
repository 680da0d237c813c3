// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use tracing_subscriber::{EnvFilter, Registry, prelude::*};

use crate::cli_shared::cli::{CliOpts, LogConfig};

/// Installs the global subscriber. Console output goes to `stderr`, leaving
/// `stdout` to record bytes and command output.
pub fn setup_logger(opts: &CliOpts, log: &LogConfig) -> anyhow::Result<()> {
    let mut layers: Vec<Box<dyn tracing_subscriber::layer::Layer<Registry> + Send + Sync>> =
        // console logger
        vec![Box::new(
            tracing_subscriber::fmt::Layer::new()
                .with_ansi(opts.color.coloring_enabled())
                .with_writer(std::io::stderr)
                .with_filter(get_env_filter(default_env_filter(log)?)),
        )];

    // file logger
    if let Some(log_dir) = &opts.log_dir {
        let file_appender = tracing_appender::rolling::hourly(log_dir, "warcvault.log");
        layers.push(Box::new(
            tracing_subscriber::fmt::Layer::new()
                .with_ansi(false)
                .with_writer(file_appender)
                .with_filter(get_env_filter(default_env_filter(log)?)),
        ));
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

/// Returns an [`EnvFilter`] according to the `RUST_LOG` environment variable, or a default.
///
/// Note that [`tracing_subscriber::filter::Builder`] only allows a single default directive,
/// whereas we want to provide multiple.
fn get_env_filter(def: EnvFilter) -> EnvFilter {
    use std::env::{
        self,
        VarError::{NotPresent, NotUnicode},
    };
    match env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV) {
        Ok(s) => EnvFilter::new(s),
        Err(NotPresent) => def,
        Err(NotUnicode(_)) => EnvFilter::default(),
    }
}

fn default_env_filter(log: &LogConfig) -> anyhow::Result<EnvFilter> {
    let mut directives = vec!["info".to_string()];
    let configured = log.to_filter_string();
    if !configured.is_empty() {
        directives.push(configured);
    }
    Ok(EnvFilter::try_new(directives.join(","))?)
}
