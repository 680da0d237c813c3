// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::ffi::OsString;

use clap::Parser as _;

use super::subcommands::{Cli, Subcommand};
use crate::cli_shared::{logger::setup_logger, read_config};

pub fn main<ArgT>(args: impl IntoIterator<Item = ArgT>) -> anyhow::Result<()>
where
    ArgT: Into<OsString> + Clone,
{
    // Capture Cli inputs
    let Cli { opts, cmd } = Cli::parse_from(args);
    let (_, config) = read_config(opts.config.as_deref())?;
    setup_logger(&opts, &config.log)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            // Run command
            match cmd {
                Subcommand::GetRecord(cmd) => cmd.run(config).await,
                Subcommand::Batch(cmd) => cmd.run(config).await,
                Subcommand::State(cmd) => cmd.run(config),
            }
        })
}
