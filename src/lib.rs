// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

pub mod batch;
pub mod cdx;
mod cli_shared;
pub mod db;
pub mod lookup;
pub mod replica;
pub mod retrieval;
pub mod state;
mod tool;
pub mod transport;
mod utils;

pub use cli_shared::cli::{Client, Config, LogConfig, LogValue};
pub use tool::main::main as tool_main;
