// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::sync::LazyLock;

use git_version::git_version;

/// Current git commit hash of the warcvault repository.
pub const GIT_HASH: &str = git_version!(args = ["--always", "--exclude", "*"], fallback = "unknown");

/// Current version of warcvault with git hash embedded
/// E.g., `0.1.0+git.e69baf3e4`
pub static VERSION_STRING: LazyLock<String> =
    LazyLock::new(|| format!("{}+git.{}", env!("CARGO_PKG_VERSION"), GIT_HASH));
