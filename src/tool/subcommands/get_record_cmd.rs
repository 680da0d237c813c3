// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use futures::TryStreamExt as _;
use tokio::io::AsyncWriteExt as _;
use tracing::debug;

use super::{open_state_store, replica_set};
use crate::cdx::{CaptureTimestamp, IdentityCanonicalizer, NormalizingCanonicalizer, UrlCanonicalizer};
use crate::cli_shared::cli::Config;
use crate::lookup::IndexLookup;
use crate::retrieval::RecordRetriever;
use crate::transport::LocalTransport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum CanonicalizerKind {
    #[default]
    Identity,
    Normalizing,
}

impl CanonicalizerKind {
    fn build(self) -> Arc<dyn UrlCanonicalizer> {
        match self {
            CanonicalizerKind::Identity => Arc::new(IdentityCanonicalizer),
            CanonicalizerKind::Normalizing => Arc::new(NormalizingCanonicalizer),
        }
    }
}

#[derive(Debug, clap::Args)]
pub struct GetRecordCommand {
    /// CDX index file the URI is resolved with
    index: PathBuf,
    /// URI of the capture to fetch
    uri: String,
    /// Fetch the latest capture taken at or before this timestamp (1 to 14 digits)
    #[arg(long)]
    at: Option<CaptureTimestamp>,
    /// URL canonicalizer the index was built with (`identity` or `normalizing`)
    #[arg(long, default_value = "identity")]
    canonicalizer: CanonicalizerKind,
}

impl GetRecordCommand {
    pub async fn run(self, config: Config) -> anyhow::Result<()> {
        let lookup = IndexLookup::load(&self.index, self.canonicalizer.build())?;
        let entry = match &self.at {
            Some(at) => lookup.resolve_at(&self.uri, at)?,
            None => lookup.resolve(&self.uri)?,
        };
        debug!(uri = %self.uri, location = %entry.location(), "resolved");

        let retriever = RecordRetriever::new(
            replica_set(&config)?,
            open_state_store(&config)?,
            Arc::new(LocalTransport),
        );
        let mut stream = retriever.fetch_location(&entry.location()).await?;
        let mut stdout = tokio::io::stdout();
        while let Some(chunk) = stream
            .try_next()
            .await
            .with_context(|| format!("reading '{}' failed", entry.filename))?
        {
            stdout.write_all(&chunk).await?;
        }
        stdout.flush().await?;
        Ok(())
    }
}
