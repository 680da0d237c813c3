// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod memory;
pub mod parity_db;
pub mod parity_db_config;

pub use memory::MemoryDB;
pub use parity_db::ParityDb;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Interface used to store and retrieve preservation metadata. Keys are
/// filenames; values are opaque bytes, usually JSON documents.
pub trait KeyValueStore {
    /// Reads a binary value. For serializable data, use
    /// [`KeyValueStoreExt::read_obj`].
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Writes a binary value, overwriting any previous value. For
    /// serializable data, use [`KeyValueStoreExt::write_obj`].
    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    /// Returns `Ok(true)` if key exists in store.
    fn exists(&self, key: &str) -> anyhow::Result<bool>;

    /// Returns all keys.
    fn keys(&self) -> anyhow::Result<Vec<String>>;
}

/// Extension trait for the [`KeyValueStore`] trait. It is implemented for all
/// types that implement [`KeyValueStore`].
/// It provides methods for writing and reading any serializable object from the store.
pub trait KeyValueStoreExt {
    fn read_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<V>>;
    fn write_obj<V: Serialize>(&self, key: &str, value: &V) -> anyhow::Result<()>;

    /// Same as [`KeyValueStoreExt::read_obj`], but returns an error if the key does not exist.
    fn require_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<V>;
}

impl<T: ?Sized + KeyValueStore> KeyValueStoreExt for T {
    fn read_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<V>> {
        match self.read_bin(key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write_obj<V: Serialize>(&self, key: &str, value: &V) -> anyhow::Result<()> {
        self.write_bin(key, &serde_json::to_vec(value)?)
    }

    fn require_obj<V: DeserializeOwned>(&self, key: &str) -> anyhow::Result<V> {
        self.read_bin(key)?
            .ok_or_else(|| anyhow::anyhow!("Key {key} not found"))
            .and_then(|bytes| serde_json::from_slice(&bytes).map_err(Into::into))
    }
}

impl<DB: ?Sized + KeyValueStore> KeyValueStore for std::sync::Arc<DB> {
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        self.as_ref().read_bin(key)
    }

    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.as_ref().write_bin(key, value)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        self.as_ref().exists(key)
    }

    fn keys(&self) -> anyhow::Result<Vec<String>> {
        self.as_ref().keys()
    }
}

pub mod db_engine {
    use std::path::{Path, PathBuf};

    pub type Db = crate::db::parity_db::ParityDb;
    pub type DbConfig = crate::db::parity_db_config::ParityDbConfig;
    const DIR_NAME: &str = "paritydb";

    pub fn db_root(data_root: &Path) -> PathBuf {
        data_root.join(DIR_NAME)
    }

    pub fn open_db(path: &Path, config: &DbConfig) -> anyhow::Result<Db> {
        Db::open(path, config)
    }
}

#[cfg(test)]
mod tests {
    pub mod db_utils;
    mod mem_test;
    mod parity_test;
    pub mod subtests;
}
