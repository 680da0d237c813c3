// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use super::KeyValueStore;
use ahash::HashMap;
use itertools::Itertools;
use parking_lot::RwLock;

#[derive(Debug, Default)]
pub struct MemoryDB {
    db: RwLock<HashMap<String, Vec<u8>>>,
}

impl KeyValueStore for MemoryDB {
    fn read_bin(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.db.read().get(key).cloned())
    }

    fn write_bin(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        self.db.write().insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.db.read().contains_key(key))
    }

    fn keys(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.db.read().keys().cloned().sorted().collect_vec())
    }
}
