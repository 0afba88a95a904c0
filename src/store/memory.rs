//! In-process backend, used by tests and benchmarks.

use super::StorageBackend;
use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Map-backed storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> io::Result<()> {
        self.entries().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> io::Result<Box<dyn Iterator<Item = String> + Send + '_>> {
        let keys: Vec<String> = self
            .entries()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        Ok(Box::new(keys.into_iter()))
    }
}
