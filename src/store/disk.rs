//! Flat-directory backend: one file per key.
//!
//! Values are written to a hidden temporary file next to the target and then
//! renamed over it, so readers only ever see complete values.

use super::{StorageBackend, StoreError};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Default data directory, relative to the working directory.
pub const DEFAULT_DATA_DIR: &str = "diskv-data";

#[derive(Debug, Clone)]
pub struct DiskBackend {
    root: PathBuf,
}

impl DiskBackend {
    /// Use `root` as the data directory, creating it if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|source| StoreError::Open {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.root.join(format!(".{key}.tmp"))
    }
}

impl StorageBackend for DiskBackend {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> io::Result<()> {
        let temp = self.temp_path(key);
        let mut file = fs::File::create(&temp)?;
        file.write_all(value)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, self.path(key))
    }

    fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> io::Result<Box<dyn Iterator<Item = String> + Send + '_>> {
        let prefix = prefix.to_string();
        let entries = fs::read_dir(&self.root)?;
        Ok(Box::new(entries.filter_map(move |entry| {
            let name = entry.ok()?.file_name().into_string().ok()?;
            name.starts_with(&prefix).then_some(name)
        })))
    }
}
