//! Durable device and name-clash records.
//!
//! [`RecordStore`] owns the key layout and the error policy; the bytes live in
//! a [`StorageBackend`]. Device records are kept under `device-<MAC>` and
//! clash records under `nameclash-<MAC>`, so listing one prefix never returns
//! the other kind.
//!
//! Reads never fail: a missing, unreadable or undecodable value is reported
//! as absent so a corrupt entry is treated like a device never seen before.
//! Writes do fail, since losing one silently would drop observation state.

pub mod disk;
pub mod memory;

use crate::mac_address::MacAddress;
use crate::record::{ClashRecord, DeviceRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

pub use disk::DiskBackend;
pub use memory::MemoryBackend;

/// Key prefix of device records.
pub const DEVICE_PREFIX: &str = "device-";

/// Key prefix of name-clash records.
pub const CLASH_PREFIX: &str = "nameclash-";

/// Raw key/value storage underneath a [`RecordStore`].
pub trait StorageBackend: Send + Sync {
    /// Read a value, `Ok(None)` when the key does not exist.
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>>;

    /// Write a value, replacing any previous one.
    fn write(&self, key: &str, value: &[u8]) -> io::Result<()>;

    /// Keys starting with `prefix`, as of the time of the call.
    fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> io::Result<Box<dyn Iterator<Item = String> + Send + '_>>;
}

/// Errors returned by store writes and listing.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to list keys starting with {prefix}: {source}")]
    List {
        prefix: &'static str,
        #[source]
        source: io::Error,
    },
}

fn device_key(mac: &MacAddress) -> String {
    format!("{DEVICE_PREFIX}{mac}")
}

fn clash_key(mac: &MacAddress) -> String {
    format!("{CLASH_PREFIX}{mac}")
}

/// Device and clash records on top of a storage backend.
pub struct RecordStore {
    backend: Box<dyn StorageBackend>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").finish_non_exhaustive()
    }
}

impl RecordStore {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(DiskBackend::open(dir)?))
    }

    /// A store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::default())
    }

    /// Look up the record of `mac`.
    pub fn device(&self, mac: &MacAddress) -> Option<DeviceRecord> {
        let key = device_key(mac);
        let record: DeviceRecord = self.read_json(&key)?;
        if record.identifier != *mac {
            warn!(
                key = %key,
                stored = %record.identifier,
                "device record stored under the wrong key, ignoring it"
            );
            return None;
        }
        Some(record)
    }

    /// Persist `record` under its own identifier.
    pub fn put_device(&self, record: &DeviceRecord) -> Result<(), StoreError> {
        self.write_json(&device_key(&record.identifier), record)
    }

    /// Look up the clash record of `mac`.
    pub fn clash(&self, mac: &MacAddress) -> Option<ClashRecord> {
        self.read_json(&clash_key(mac))
    }

    pub fn put_clash(&self, mac: &MacAddress, clash: &ClashRecord) -> Result<(), StoreError> {
        self.write_json(&clash_key(mac), clash)
    }

    /// Identifiers of all stored devices, in no particular order.
    ///
    /// The key listing is taken when this is called; keys that do not carry a
    /// valid address are skipped.
    pub fn device_identifiers(
        &self,
    ) -> Result<impl Iterator<Item = MacAddress> + Send + '_, StoreError> {
        let keys = self
            .backend
            .keys_with_prefix(DEVICE_PREFIX)
            .map_err(|source| StoreError::List {
                prefix: DEVICE_PREFIX,
                source,
            })?;

        Ok(keys.filter_map(|key| {
            let mac = key.strip_prefix(DEVICE_PREFIX)?;
            match mac.parse::<MacAddress>() {
                Ok(mac) => Some(mac),
                Err(error) => {
                    warn!(key = %key, %error, "skipping device key without a valid address");
                    None
                }
            }
        }))
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.read(key) {
            Ok(bytes) => bytes?,
            Err(error) => {
                warn!(key, %error, "failed to read record, treating it as absent");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(key, %error, "failed to decode record, treating it as absent");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.backend
            .write(key, &bytes)
            .map_err(|source| StoreError::Write {
                key: key.to_string(),
                source,
            })
    }
}
