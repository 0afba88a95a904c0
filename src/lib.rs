//! `bt-wardriving` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, signal handling
//! and process exit codes. The presence rules live in [`crate::presence`], the
//! bulk upload in [`crate::export`], and [`crate::app`] wires them to the
//! scanner and output devices so the loop can be tested with injected fakes.

pub mod app;
pub mod cooldown;
pub mod export;
pub mod mac_address;
pub mod observation;
pub mod output;
pub mod presence;
pub mod record;
pub mod scanner;
pub mod store;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use cooldown::{Cooldown, parse_duration};
pub use export::{
    BATCH_SIZE, BatchError, ExportBatch, ExportError, ExportSummary, HttpTransport, Transport,
    TransportError, export_all,
};
pub use mac_address::MacAddress;
pub use observation::Observation;
pub use output::{DeviceDisplay, Notifier};
pub use presence::{Classification, CycleReport, PresenceEngine};
pub use record::{ClashRecord, DeviceRecord};
pub use scanner::{ScanError, parse_scan_output};
pub use store::{RecordStore, StorageBackend, StoreError};
