//! A single sighting of a device produced by one scan cycle.

use crate::mac_address::MacAddress;
use chrono::{DateTime, SubsecRound, Utc};

/// One device reported by the scanner.
///
/// Observations are never stored directly; the presence engine folds them
/// into a [`crate::record::DeviceRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Address of the device
    pub mac: MacAddress,
    /// Name reported by the scanner, or the address itself when none was reported
    pub label: String,
    /// When the scan that produced this observation returned, in whole
    /// seconds like the stored `lastSeenAt`
    pub observed_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(mac: MacAddress, label: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        let label = label.into();
        let label = if label.is_empty() {
            mac.to_string()
        } else {
            label
        };
        Self {
            mac,
            label,
            observed_at: observed_at.trunc_subsecs(0),
        }
    }
}
