//! Persistent per-device state.

use crate::mac_address::MacAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Everything remembered about one device.
///
/// This is also the element type of the export wire format, so field names
/// are camelCase and `lastSeenAt` is serialized as unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    /// Address of the device; never changes once the record exists
    pub identifier: MacAddress,
    /// Last accepted label
    pub label: String,
    /// Number of accepted re-announcements, 0 for a device seen once
    pub seen_count: u32,
    /// Time of the last accepted observation
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_seen_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// Record for a device that has never been seen before.
    pub fn first_sighting(identifier: MacAddress, label: String, seen_at: DateTime<Utc>) -> Self {
        Self {
            identifier,
            label,
            seen_count: 0,
            last_seen_at: seen_at,
        }
    }

    /// The record after accepting another observation of the same device.
    pub fn seen_again(&self, label: String, seen_at: DateTime<Utc>) -> Self {
        Self {
            identifier: self.identifier,
            label,
            seen_count: self.seen_count.saturating_add(1),
            last_seen_at: seen_at,
        }
    }
}

/// Labels observed for one address that reported more than one name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClashRecord {
    pub occurrence_count: u32,
    pub distinct_labels: BTreeSet<String>,
}

impl ClashRecord {
    /// Start tracking clashes for a device whose stored label is `known_label`.
    pub fn starting_from(known_label: &str) -> Self {
        Self {
            occurrence_count: 0,
            distinct_labels: BTreeSet::from([known_label.to_string()]),
        }
    }

    /// Count one more mismatch and remember `label` if it is new.
    pub fn record_mismatch(&mut self, label: &str) {
        self.occurrence_count = self.occurrence_count.saturating_add(1);
        if !self.distinct_labels.contains(label) {
            self.distinct_labels.insert(label.to_string());
        }
    }
}
