//! Bluetooth inquiry scanning.
//!
//! The daemon does not talk to the radio itself. It runs an inquiry command
//! (`hcitool scan` by default, see [`hcitool`]) and extracts `(address, name)`
//! pairs from its textual output with [`parse_scan_output`].

pub mod hcitool;

use crate::mac_address::MacAddress;
use crate::observation::Observation;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The scan command could not be started or waited on
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The scan command ran but reported failure
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// One line of scan output: an optional prefix without hex digits, the
/// address, then the name.
static DEVICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[^0-9a-f]*((?:[0-9a-f]{2}:){5}[0-9a-f]{2})(.*)$")
        .expect("device line pattern is valid")
});

/// Extract observed devices from raw scan output.
///
/// Every line that contains an address yields one observation; the rest of the
/// line, trimmed, is the label. A line with nothing after the address uses the
/// address as label. When an address shows up on several lines the last label
/// wins, and the result keeps first-appearance order.
pub fn parse_scan_output(raw: &str, observed_at: DateTime<Utc>) -> Vec<Observation> {
    let mut observations: Vec<Observation> = Vec::new();
    let mut index: HashMap<MacAddress, usize> = HashMap::new();

    for line in raw.lines() {
        let Some(captures) = DEVICE_LINE.captures(line) else {
            continue;
        };
        let Ok(mac) = captures[1].parse::<MacAddress>() else {
            continue;
        };
        let label = captures.get(2).map_or("", |m| m.as_str().trim());
        let observation = Observation::new(mac, label, observed_at);

        match index.get(&mac) {
            Some(&i) => observations[i] = observation,
            None => {
                index.insert(mac, observations.len());
                observations.push(observation);
            }
        }
    }

    observations
}
