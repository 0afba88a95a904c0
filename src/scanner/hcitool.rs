//! `hcitool`/`hciconfig` backend.
//!
//! Runs a classic Bluetooth inquiry through BlueZ's command line tools. The
//! inquiry blocks for the duration of the scan (roughly ten seconds) and
//! prints one `address<TAB>name` line per discovered device.

use super::ScanError;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default inquiry program.
pub const DEFAULT_SCAN_PROGRAM: &str = "hcitool";

/// Default adapter brought up before scanning.
pub const DEFAULT_ADAPTER: &str = "hci0";

/// Arguments passed to the inquiry program.
pub const SCAN_ARGS: [&str; 2] = ["scan", "--flush"];

/// Run one inquiry and return its standard output.
pub async fn scan(program: &str) -> Result<String, ScanError> {
    debug!(program, "starting inquiry");
    let output = Command::new(program)
        .args(SCAN_ARGS)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| ScanError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(ScanError::Failed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Bring the adapter up (`hciconfig <adapter> up`).
///
/// Failure is only logged: the adapter is often already up, and a real
/// problem will surface as scan errors later.
pub async fn bring_up_adapter(adapter: &str) {
    match Command::new("hciconfig").args([adapter, "up"]).status().await {
        Ok(status) if status.success() => debug!(adapter, "adapter is up"),
        Ok(status) => warn!(adapter, %status, "hciconfig did not bring the adapter up"),
        Err(error) => warn!(adapter, %error, "failed to run hciconfig"),
    }
}
