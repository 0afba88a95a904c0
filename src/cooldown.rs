//! Re-announcement cooldown for known devices.
//!
//! A device that is still in range shows up in every scan. The cooldown keeps
//! those repeated sightings from counting as new visits: an observation is only
//! accepted once at least `interval` has passed since the device's last
//! accepted observation.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Default time a device has to be gone before it counts as seen again.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5 * 60 * 60);

/// Minimum elapsed time between two accepted observations of one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    interval: TimeDelta,
}

impl Cooldown {
    /// Create a cooldown of the given length.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use bt_wardriving::cooldown::Cooldown;
    ///
    /// let cooldown = Cooldown::new(Duration::from_secs(3600));
    /// ```
    pub fn new(interval: Duration) -> Self {
        Cooldown {
            interval: TimeDelta::from_std(interval).unwrap_or(TimeDelta::MAX),
        }
    }

    /// Returns `true` while a device last accepted at `last_seen` must still be ignored at `now`.
    ///
    /// The boundary is strict: exactly `interval` after `last_seen` the device is
    /// accepted again. A `now` earlier than `last_seen` (clock stepped back) is
    /// treated as still cooling down so `last_seen` never moves backwards.
    pub fn is_active(&self, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_seen) < self.interval
    }
}

impl Default for Cooldown {
    fn default() -> Self {
        Cooldown::new(DEFAULT_COOLDOWN)
    }
}

/// Parse a CLI duration: a whole number followed by `ms`, `s`, `m` or `h`.
/// A bare number is seconds.
///
/// # Examples
/// ```
/// use bt_wardriving::cooldown::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5h").unwrap(), Duration::from_secs(5 * 3600));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    let digits = src
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(src.len());
    let (value, unit) = src.split_at(digits);
    let value: u64 = value
        .parse()
        .map_err(|_| format!("duration {src:?} does not start with a number"))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(60 * 60))),
        other => Err(format!("unknown unit {other:?} in duration {src:?}")),
    }
}
