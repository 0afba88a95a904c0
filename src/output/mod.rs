//! Side-effect collaborators of the daemon loop.
//!
//! The loop renders every new or re-seen device to a [`DeviceDisplay`], then,
//! once per cycle in which something changed, flushes the display and pokes
//! the [`Notifier`].

pub mod display;
pub mod notify;

use std::future::Future;
use std::io;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised while driving an output device.
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("display write failed: {0}")]
    Display(#[from] io::Error),
}

/// A small character display listing recently seen devices.
pub trait DeviceDisplay: Send {
    /// Queue a device line; nothing is shown until [`DeviceDisplay::flush`].
    fn render_device(&mut self, label: &str, seen_count: u32);

    /// Show the queued lines.
    fn flush(&mut self) -> Result<(), OutputError>;

    /// Blank the display before shutdown.
    fn clear(&mut self) -> Result<(), OutputError>;
}

/// Something that signals "a device showed up", such as an LED.
pub trait Notifier: Send + Sync {
    fn notify(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}
