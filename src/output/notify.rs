//! LED pulse through an external command.
//!
//! The default `expled` takes a `0xRRGGBB` color; a notification turns the
//! LED blue and then off again.

use super::Notifier;
use std::future::Future;
use std::pin::Pin;
use tokio::process::Command;
use tracing::warn;

/// Default LED control program.
pub const DEFAULT_LED_PROGRAM: &str = "expled";

const LED_ON: &str = "0x0000ff";
const LED_OFF: &str = "0x000000";

#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: String,
}

impl CommandNotifier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn set_color(&self, color: &str) {
        match Command::new(&self.program).arg(color).status().await {
            Ok(status) if status.success() => {}
            Ok(status) => warn!(program = %self.program, color, %status, "LED command failed"),
            Err(error) => {
                warn!(program = %self.program, color, %error, "failed to run LED command")
            }
        }
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            self.set_color(LED_ON).await;
            self.set_color(LED_OFF).await;
        })
    }
}
