//! Core application runner (business logic) for `bt-wardriving`.
//!
//! This module is decoupled from CLI entry, signal handling and process exit
//! codes so the daemon loop can be driven deterministically in tests with an
//! injected scanner, display and notifier.

use crate::cooldown::{Cooldown, parse_duration};
use crate::export::{ExportError, ExportSummary, HttpTransport, export_all};
use crate::output::display::TextDisplay;
use crate::output::notify::{CommandNotifier, DEFAULT_LED_PROGRAM};
use crate::output::{DeviceDisplay, Notifier, OutputError};
use crate::presence::{CycleReport, PresenceEngine};
use crate::scanner::hcitool::{self, DEFAULT_ADAPTER, DEFAULT_SCAN_PROGRAM};
use crate::scanner::{ScanError, parse_scan_output};
use crate::store::disk::DEFAULT_DATA_DIR;
use crate::store::{RecordStore, StoreError};
use chrono::Utc;
use clap::Parser;
use std::fs::OpenOptions;
use std::future::Future;
use std::io::{self, Write};
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Command line configuration.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Send all collected devices to this endpoint and exit instead of scanning.
    /// Batches are POSTed to <ENDPOINT>/data, completion is signalled on <ENDPOINT>/done.
    #[arg(long = "push-to-server", value_name = "ENDPOINT")]
    pub push_to_server: Option<String>,

    /// Directory holding the device records
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    /// Time a device has to be gone before it counts as seen again.
    /// Accepts duration with suffix: 30m, 5h, 90s.
    #[arg(long, default_value = "5h", value_parser = parse_duration)]
    pub cooldown: Duration,

    /// Minimum delay between two scans
    #[arg(long, default_value = "1s", value_parser = parse_duration)]
    pub interval: Duration,

    /// Inquiry program, called as `<PROGRAM> scan --flush`
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_SCAN_PROGRAM)]
    pub scan_command: String,

    /// Bluetooth adapter to bring up before scanning
    #[arg(long, default_value = DEFAULT_ADAPTER)]
    pub adapter: String,

    /// LED program, called as `<PROGRAM> 0xRRGGBB`
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_LED_PROGRAM)]
    pub led_command: String,

    /// Write the device display to this file or character device instead of stdout
    #[arg(long, value_name = "PATH")]
    pub display: Option<PathBuf>,

    /// Verbose output, log every ignored sighting
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Errors returned by the application runners.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("failed to open display {path}: {source}")]
    OpenDisplay {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    /// Run one inquiry and return the raw text it printed.
    fn scan(&self) -> Pin<Box<dyn Future<Output = Result<String, ScanError>> + Send + '_>>;
}

/// Real scanner that runs the inquiry command.
#[derive(Debug, Clone)]
pub struct CommandScanner {
    program: String,
}

impl CommandScanner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Scanner for CommandScanner {
    fn scan(&self) -> Pin<Box<dyn Future<Output = Result<String, ScanError>> + Send + '_>> {
        Box::pin(hcitool::scan(&self.program))
    }
}

/// Run a single scan, classify what it found and fire the side effects.
///
/// A device that cannot be stored is logged and counted in
/// [`CycleReport::failed`]; the other devices of the cycle are still handled.
///
/// # Errors
/// Returns the scan error when the inquiry itself failed; nothing is
/// classified in that case.
pub async fn run_cycle(
    scanner: &dyn Scanner,
    engine: &PresenceEngine,
    display: &mut dyn DeviceDisplay,
    notifier: &dyn Notifier,
) -> Result<CycleReport, ScanError> {
    let raw = scanner.scan().await?;
    let observations = parse_scan_output(&raw, Utc::now());

    let mut report = CycleReport::default();
    for observation in &observations {
        match engine.observe(observation) {
            Ok(classification) => {
                if let Some(record) = classification.record() {
                    display.render_device(&record.label, record.seen_count);
                }
                report.add(&classification);
            }
            Err(error) => {
                warn!(mac = %observation.mac, %error, "failed to store observation");
                report.failed += 1;
            }
        }
    }

    if report.changed() {
        if let Err(error) = display.flush() {
            warn!(%error, "failed to update display");
        }
        notifier.notify().await;
    }

    Ok(report)
}

/// Scan repeatedly until `shutdown` completes.
///
/// Between cycles the loop waits for `interval` or `shutdown`, whichever
/// comes first. A cycle that has started always runs to the end, so record
/// writes are never cut off. Failed cycles are logged and the loop goes on.
pub async fn run_daemon(
    interval: Duration,
    scanner: &dyn Scanner,
    engine: &PresenceEngine,
    display: &mut dyn DeviceDisplay,
    notifier: &dyn Notifier,
    shutdown: impl Future<Output = ()>,
) -> Result<(), RunError> {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            () = &mut shutdown => {
                info!("quitting");
                break;
            }
            () = tokio::time::sleep(interval) => {
                match run_cycle(scanner, engine, display, notifier).await {
                    Ok(report) if report.changed() || report.failed > 0 => info!(
                        new = report.new,
                        reseen = report.reseen,
                        ignored = report.ignored,
                        failed = report.failed,
                        "scan cycle done"
                    ),
                    Ok(report) => debug!(ignored = report.ignored, "nothing new"),
                    Err(error) => warn!(%error, "scan cycle failed"),
                }
            }
        }
    }

    display.clear()?;
    Ok(())
}

/// Push every stored device to `endpoint`.
pub async fn run_export(
    endpoint: &str,
    store: Arc<RecordStore>,
) -> Result<ExportSummary, ExportError> {
    info!(endpoint, "exporting stored devices");
    let transport = Arc::new(HttpTransport::new(endpoint));
    let summary = export_all(store, transport).await?;
    info!(
        records = summary.records,
        batches = summary.batches,
        skipped = summary.skipped,
        "export complete"
    );
    Ok(summary)
}

fn open_display(path: Option<&PathBuf>) -> Result<Box<dyn Write + Send>, RunError> {
    match path {
        None => Ok(Box::new(io::stdout())),
        Some(path) => OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map(|file| Box::new(file) as Box<dyn Write + Send>)
            .map_err(|source| RunError::OpenDisplay {
                path: path.clone(),
                source,
            }),
    }
}

/// Run the mode selected by `options` until it finishes or `shutdown` completes.
pub async fn run(options: Options, shutdown: impl Future<Output = ()>) -> Result<(), RunError> {
    let store = Arc::new(RecordStore::open(&options.data_dir)?);

    if let Some(endpoint) = options.push_to_server.as_deref() {
        run_export(endpoint, store).await?;
        return Ok(());
    }

    info!(data_dir = %options.data_dir.display(), "starting presence tracking");
    hcitool::bring_up_adapter(&options.adapter).await;

    let scanner = CommandScanner::new(options.scan_command);
    let engine = PresenceEngine::new(store, Cooldown::new(options.cooldown));
    let mut display = TextDisplay::new(open_display(options.display.as_ref())?);
    let notifier = CommandNotifier::new(options.led_command);

    run_daemon(
        options.interval,
        &scanner,
        &engine,
        &mut display,
        &notifier,
        shutdown,
    )
    .await
}
