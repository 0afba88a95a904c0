//! Bulk export of all device records to a remote collector.
//!
//! The pipeline has three stages:
//!
//! 1. A blocking producer task walks the store's device keys, loads every
//!    record and sends it over a channel. Records that fail to load are
//!    skipped. Closing the channel marks the end of the records.
//! 2. The driver groups incoming records into batches of at most
//!    [`BATCH_SIZE`], keeping arrival order, and spawns one upload task per
//!    batch as soon as it is full.
//! 3. The driver joins every upload task; a task that panicked or was
//!    cancelled counts as a failed batch. Only when every batch went through
//!    is the completion signal sent, so the collector can tell a full export
//!    from a partial one.
//!
//! Failed batches are not retried and do not cancel their siblings.

pub mod http;

use crate::record::DeviceRecord;
use crate::store::{RecordStore, StoreError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{info, warn};

pub use http::HttpTransport;

/// Maximum number of records per upload.
pub const BATCH_SIZE: usize = 20;

/// Records buffered between the store producer and the batcher.
pub const RECORD_CHANNEL_BUFFER_SIZE: usize = 100;

/// Errors of a single transport call.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },
}

/// Overall export failure.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("record producer stopped unexpectedly: {0}")]
    Producer(#[from] JoinError),
    #[error("{} of {total} batches failed to upload", .failed.len())]
    BatchesFailed {
        failed: Vec<BatchFailure>,
        total: usize,
    },
    #[error("all batches uploaded but the completion signal failed: {0}")]
    Completion(#[source] TransportError),
}

/// Why a batch was not delivered.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("upload task died: {0}")]
    Task(#[from] JoinError),
}

/// A batch that could not be delivered.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the batch in dispatch order, starting at 0
    pub index: usize,
    pub records: usize,
    pub error: BatchError,
}

/// What a successful export delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportSummary {
    pub records: usize,
    pub batches: usize,
    /// Identifiers whose record could not be loaded
    pub skipped: usize,
}

/// A group of records uploaded in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportBatch {
    pub index: usize,
    pub records: Vec<DeviceRecord>,
}

/// Where batches are sent.
pub trait Transport: Send + Sync {
    /// Upload one batch; the batch either goes through as a whole or fails.
    fn send_batch<'a>(
        &'a self,
        batch: &'a ExportBatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>>;

    /// Tell the collector that every batch has been delivered.
    fn signal_done(&self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;
}

/// Groups records into batches of at most `size`, in arrival order.
#[derive(Debug)]
pub struct Batcher {
    size: usize,
    next_index: usize,
    pending: Vec<DeviceRecord>,
}

impl Batcher {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            next_index: 0,
            pending: Vec::with_capacity(size),
        }
    }

    /// Add a record, returning a batch when it is full.
    pub fn push(&mut self, record: DeviceRecord) -> Option<ExportBatch> {
        self.pending.push(record);
        (self.pending.len() == self.size).then(|| self.take())
    }

    /// The final, possibly short batch, if any records remain.
    pub fn finish(&mut self) -> Option<ExportBatch> {
        (!self.pending.is_empty()).then(|| self.take())
    }

    fn take(&mut self) -> ExportBatch {
        let records = std::mem::replace(&mut self.pending, Vec::with_capacity(self.size));
        let index = self.next_index;
        self.next_index += 1;
        ExportBatch { index, records }
    }
}

/// Load every device record and send it to `records`. Returns the number of
/// identifiers that were skipped because their record could not be loaded.
fn produce_records(
    store: &RecordStore,
    records: &mpsc::Sender<DeviceRecord>,
) -> Result<usize, StoreError> {
    let mut skipped = 0;
    for mac in store.device_identifiers()? {
        match store.device(&mac) {
            Some(record) => {
                if records.blocking_send(record).is_err() {
                    break;
                }
            }
            None => {
                warn!(%mac, "failed to load device record, leaving it out of the export");
                skipped += 1;
            }
        }
    }
    Ok(skipped)
}

/// Upload every device record in `store` through `transport`.
///
/// # Errors
/// - [`ExportError::BatchesFailed`] if any batch failed; the completion
///   signal is not sent in that case
/// - [`ExportError::Completion`] if all batches went through but the
///   completion signal did not
/// - [`ExportError::Store`] if the store could not be listed
pub async fn export_all(
    store: Arc<RecordStore>,
    transport: Arc<dyn Transport>,
) -> Result<ExportSummary, ExportError> {
    let (record_tx, mut record_rx) = mpsc::channel(RECORD_CHANNEL_BUFFER_SIZE);
    let producer = tokio::task::spawn_blocking(move || produce_records(&store, &record_tx));

    let mut batcher = Batcher::new(BATCH_SIZE);
    let mut uploads = Vec::new();
    let mut records = 0;

    let dispatch = |batch: ExportBatch| {
        let transport = Arc::clone(&transport);
        let (index, len) = (batch.index, batch.records.len());
        let upload = tokio::spawn(async move {
            info!(batch = batch.index, records = batch.records.len(), "sending batch");
            transport.send_batch(&batch).await
        });
        (index, len, upload)
    };

    while let Some(record) = record_rx.recv().await {
        records += 1;
        if let Some(batch) = batcher.push(record) {
            uploads.push(dispatch(batch));
        }
    }
    if let Some(batch) = batcher.finish() {
        uploads.push(dispatch(batch));
    }
    let dispatched = uploads.len();

    // Join every upload before looking at the producer result so no task is
    // left running unobserved. A task that died counts as a failed batch.
    let mut failed = Vec::new();
    for (index, batch_records, upload) in uploads {
        let error = match upload.await {
            Ok(Ok(())) => continue,
            Ok(Err(error)) => BatchError::from(error),
            Err(error) => BatchError::from(error),
        };
        warn!(batch = index, %error, "batch upload failed");
        failed.push(BatchFailure {
            index,
            records: batch_records,
            error,
        });
    }

    let skipped = producer.await??;

    if !failed.is_empty() {
        return Err(ExportError::BatchesFailed {
            failed,
            total: dispatched,
        });
    }

    info!(records, batches = dispatched, "all batches sent, signalling completion");
    transport
        .signal_done()
        .await
        .map_err(ExportError::Completion)?;

    Ok(ExportSummary {
        records,
        batches: dispatched,
        skipped,
    })
}
