use crate::mac_address::MacAddress;
use crate::store::{MemoryBackend, StorageBackend};
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Timestamp `secs` seconds after the unix epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("timestamp in range")
}

/// Address whose last byte is `n`, for tests that need many devices.
pub fn mac(n: u8) -> MacAddress {
    MacAddress([0x12, 0x34, 0x56, 0x78, 0x90, n])
}

/// Memory storage that fails reads or writes on demand.
#[derive(Debug, Clone, Default)]
pub struct FailingBackend {
    inner: MemoryBackend,
    fail_reads: bool,
    fail_write_prefix: Option<&'static str>,
    fail_write_keys: BTreeSet<String>,
}

impl FailingBackend {
    /// Writes to keys starting with `prefix` fail.
    pub fn failing_prefix(prefix: &'static str) -> Self {
        Self {
            fail_write_prefix: Some(prefix),
            ..Self::default()
        }
    }

    /// Writes to exactly these keys fail.
    pub fn failing_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            fail_write_keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Every read fails.
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }
}

impl StorageBackend for FailingBackend {
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        if self.fail_reads {
            return Err(io::Error::other("read failed"));
        }
        self.inner.read(key)
    }

    fn write(&self, key: &str, value: &[u8]) -> io::Result<()> {
        if self.fail_write_prefix.is_some_and(|p| key.starts_with(p))
            || self.fail_write_keys.contains(key)
        {
            return Err(io::Error::other("disk full"));
        }
        self.inner.write(key, value)
    }

    fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> io::Result<Box<dyn Iterator<Item = String> + Send + '_>> {
        self.inner.keys_with_prefix(prefix)
    }
}

/// A request received by [`MockCollector`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

type StatusFn = dyn Fn(&RecordedRequest) -> u16 + Send + Sync;

#[derive(Clone)]
struct CollectorState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    status: Arc<StatusFn>,
}

/// Loopback HTTP server standing in for the remote collector.
///
/// Every request is recorded and answered with an empty body and the status
/// chosen by the `status` callback.
pub struct MockCollector {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: JoinHandle<()>,
}

impl MockCollector {
    pub async fn start<F>(status: F) -> Self
    where
        F: Fn(&RecordedRequest) -> u16 + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let app = Router::new().fallback(record).with_state(CollectorState {
            requests: Arc::clone(&requests),
            status: Arc::new(status),
        });
        let task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app).await {
                tracing::error!(%error, "mock collector stopped");
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockCollector {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn record(
    State(state): State<CollectorState>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> StatusCode {
    let request = RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        body: body.to_vec(),
    };
    let code = (state.status)(&request);
    state.requests.lock().unwrap().push(request);
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
