//! HTTP transport for the collector protocol.
//!
//! - `POST <endpoint>/data` with a JSON array of device records per batch
//! - `GET <endpoint>/done` once every batch went through
//!
//! Any status outside 2xx counts as a failed call; response bodies are ignored.

use super::{ExportBatch, Transport, TransportError};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    data_url: String,
    done_url: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        let endpoint = endpoint.trim_end_matches('/');
        Self {
            client,
            data_url: format!("{endpoint}/data"),
            done_url: format!("{endpoint}/done"),
        }
    }

    pub fn data_url(&self) -> &str {
        &self.data_url
    }

    pub fn done_url(&self) -> &str {
        &self.done_url
    }
}

fn check(
    url: &str,
    response: Result<reqwest::Response, reqwest::Error>,
) -> Result<(), TransportError> {
    let response = response.map_err(|source| TransportError::Request {
        url: url.to_string(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(())
}

impl Transport for HttpTransport {
    fn send_batch<'a>(
        &'a self,
        batch: &'a ExportBatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + 'a>> {
        Box::pin(async move {
            debug!(url = %self.data_url, batch = batch.index, "posting batch");
            let response = self
                .client
                .post(&self.data_url)
                .json(&batch.records)
                .send()
                .await;
            check(&self.data_url, response)
        })
    }

    fn signal_done(&self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            debug!(url = %self.done_url, "signalling completion");
            let response = self.client.get(&self.done_url).send().await;
            check(&self.done_url, response)
        })
    }
}
