//! Batch upload of serialized payloads to the collection endpoint.

use chrono::Utc;
use reqwest::{header, StatusCode, Url};
use serde::Serialize;
use serde_json::value::RawValue;
use std::sync::Arc;

use crate::payload::{format_timestamp, TimestampPrecision};
use crate::transform::Transform;
use crate::{Error, Result};

/// Default base URL for batch uploads.
pub const DEFAULT_UPLOAD_URL: &str = "https://api.beacon-analytics.dev";

const BATCH_ENDPOINT: &str = "/v1/batch";

/// Upload failures, classified by how the dispatch queue should react.
#[derive(thiserror::Error, Debug)]
pub enum UploadError {
    /// Transport-level failure (connection refused, DNS, timeout). Retryable.
    #[error(transparent)]
    Network(#[from] reqwest::Error),

    /// The server rejected the batch permanently (4xx other than 429). The batch is dropped.
    #[error("batch rejected by server: {0}")]
    Rejected(StatusCode),

    /// The server is overloaded or failing (429/5xx). Retryable.
    #[error("server unavailable: {0}")]
    Server(StatusCode),
}

impl UploadError {
    /// Retryable failures leave the batch queued for the next natural flush trigger;
    /// non-retryable failures drop it.
    pub fn is_retryable(&self) -> bool {
        match self {
            UploadError::Network(_) => true,
            UploadError::Server(_) => true,
            UploadError::Rejected(_) => false,
        }
    }
}

/// The upload port the dispatch queue drains through. Production uses [`BatchUploader`]; tests
/// substitute recording/failing stand-ins.
pub trait Uploader: Send + Sync {
    fn upload(&self, batch: &[String]) -> std::result::Result<(), UploadError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchBody<'a> {
    batch: Vec<&'a RawValue>,
    sent_at: String,
}

/// Uploads batches of pre-serialized payloads over HTTP, authenticating with the write key.
pub struct BatchUploader {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    endpoint: Url,
    write_key: String,
    transform: Arc<dyn Transform>,
}

impl BatchUploader {
    /// Create an uploader for `base_url`. A malformed URL is a fatal configuration error
    /// surfaced here, at construction, so it is never retried.
    pub fn new(
        base_url: &str,
        write_key: String,
        transform: Arc<dyn Transform>,
    ) -> Result<BatchUploader> {
        let endpoint =
            Url::parse(&format!("{base_url}{BATCH_ENDPOINT}")).map_err(Error::InvalidBaseUrl)?;

        Ok(BatchUploader {
            client: reqwest::blocking::Client::new(),
            endpoint,
            write_key,
            transform,
        })
    }

    fn body(&self, batch: &[String]) -> Vec<u8> {
        let items = batch
            .iter()
            .filter_map(|line| match serde_json::from_str::<&RawValue>(line) {
                Ok(raw) => Some(raw),
                Err(err) => {
                    // Queue items are serialized by us; anything unreadable is dropped here
                    // rather than poisoning the whole batch.
                    log::warn!(target: "beacon", "skipping unreadable queued payload: {}", err);
                    None
                }
            })
            .collect();
        let body = BatchBody {
            batch: items,
            sent_at: format_timestamp(Utc::now(), TimestampPrecision::Millis),
        };
        let bytes = serde_json::to_vec(&body).expect("batch body serializes");
        self.transform.encode(&bytes)
    }
}

impl Uploader for BatchUploader {
    fn upload(&self, batch: &[String]) -> std::result::Result<(), UploadError> {
        log::debug!(target: "beacon", "uploading batch of {} payloads", batch.len());

        let response = self
            .client
            .post(self.endpoint.clone())
            .basic_auth(&self.write_key, None::<&str>)
            .header(header::CONTENT_TYPE, "application/json")
            .body(self.body(batch))
            .send()?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            Err(UploadError::Server(status))
        } else {
            Err(UploadError::Rejected(status))
        }
    }
}
