//! Frame ingestion.
//!
//! Turns an uploaded payload into stored bytes and then advances the latest
//! pointer. The pointer only moves after the store write has completed, so it
//! never names a key that was not stored.

use crate::error::RelayError;
use crate::frame_store::FrameStore;
use crate::latest::LatestRegister;
use crate::naming::{self, Clock};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument};

/// An `image` payload as it arrived on the wire.
#[derive(Debug, Clone)]
pub enum ImagePayload {
    /// Raw bytes from a multipart file part
    File { filename: String, bytes: Vec<u8> },
    /// Base64 text from a form field, possibly with a data-URI header
    Encoded(String),
}

impl ImagePayload {
    /// Pick the payload out of what the request carried.
    ///
    /// A file part wins over a text field of the same name.
    pub fn select(
        file: Option<(String, Vec<u8>)>,
        field: Option<String>,
    ) -> Result<Self, RelayError> {
        match (file, field) {
            (Some((filename, _)), _) if filename.is_empty() => {
                Err(RelayError::InvalidInput("No image selected".to_string()))
            }
            (Some((filename, bytes)), _) => Ok(ImagePayload::File { filename, bytes }),
            (None, Some(data)) => Ok(ImagePayload::Encoded(data)),
            (None, None) => Err(RelayError::InvalidInput("No image data found".to_string())),
        }
    }

    fn into_bytes(self) -> Result<Vec<u8>, RelayError> {
        match self {
            ImagePayload::File { bytes, .. } => Ok(bytes),
            ImagePayload::Encoded(data) => decode_base64_image(&data),
        }
    }
}

/// Decode a base64 image, dropping everything up to the first comma.
///
/// `data:image/jpeg;base64,/9j/4AAQ...` and `/9j/4AAQ...` decode the same.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>, RelayError> {
    let encoded = match data.split_once(',') {
        Some((_, rest)) => rest,
        None => data,
    };

    let cleaned: String = encoded
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    STANDARD
        .decode(cleaned)
        .map_err(|e| RelayError::Decode(format!("Invalid base64 image data: {e}")))
}

/// Acknowledgement returned to the uploader
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub status: &'static str,
    pub filename: String,
    pub timestamp: String,
}

/// Stores uploaded frames and tracks the latest one.
pub struct FrameIngestor {
    store: Arc<dyn FrameStore>,
    latest: Arc<LatestRegister>,
    clock: Arc<dyn Clock>,
}

impl FrameIngestor {
    pub fn new(
        store: Arc<dyn FrameStore>,
        latest: Arc<LatestRegister>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            latest,
            clock,
        }
    }

    /// Decode, store, then publish one frame.
    #[instrument(skip(self, payload))]
    pub async fn ingest(&self, payload: ImagePayload) -> Result<UploadReceipt, RelayError> {
        metrics::counter!("relay.frames.received").increment(1);

        if let ImagePayload::File { filename, bytes } = &payload {
            debug!(upload_name = %filename, size_bytes = bytes.len(), "Received file upload");
        }

        let bytes = payload.into_bytes().map_err(|e| {
            error!(error = %e, "Failed to decode upload");
            metrics::counter!("relay.upload.failed").increment(1);
            e
        })?;

        let key = naming::generate(self.clock.now());

        let started = Instant::now();
        self.store.put(&key.filename, &bytes).await.map_err(|e| {
            error!(error = %e, filename = %key.filename, "Failed to store frame");
            metrics::counter!("relay.upload.failed").increment(1);
            RelayError::Storage(e)
        })?;
        metrics::histogram!("relay.store.write_seconds").record(started.elapsed().as_secs_f64());

        self.latest.set(key.filename.clone(), key.timestamp.clone());

        metrics::counter!("relay.frames.stored").increment(1);
        metrics::counter!("relay.bytes.stored").increment(bytes.len() as u64);

        info!(
            filename = %key.filename,
            size_bytes = bytes.len(),
            "Frame stored"
        );

        Ok(UploadReceipt {
            status: "success",
            filename: key.filename,
            timestamp: key.timestamp,
        })
    }
}
