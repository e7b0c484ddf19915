//! Frame Relay Service
//!
//! Accepts JPEG frames pushed by a camera over HTTP, persists each one to a
//! local directory, and serves the most recently received frame to any
//! number of polling viewers.
//!
//! ## Endpoints
//!
//! - `POST /upload`: multipart file part `image`, or form field `image`
//!   holding base64 (an optional `data:...;base64,` header is stripped)
//! - `GET /latest`: `{filename, timestamp, url}` of the newest frame
//! - `GET /images/{filename}`: raw frame bytes
//! - `GET /`: viewer page
//!
//! ## Architecture
//!
//! ```text
//! Camera ──▶ /upload ──▶ FrameIngestor ──┬──▶ FrameStore (uploads/)
//!                                        └──▶ LatestRegister
//!
//! Viewer ──▶ /latest ──▶ LatestRegister
//!        ──▶ /images/{filename} ──▶ FrameStore
//! ```
//!
//! The ingestor writes the frame to the store before moving the latest
//! pointer, so `/latest` never names a frame that cannot be fetched.

pub mod api;
pub mod config;
pub mod error;
pub mod frame_store;
pub mod ingest;
pub mod latest;
pub mod naming;

pub use api::{create_router, start_api_server, AppState, LatestResponse};
pub use config::Config;
pub use error::RelayError;
pub use frame_store::{FilesystemFrameStore, FrameStore, FrameStoreError};
pub use ingest::{FrameIngestor, ImagePayload, UploadReceipt};
pub use latest::{LatestFrame, LatestRegister};
pub use naming::{Clock, StorageKey, SystemClock};
