//! Synchronous Cliniko API client core with the attachment upload workflow.
//!
//! # Overview
//! Creating a patient attachment in Cliniko takes three calls: ask the API
//! for a presigned bucket target, POST the file straight to the bucket, then
//! register the stored object with the API. `AttachmentUploader` runs that
//! sequence and returns an `AttachmentReport` carrying every intermediate
//! result, whichever step it stopped at.
//!
//! # Design
//! - `ClinikoClient` and the `upload` functions only build `HttpRequest`s
//!   and parse `HttpResponse`s (host-does-IO); `Transport` does the I/O.
//! - The workflow depends on the narrow `AttachmentApi` capability, so it
//!   can be driven by a fake in tests and by `Cliniko` in production.
//! - No retries, no caching, no compensation for orphaned uploads.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod multipart;
pub mod transport;
pub mod types;
pub mod upload;
pub mod workflow;

pub use api::{ApiResponse, AttachmentApi, Cliniko};
pub use client::ClinikoClient;
pub use config::{ClientConfig, ConfigError};
pub use error::{ApiCallError, ApiError, AttachmentError, AttachmentStep, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use transport::{Transport, UreqTransport};
pub use types::{
    AttachmentRecord, Links, PatientAttachment, PostResponse, UploadFields, UploadOutcome, UploadTarget,
};
pub use workflow::{AttachmentOutcome, AttachmentReport, AttachmentUploader, NewAttachment};
