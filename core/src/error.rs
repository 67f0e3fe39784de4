//! Error types for the Cliniko client.
//!
//! # Design
//! Three layers, matching the three ways a call can go wrong:
//! - `TransportError`: the remote side could not be reached at all.
//! - `ApiError`: the API answered, but not with the expected typed payload.
//!   `ApiCallError` wraps it when a request could not even be built.
//! - `AttachmentError`: the upload workflow failed, tagged with the step.

use std::fmt;

use thiserror::Error;

/// The request never produced an HTTP response.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("transport error: {0}")]
    Other(String),
}

/// Errors returned by `ClinikoClient` parse methods.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The server returned 404 (unknown patient or endpoint).
    #[error("resource not found")]
    NotFound,

    /// The server returned a status other than the expected one.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    #[error("serialization failed: {0}")]
    SerializationError(String),
}

/// Failure to obtain any response from an API call.
#[derive(Debug, Clone, Error)]
pub enum ApiCallError {
    /// The request could not be built, so nothing was sent.
    #[error("could not build request: {0}")]
    Request(#[source] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The three remote calls of the attachment workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentStep {
    PresignedPost,
    StorageUpload,
    CreateAttachment,
}

impl fmt::Display for AttachmentStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentStep::PresignedPost => write!(f, "presigned post"),
            AttachmentStep::StorageUpload => write!(f, "storage upload"),
            AttachmentStep::CreateAttachment => write!(f, "create attachment"),
        }
    }
}

/// Failure of the attachment upload workflow.
#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("presigned post request failed: {0}")]
    PresignedPostTransport(#[source] TransportError),

    #[error("presigned post request was unsuccessful: {0}")]
    PresignedPostRejected(#[source] ApiError),

    #[error("could not build storage upload form: {0}")]
    FormBuild(#[source] std::io::Error),

    #[error("storage upload failed: {0}")]
    UploadTransport(#[source] TransportError),

    #[error(
        "status code of storage response not correct: {status}, expected {expected}, response body: {body}"
    )]
    UnexpectedUploadStatus {
        status: u16,
        expected: String,
        body: String,
    },

    #[error("storage response could not be parsed: {0}")]
    MalformedUploadResponse(#[source] quick_xml::DeError),

    #[error("storage upload was unsuccessful: no PostResponse document")]
    MissingPostResponse,

    #[error("storage response did not report an object key")]
    MissingObjectKey,

    #[error("attachment creation request could not be built: {0}")]
    CreateAttachmentRequest(#[source] ApiError),

    #[error("attachment creation request failed: {0}")]
    CreateAttachmentTransport(#[source] TransportError),

    #[error("post attachment request was unsuccessful: {0}")]
    CreateAttachmentRejected(#[source] ApiError),

    #[error("deadline exceeded before {step}")]
    DeadlineExceeded { step: AttachmentStep },
}

impl AttachmentError {
    /// The workflow step this error stopped at.
    pub fn step(&self) -> AttachmentStep {
        match self {
            AttachmentError::PresignedPostTransport(_) | AttachmentError::PresignedPostRejected(_) => {
                AttachmentStep::PresignedPost
            }
            AttachmentError::FormBuild(_)
            | AttachmentError::UploadTransport(_)
            | AttachmentError::UnexpectedUploadStatus { .. }
            | AttachmentError::MalformedUploadResponse(_)
            | AttachmentError::MissingPostResponse
            | AttachmentError::MissingObjectKey => AttachmentStep::StorageUpload,
            AttachmentError::CreateAttachmentRequest(_)
            | AttachmentError::CreateAttachmentTransport(_)
            | AttachmentError::CreateAttachmentRejected(_) => AttachmentStep::CreateAttachment,
            AttachmentError::DeadlineExceeded { step } => *step,
        }
    }

    /// True when the remote side was never reached for the failing step.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AttachmentError::PresignedPostTransport(_)
                | AttachmentError::UploadTransport(_)
                | AttachmentError::CreateAttachmentTransport(_)
        )
    }
}
