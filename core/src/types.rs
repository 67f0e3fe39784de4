//! Domain DTOs for the Cliniko attachment endpoints and the storage bucket.
//!
//! # Design
//! JSON types mirror the Cliniko API schema; `PostResponse` mirrors the XML
//! document an S3-compatible bucket returns for a presigned POST with
//! `success_action_status=201`. The mock-server crate defines its own copies
//! and the integration tests catch schema drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::HttpResponse;

/// A presigned upload target: where to POST the file and which signed form
/// fields to send with it. Good for a single upload attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadTarget {
    pub url: String,
    pub fields: UploadFields,
}

/// Signed form fields issued with an `UploadTarget`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadFields {
    pub acl: String,
    pub key: String,
    pub policy: String,
    pub success_action_status: String,
    #[serde(rename = "x-amz-algorithm")]
    pub x_amz_algorithm: String,
    #[serde(rename = "x-amz-credential")]
    pub x_amz_credential: String,
    #[serde(rename = "x-amz-signature")]
    pub x_amz_signature: String,
    #[serde(rename = "x-amz-date", default, skip_serializing_if = "Option::is_none")]
    pub x_amz_date: Option<String>,
}

/// Confirmation payload registering an uploaded object against a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachmentRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub patient_id: String,
    pub upload_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
}

/// A patient attachment as returned by `POST /patient_attachments`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientAttachment {
    pub id: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub links: Option<Links>,
}

/// Success document returned by the bucket on a 201 presigned POST.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct PostResponse {
    #[serde(rename = "Location", default)]
    pub location: String,
    #[serde(rename = "Bucket", default)]
    pub bucket: String,
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "ETag", default)]
    pub etag: String,
}

/// Result of the direct-to-storage upload.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub response: HttpResponse,
    /// Present only for a 201 response with an XML content type.
    pub post_response: Option<PostResponse>,
}

impl UploadOutcome {
    /// Raw response bytes as received from the bucket.
    pub fn body(&self) -> &[u8] {
        &self.response.body
    }
}
