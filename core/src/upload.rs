//! Request builder and response parser for the direct-to-bucket upload.
//!
//! Like `ClinikoClient`, nothing here performs I/O: `build_upload_request`
//! produces an `HttpRequest` for a `Transport` to execute and
//! `parse_upload_response` interprets what came back.

use std::io::Read;

use chrono::{DateTime, Utc};

use crate::error::AttachmentError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::multipart;
use crate::types::{PostResponse, UploadOutcome, UploadTarget};

/// Compact ISO-8601 basic format used by `x-amz-date`.
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub fn amz_date(at: DateTime<Utc>) -> String {
    at.format(AMZ_DATE_FORMAT).to_string()
}

/// Build the presigned POST carrying `content` as the `file` part.
///
/// `x-amz-date` comes from the target when the API issued one, otherwise
/// from `signed_at`.
pub fn build_upload_request<R: Read>(
    target: &UploadTarget,
    filename: &str,
    content: &mut R,
    signed_at: DateTime<Utc>,
) -> Result<HttpRequest, AttachmentError> {
    let fields = &target.fields;
    let date = fields
        .x_amz_date
        .clone()
        .unwrap_or_else(|| amz_date(signed_at));

    let form = multipart::encode(
        &[
            ("acl", fields.acl.as_str()),
            ("key", fields.key.as_str()),
            ("policy", fields.policy.as_str()),
            ("success_action_status", fields.success_action_status.as_str()),
            ("x-amz-algorithm", fields.x_amz_algorithm.as_str()),
            ("x-amz-credential", fields.x_amz_credential.as_str()),
            ("x-amz-signature", fields.x_amz_signature.as_str()),
            ("x-amz-date", date.as_str()),
        ],
        "file",
        filename,
        content,
    )
    .map_err(AttachmentError::FormBuild)?;

    Ok(HttpRequest {
        method: HttpMethod::Post,
        url: target.url.clone(),
        headers: vec![
            ("content-type".to_string(), form.content_type),
            ("accept".to_string(), "application/xml".to_string()),
        ],
        body: Some(form.body),
        timeout: None,
    })
}

/// Check the bucket's status against the target's `success_action_status`.
pub fn check_upload_status(target: &UploadTarget, response: &HttpResponse) -> Result<(), AttachmentError> {
    let expected = &target.fields.success_action_status;
    if response.status.to_string() == *expected {
        return Ok(());
    }
    Err(AttachmentError::UnexpectedUploadStatus {
        status: response.status,
        expected: expected.clone(),
        body: response.body_text(),
    })
}

/// Parse the bucket's response.
///
/// Only a 201 with an XML content type is parsed; anything else yields an
/// outcome without a `PostResponse`.
pub fn parse_upload_response(response: HttpResponse) -> Result<UploadOutcome, AttachmentError> {
    let is_xml = response
        .header("content-type")
        .is_some_and(|value| value.contains("xml"));

    let post_response = if is_xml && response.status == 201 {
        let parsed: PostResponse = quick_xml::de::from_reader(response.body.as_slice())
            .map_err(AttachmentError::MalformedUploadResponse)?;
        Some(parsed)
    } else {
        None
    };

    Ok(UploadOutcome {
        response,
        post_response,
    })
}

/// Fully qualified URL of an uploaded object.
pub fn upload_url(target: &UploadTarget, key: &str) -> String {
    format!("{}/{}", target.url, key)
}
