//! Stateless HTTP request builder and response parser for the Cliniko API.
//!
//! # Design
//! `ClinikoClient` holds the base URL and the header set every request
//! carries; it keeps no mutable state between calls. Each operation is split
//! into a `build_*` method that produces an `HttpRequest` and a `parse_*`
//! method that reads an `HttpResponse`. Executing the round-trip is left to
//! a `Transport` (see `Cliniko`).

use serde::de::DeserializeOwned;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{AttachmentRecord, PatientAttachment, UploadTarget};

/// Synchronous, stateless request builder for the Cliniko API.
#[derive(Debug, Clone)]
pub struct ClinikoClient {
    base_url: String,
    headers: Vec<(String, String)>,
}

impl ClinikoClient {
    pub fn new(config: &ClientConfig) -> Self {
        let mut headers = vec![
            ("authorization".to_string(), config.authorization()),
            ("accept".to_string(), "application/json".to_string()),
            ("user-agent".to_string(), config.user_agent()),
        ];
        headers.extend(config.extra_headers.iter().cloned());
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            headers,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn build_presigned_post(&self, patient_id: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!(
                "{}/patients/{patient_id}/attachment_presigned_post",
                self.base_url
            ),
            headers: self.headers.clone(),
            body: None,
            timeout: None,
        }
    }

    pub fn build_create_uploaded_patient_attachment(
        &self,
        input: &AttachmentRecord,
    ) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_vec(input).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        let mut headers = self.headers.clone();
        headers.push(("content-type".to_string(), "application/json".to_string()));
        Ok(HttpRequest {
            method: HttpMethod::Post,
            url: format!("{}/patient_attachments", self.base_url),
            headers,
            body: Some(body),
            timeout: None,
        })
    }

    pub fn parse_presigned_post(&self, response: &HttpResponse) -> Result<UploadTarget, ApiError> {
        check_status(response, 200)?;
        parse_json(response)
    }

    pub fn parse_create_uploaded_patient_attachment(
        &self,
        response: &HttpResponse,
    ) -> Result<PatientAttachment, ApiError> {
        check_status(response, 201)?;
        parse_json(response)
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound);
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body_text(),
    })
}

fn parse_json<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, ApiError> {
    serde_json::from_slice(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}
