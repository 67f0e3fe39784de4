//! The two API operations the attachment workflow depends on.
//!
//! # Design
//! `AttachmentApi` is a narrow capability: request an upload target, and
//! register an uploaded object. A call that produced no response (nothing
//! sent, or the transport failed) comes back as `Err`; a response that
//! arrived but lacks the typed success payload comes back as
//! `Ok(ApiResponse)` whose `result` is an `ApiError`. So an `ApiResponse`
//! always holds what the server actually sent. `Cliniko` implements the trait
//! by pairing `ClinikoClient` with any `Transport`.
//!
//! Each call takes an optional timeout that bounds that round-trip.

use crate::client::ClinikoClient;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ApiCallError, ApiError, TransportError};
use crate::http::HttpResponse;
use crate::transport::{Transport, UreqTransport};
use crate::types::{AttachmentRecord, PatientAttachment, UploadTarget};

/// A response from the API together with its typed interpretation.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub http: HttpResponse,
    pub result: Result<T, ApiError>,
}

impl<T> ApiResponse<T> {
    /// The typed success payload, if the API returned one.
    pub fn payload(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn status(&self) -> u16 {
        self.http.status
    }
}

pub trait AttachmentApi {
    /// `GET /patients/{patient_id}/attachment_presigned_post`
    fn presigned_post(
        &self,
        patient_id: &str,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse<UploadTarget>, TransportError>;

    /// `POST /patient_attachments`
    fn create_uploaded_patient_attachment(
        &self,
        record: &AttachmentRecord,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse<PatientAttachment>, ApiCallError>;
}

impl<A: AttachmentApi + ?Sized> AttachmentApi for &A {
    fn presigned_post(
        &self,
        patient_id: &str,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse<UploadTarget>, TransportError> {
        (**self).presigned_post(patient_id, timeout)
    }

    fn create_uploaded_patient_attachment(
        &self,
        record: &AttachmentRecord,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse<PatientAttachment>, ApiCallError> {
        (**self).create_uploaded_patient_attachment(record, timeout)
    }
}

/// A Cliniko API connection: request builder plus transport.
#[derive(Debug, Clone)]
pub struct Cliniko<T = UreqTransport> {
    client: ClinikoClient,
    transport: T,
}

impl Cliniko<UreqTransport> {
    /// Connect using a `ureq` transport honouring `config.timeout`.
    pub fn connect(config: &ClientConfig) -> Self {
        Self::with_transport(config, UreqTransport::new(config.timeout))
    }
}

impl<T: Transport> Cliniko<T> {
    pub fn with_transport(config: &ClientConfig, transport: T) -> Self {
        Self {
            client: ClinikoClient::new(config),
            transport,
        }
    }

    pub fn client(&self) -> &ClinikoClient {
        &self.client
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

impl<T: Transport> AttachmentApi for Cliniko<T> {
    fn presigned_post(
        &self,
        patient_id: &str,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse<UploadTarget>, TransportError> {
        let request = self.client.build_presigned_post(patient_id).with_timeout(timeout);
        let http = self.transport.execute(request)?;
        let result = self.client.parse_presigned_post(&http);
        Ok(ApiResponse { http, result })
    }

    fn create_uploaded_patient_attachment(
        &self,
        record: &AttachmentRecord,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse<PatientAttachment>, ApiCallError> {
        let request = self
            .client
            .build_create_uploaded_patient_attachment(record)
            .map_err(ApiCallError::Request)?
            .with_timeout(timeout);
        let http = self.transport.execute(request)?;
        let result = self.client.parse_create_uploaded_patient_attachment(&http);
        Ok(ApiResponse { http, result })
    }
}
