//! Three-call attachment upload: presigned target, bucket upload, confirmation.
//!
//! # Design
//! `AttachmentUploader` depends only on `AttachmentApi` (the two Cliniko
//! calls) and a `Transport` (the bucket). The steps run strictly in order,
//! since each one consumes what the previous one produced. Whatever the
//! outcome, the caller gets an `AttachmentReport` holding every value the
//! completed steps produced, so a failure can be diagnosed without extra
//! instrumentation.
//!
//! There is no compensation: if the confirmation fails after the bucket
//! accepted the file, the object is left orphaned and a warning is logged
//! with its URL.

use std::io::Read;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::api::{ApiResponse, AttachmentApi, Cliniko};
use crate::error::{ApiCallError, AttachmentError, AttachmentStep, TransportError};
use crate::transport::Transport;
use crate::types::{AttachmentRecord, PatientAttachment, UploadOutcome, UploadTarget};
use crate::upload::{build_upload_request, check_upload_status, parse_upload_response, upload_url};

/// Caller input for one attachment upload.
#[derive(Debug)]
pub struct NewAttachment<R> {
    pub patient_id: String,
    pub description: Option<String>,
    pub filename: String,
    pub content: R,
    /// Checked before each step and passed to each call as its timeout; a
    /// passed deadline stops the workflow.
    pub deadline: Option<Instant>,
}

impl<R: Read> NewAttachment<R> {
    pub fn new(patient_id: impl Into<String>, filename: impl Into<String>, content: R) -> Self {
        Self {
            patient_id: patient_id.into(),
            description: None,
            filename: filename.into(),
            content,
            deadline: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug)]
pub enum AttachmentOutcome {
    Created(PatientAttachment),
    Failed(AttachmentError),
}

/// Everything the workflow produced, up to the point it stopped.
#[derive(Debug)]
pub struct AttachmentReport {
    /// Step 1 response. Present whenever the API was reached.
    pub presigned_post: Option<ApiResponse<UploadTarget>>,
    /// Step 2 outcome. Present once the bucket answered with the expected
    /// status and its body was read.
    pub upload: Option<UploadOutcome>,
    /// `{target url}/{stored key}`, once the bucket reported a key.
    pub upload_url: Option<String>,
    /// Step 3 response. Present whenever the API was reached.
    pub attachment: Option<ApiResponse<PatientAttachment>>,
    pub outcome: AttachmentOutcome,
}

impl AttachmentReport {
    pub fn is_created(&self) -> bool {
        matches!(self.outcome, AttachmentOutcome::Created(_))
    }

    pub fn error(&self) -> Option<&AttachmentError> {
        match &self.outcome {
            AttachmentOutcome::Failed(err) => Some(err),
            AttachmentOutcome::Created(_) => None,
        }
    }

    pub fn failed_step(&self) -> Option<AttachmentStep> {
        self.error().map(AttachmentError::step)
    }

    pub fn target(&self) -> Option<&UploadTarget> {
        self.presigned_post.as_ref().and_then(ApiResponse::payload)
    }

    pub fn into_result(self) -> Result<PatientAttachment, AttachmentError> {
        match self.outcome {
            AttachmentOutcome::Created(attachment) => Ok(attachment),
            AttachmentOutcome::Failed(err) => Err(err),
        }
    }
}

#[derive(Default)]
struct Progress {
    presigned_post: Option<ApiResponse<UploadTarget>>,
    upload: Option<UploadOutcome>,
    upload_url: Option<String>,
    attachment: Option<ApiResponse<PatientAttachment>>,
}

impl Progress {
    fn finish(self, result: Result<PatientAttachment, AttachmentError>) -> AttachmentReport {
        AttachmentReport {
            presigned_post: self.presigned_post,
            upload: self.upload,
            upload_url: self.upload_url,
            attachment: self.attachment,
            outcome: match result {
                Ok(attachment) => AttachmentOutcome::Created(attachment),
                Err(err) => AttachmentOutcome::Failed(err),
            },
        }
    }
}

/// Runs the attachment workflow against an API and a storage transport.
#[derive(Debug, Clone)]
pub struct AttachmentUploader<A, S> {
    api: A,
    storage: S,
}

impl<A: AttachmentApi, S: Transport> AttachmentUploader<A, S> {
    pub fn new(api: A, storage: S) -> Self {
        Self { api, storage }
    }

    /// Upload `input.content` and attach it to `input.patient_id`.
    pub fn create_attachment<R: Read>(&self, mut input: NewAttachment<R>) -> AttachmentReport {
        let _span = tracing::info_span!(
            "create_attachment",
            patient_id = %input.patient_id,
            filename = %input.filename
        )
        .entered();

        let mut progress = Progress::default();
        let result = self.run(&mut input, &mut progress);
        progress.finish(result)
    }

    fn run<R: Read>(
        &self,
        input: &mut NewAttachment<R>,
        progress: &mut Progress,
    ) -> Result<PatientAttachment, AttachmentError> {
        let step = AttachmentStep::PresignedPost;
        check_deadline(input.deadline, step)?;
        let presigned = self
            .api
            .presigned_post(&input.patient_id, remaining(input.deadline))
            .map_err(|err| transport_failure(input.deadline, step, err))?;
        let target = presigned.result.as_ref().cloned().map_err(Clone::clone);
        progress.presigned_post = Some(presigned);
        let target = target.map_err(AttachmentError::PresignedPostRejected)?;

        let step = AttachmentStep::StorageUpload;
        check_deadline(input.deadline, step)?;
        let request = build_upload_request(&target, &input.filename, &mut input.content, Utc::now())?
            .with_timeout(remaining(input.deadline));
        let response = self
            .storage
            .execute(request)
            .map_err(|err| transport_failure(input.deadline, step, err))?;
        check_upload_status(&target, &response)?;
        let upload = parse_upload_response(response)?;
        let key = upload.post_response.as_ref().map(|post| post.key.clone());
        progress.upload = Some(upload);
        let key = key.ok_or(AttachmentError::MissingPostResponse)?;
        if key.is_empty() {
            return Err(AttachmentError::MissingObjectKey);
        }
        let url = upload_url(&target, &key);
        progress.upload_url = Some(url.clone());

        let confirmed = self.confirm(input, url.clone(), progress);
        if let Err(err) = &confirmed {
            tracing::warn!(upload_url = %url, error = %err, "uploaded object is orphaned, attachment was not created");
        }
        confirmed
    }

    fn confirm<R: Read>(
        &self,
        input: &NewAttachment<R>,
        url: String,
        progress: &mut Progress,
    ) -> Result<PatientAttachment, AttachmentError> {
        let step = AttachmentStep::CreateAttachment;
        check_deadline(input.deadline, step)?;
        let record = AttachmentRecord {
            description: input.description.clone(),
            patient_id: input.patient_id.clone(),
            upload_url: url,
        };
        let response = self
            .api
            .create_uploaded_patient_attachment(&record, remaining(input.deadline))
            .map_err(|err| match err {
                ApiCallError::Request(err) => AttachmentError::CreateAttachmentRequest(err),
                ApiCallError::Transport(err) => transport_failure(input.deadline, step, err),
            })?;
        let attachment = response.result.as_ref().cloned().map_err(Clone::clone);
        progress.attachment = Some(response);
        let attachment = attachment.map_err(AttachmentError::CreateAttachmentRejected)?;

        tracing::info!(attachment_id = %attachment.id, "attachment created");
        Ok(attachment)
    }
}

impl<T: Transport> Cliniko<T> {
    /// Run the attachment workflow, uploading through this connection's
    /// transport.
    pub fn create_attachment<R: Read>(&self, input: NewAttachment<R>) -> AttachmentReport {
        AttachmentUploader::new(self, self.transport()).create_attachment(input)
    }
}

fn check_deadline(deadline: Option<Instant>, step: AttachmentStep) -> Result<(), AttachmentError> {
    if is_past(deadline) {
        return Err(AttachmentError::DeadlineExceeded { step });
    }
    Ok(())
}

fn is_past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Time left before `deadline`, used as the timeout of the next call.
fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

/// A call cut short by the deadline reports the deadline, not the transport.
fn transport_failure(deadline: Option<Instant>, step: AttachmentStep, err: TransportError) -> AttachmentError {
    if matches!(err, TransportError::Timeout) && is_past(deadline) {
        return AttachmentError::DeadlineExceeded { step };
    }
    match step {
        AttachmentStep::PresignedPost => AttachmentError::PresignedPostTransport(err),
        AttachmentStep::StorageUpload => AttachmentError::UploadTransport(err),
        AttachmentStep::CreateAttachment => AttachmentError::CreateAttachmentTransport(err),
    }
}
