//! In-memory stand-in for the Cliniko attachment endpoints and the S3 bucket
//! they hand out presigned POST targets for.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Signature every presigned target carries; the bucket rejects anything else.
pub const MOCK_SIGNATURE: &str = "mock-signature";

const REQUIRED_FIELDS: [&str; 8] = [
    "acl",
    "key",
    "policy",
    "success_action_status",
    "x-amz-algorithm",
    "x-amz-credential",
    "x-amz-signature",
    "x-amz-date",
];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresignedPost {
    pub url: String,
    pub fields: PresignedFields,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresignedFields {
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
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self")]
    pub self_link: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatientAttachment {
    pub id: String,
    pub content_type: String,
    pub description: Option<String>,
    pub filename: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub links: Links,
}

#[derive(Deserialize)]
pub struct CreateAttachment {
    pub description: Option<String>,
    pub patient_id: String,
    pub upload_url: String,
}

/// An object accepted by the bucket.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub key: String,
    pub filename: String,
    pub content: Vec<u8>,
    pub fields: HashMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename = "PostResponse")]
struct PostResponseXml {
    #[serde(rename = "Location")]
    location: String,
    #[serde(rename = "Bucket")]
    bucket: String,
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "ETag")]
    etag: String,
}

#[derive(Serialize)]
#[serde(rename = "Error")]
struct S3ErrorXml {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
}

/// Server state shared by the API and bucket routes.
#[derive(Debug)]
pub struct Store {
    pub base_url: String,
    pub patients: HashSet<String>,
    pub success_action_status: String,
    /// When set, the bucket answers every upload with 403.
    pub reject_uploads: bool,
    pub objects: HashMap<String, StoredObject>,
    pub attachments: Vec<PatientAttachment>,
    next_id: u64,
}

impl Store {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            patients: HashSet::new(),
            success_action_status: "201".to_string(),
            reject_uploads: false,
            objects: HashMap::new(),
            attachments: Vec::new(),
            next_id: 1,
        }
    }

    pub fn with_patient(mut self, patient_id: &str) -> Self {
        self.patients.insert(patient_id.to_string());
        self
    }

    pub fn with_success_action_status(mut self, status: &str) -> Self {
        self.success_action_status = status.to_string();
        self
    }

    pub fn rejecting_uploads(mut self) -> Self {
        self.reject_uploads = true;
        self
    }

    pub fn shared(self) -> Db {
        Arc::new(RwLock::new(self))
    }

    pub fn bucket_url(&self) -> String {
        format!("{}/bucket", self.base_url)
    }
}

pub type Db = Arc<RwLock<Store>>;

pub fn app(db: Db) -> Router {
    Router::new()
        .route(
            "/patients/{id}/attachment_presigned_post",
            get(presigned_post),
        )
        .route("/patient_attachments", post(create_attachment))
        .route("/bucket", post(upload_object))
        .with_state(db)
}

/// Serve `db` on `listener`. The store's `base_url` should be the listener's
/// address so presigned targets point back at this server.
pub async fn run_with(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app(db)).await
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("Basic "))
}

fn json_message(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}

fn s3_error(status: StatusCode, code: &str, message: &str) -> Response {
    let body = S3ErrorXml {
        code: code.to_string(),
        message: message.to_string(),
    };
    match quick_xml::se::to_string(&body) {
        Ok(xml) => (status, [(header::CONTENT_TYPE, "application/xml")], xml).into_response(),
        Err(_) => status.into_response(),
    }
}

async fn presigned_post(
    State(db): State<Db>,
    Path(patient_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return json_message(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let store = db.read().await;
    if !store.patients.contains(&patient_id) {
        return json_message(StatusCode::NOT_FOUND, "Not found");
    }
    let now = Utc::now();
    let target = PresignedPost {
        url: store.bucket_url(),
        fields: PresignedFields {
            acl: "private".to_string(),
            key: format!(
                "patients/{patient_id}/attachments/{}/${{filename}}",
                Uuid::new_v4().simple()
            ),
            policy: "eyJjb25kaXRpb25zIjpbXX0=".to_string(),
            success_action_status: store.success_action_status.clone(),
            x_amz_algorithm: "AWS4-HMAC-SHA256".to_string(),
            x_amz_credential: format!(
                "MOCKACCESSKEY/{}/ap-southeast-2/s3/aws4_request",
                now.format("%Y%m%d")
            ),
            x_amz_signature: MOCK_SIGNATURE.to_string(),
        },
    };
    tracing::debug!(patient_id = %patient_id, key = %target.fields.key, "issued presigned post");
    (StatusCode::OK, Json(target)).into_response()
}

fn is_amz_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 16
        && bytes[8] == b'T'
        && bytes[15] == b'Z'
        && bytes[..8].iter().chain(&bytes[9..15]).all(u8::is_ascii_digit)
}

async fn upload_object(State(db): State<Db>, mut multipart: Multipart) -> Response {
    let mut fields = HashMap::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                return s3_error(StatusCode::BAD_REQUEST, "MalformedPOSTRequest", &err.to_string())
            }
        };
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            match field.bytes().await {
                Ok(bytes) => file = Some((filename, bytes.to_vec())),
                Err(err) => {
                    return s3_error(StatusCode::BAD_REQUEST, "MalformedPOSTRequest", &err.to_string())
                }
            }
            // S3 ignores everything after the file part.
            break;
        }
        match field.text().await {
            Ok(value) => {
                fields.insert(name, value);
            }
            Err(err) => {
                return s3_error(StatusCode::BAD_REQUEST, "MalformedPOSTRequest", &err.to_string())
            }
        }
    }

    let mut store = db.write().await;
    if store.reject_uploads {
        return s3_error(StatusCode::FORBIDDEN, "AccessDenied", "Access Denied");
    }
    if let Some(missing) = REQUIRED_FIELDS.iter().find(|name| !fields.contains_key(**name)) {
        return s3_error(
            StatusCode::BAD_REQUEST,
            "InvalidArgument",
            &format!("Bucket POST must contain a field named '{missing}'"),
        );
    }
    if fields["x-amz-signature"] != MOCK_SIGNATURE {
        return s3_error(
            StatusCode::FORBIDDEN,
            "SignatureDoesNotMatch",
            "The request signature we calculated does not match the signature you provided",
        );
    }
    if !is_amz_date(&fields["x-amz-date"]) {
        return s3_error(StatusCode::BAD_REQUEST, "InvalidArgument", "X-Amz-Date must be in ISO8601 basic format");
    }
    let Some((filename, content)) = file else {
        return s3_error(
            StatusCode::BAD_REQUEST,
            "InvalidArgument",
            "POST requires exactly one file upload per request.",
        );
    };

    let key = fields["key"].replace("${filename}", &filename);
    let status = fields["success_action_status"].clone();
    let location = format!("{}/{}", store.bucket_url(), key);
    tracing::debug!(key = %key, bytes = content.len(), "stored object");
    store.objects.insert(
        key.clone(),
        StoredObject {
            key: key.clone(),
            filename,
            content,
            fields,
        },
    );

    match status.as_str() {
        "201" => {
            let body = PostResponseXml {
                location,
                bucket: "bucket".to_string(),
                key,
                etag: format!("\"{}\"", Uuid::new_v4().simple()),
            };
            match quick_xml::se::to_string(&body) {
                Ok(xml) => (
                    StatusCode::CREATED,
                    [(header::CONTENT_TYPE, "application/xml")],
                    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{xml}"),
                )
                    .into_response(),
                Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            }
        }
        "200" => StatusCode::OK.into_response(),
        _ => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn create_attachment(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<CreateAttachment>,
) -> Response {
    if !authorized(&headers) {
        return json_message(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let mut store = db.write().await;
    if !store.patients.contains(&input.patient_id) {
        return json_message(StatusCode::UNPROCESSABLE_ENTITY, "patient does not exist");
    }
    let prefix = format!("{}/", store.bucket_url());
    let Some(object) = input
        .upload_url
        .strip_prefix(&prefix)
        .and_then(|key| store.objects.get(key))
    else {
        return json_message(StatusCode::UNPROCESSABLE_ENTITY, "upload_url is not a stored object");
    };

    let now = Utc::now();
    let id = store.next_id.to_string();
    let attachment = PatientAttachment {
        id: id.clone(),
        content_type: "application/octet-stream".to_string(),
        description: input.description,
        filename: object.filename.clone(),
        size: object.content.len() as u64,
        created_at: now,
        updated_at: now,
        links: Links {
            self_link: format!("{}/patient_attachments/{id}", store.base_url),
        },
    };
    store.next_id += 1;
    store.attachments.push(attachment.clone());
    (StatusCode::CREATED, Json(attachment)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presigned_post_serializes_dashed_fields() {
        let target = PresignedPost {
            url: "http://mock/bucket".to_string(),
            fields: PresignedFields {
                acl: "private".to_string(),
                key: "k".to_string(),
                policy: "p".to_string(),
                success_action_status: "201".to_string(),
                x_amz_algorithm: "AWS4-HMAC-SHA256".to_string(),
                x_amz_credential: "c".to_string(),
                x_amz_signature: MOCK_SIGNATURE.to_string(),
            },
        };
        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(json["fields"]["x-amz-signature"], MOCK_SIGNATURE);
        assert_eq!(json["fields"]["success_action_status"], "201");
    }

    #[test]
    fn post_response_xml_uses_s3_element_names() {
        let xml = quick_xml::se::to_string(&PostResponseXml {
            location: "http://mock/bucket/k".to_string(),
            bucket: "bucket".to_string(),
            key: "k".to_string(),
            etag: "\"e\"".to_string(),
        })
        .unwrap();
        assert!(xml.starts_with("<PostResponse>"));
        assert!(xml.contains("<Key>k</Key>"));
        assert!(xml.contains("<ETag>"));
    }

    #[test]
    fn amz_date_validation() {
        assert!(is_amz_date("20240101T000000Z"));
        assert!(!is_amz_date("2024-01-01T00:00:00Z"));
        assert!(!is_amz_date("20240101T0000Z"));
    }

    #[test]
    fn create_attachment_accepts_missing_description() {
        let input: CreateAttachment =
            serde_json::from_str(r#"{"patient_id":"1","upload_url":"http://mock/bucket/k"}"#).unwrap();
        assert!(input.description.is_none());
    }

    #[test]
    fn store_builder_seeds_patients() {
        let store = Store::new("http://mock/").with_patient("1001").rejecting_uploads();
        assert!(store.patients.contains("1001"));
        assert!(store.reject_uploads);
        assert_eq!(store.bucket_url(), "http://mock/bucket");
    }
}
