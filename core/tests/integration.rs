//! Full attachment workflow against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then runs `Cliniko` with the
//! `ureq` transport over real HTTP: presigned post, multipart upload to the
//! mock bucket, and confirmation. The shared store is inspected afterwards
//! to check what actually landed on the server side.

use std::time::Duration;

use cliniko_core::{
    AttachmentError, AttachmentStep, ClientConfig, Cliniko, NewAttachment, TransportError,
};
use mock_server::{Db, Store};

/// Start the mock server with a store built for its own base URL.
fn start(store: impl FnOnce(&str) -> Store) -> (String, Db) {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    let base_url = format!("http://{addr}");
    let db = store(&base_url).shared();
    let server_db = db.clone();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with(listener, server_db).await
        })
        .unwrap();
    });

    (base_url, db)
}

fn connect(base_url: &str) -> Cliniko {
    let config = ClientConfig::new("MS0xLWFiY2RlZg-au1", "Integration", "dev@acme.test")
        .with_base_url(base_url)
        .with_timeout(Duration::from_secs(10));
    Cliniko::connect(&config)
}

#[test]
fn attachment_lifecycle() {
    let (base_url, db) = start(|base| Store::new(base).with_patient("1001"));
    let cliniko = connect(&base_url);

    let input = NewAttachment::new("1001", "filename", &b"\x00"[..]).description("Scanned referral");
    let report = cliniko.create_attachment(input);

    assert!(report.is_created(), "workflow failed: {:?}", report.error());

    // The upload URL is the target URL joined with the key the bucket reported.
    let target = report.target().unwrap().clone();
    assert_eq!(target.url, format!("{base_url}/bucket"));
    let post = report.upload.as_ref().unwrap().post_response.clone().unwrap();
    assert!(post.key.ends_with("/filename"));
    assert_eq!(
        report.upload_url.as_deref(),
        Some(format!("{}/{}", target.url, post.key).as_str())
    );

    let attachment = report.into_result().unwrap();
    assert_eq!(attachment.filename.as_deref(), Some("filename"));
    assert_eq!(attachment.size, Some(1));
    assert_eq!(attachment.description.as_deref(), Some("Scanned referral"));
    assert!(attachment.created_at.is_some());

    let store = db.blocking_read();
    let object = &store.objects[&post.key];
    assert_eq!(object.content, vec![0x00]);
    assert_eq!(object.fields["success_action_status"], "201");
    assert_eq!(object.fields["x-amz-date"].len(), 16);
    assert_eq!(store.attachments.len(), 1);
}

#[test]
fn unknown_patient_never_reaches_the_bucket() {
    let (base_url, db) = start(|base| Store::new(base).with_patient("1001"));
    let cliniko = connect(&base_url);

    let report = cliniko.create_attachment(NewAttachment::new("9999", "scan.pdf", &b"%PDF"[..]));

    assert_eq!(report.failed_step(), Some(AttachmentStep::PresignedPost));
    assert!(matches!(
        report.error(),
        Some(AttachmentError::PresignedPostRejected(cliniko_core::ApiError::NotFound))
    ));
    assert_eq!(report.presigned_post.as_ref().unwrap().status(), 404);
    assert!(report.upload.is_none());
    assert!(db.blocking_read().objects.is_empty());
}

#[test]
fn denied_upload_reports_bucket_response() {
    let (base_url, db) = start(|base| Store::new(base).with_patient("1001").rejecting_uploads());
    let cliniko = connect(&base_url);

    let report = cliniko.create_attachment(NewAttachment::new("1001", "scan.pdf", &b"%PDF"[..]));

    match report.error() {
        Some(AttachmentError::UnexpectedUploadStatus {
            status,
            expected,
            body,
        }) => {
            assert_eq!(*status, 403);
            assert_eq!(expected, "201");
            assert!(body.contains("AccessDenied"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(report.attachment.is_none());
    assert!(db.blocking_read().attachments.is_empty());
}

#[test]
fn bucket_without_post_response_leaves_object_unregistered() {
    let (base_url, db) = start(|base| {
        Store::new(base)
            .with_patient("1001")
            .with_success_action_status("200")
    });
    let cliniko = connect(&base_url);

    let report = cliniko.create_attachment(NewAttachment::new("1001", "scan.pdf", &b"%PDF"[..]));

    assert!(matches!(report.error(), Some(AttachmentError::MissingPostResponse)));
    assert_eq!(report.upload.as_ref().unwrap().response.status, 200);
    let store = db.blocking_read();
    assert_eq!(store.objects.len(), 1);
    assert!(store.attachments.is_empty());
}

#[test]
fn unreachable_api_is_a_transport_error() {
    // Bind then drop to get a port with nothing listening on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let cliniko = connect(&format!("http://127.0.0.1:{port}"));

    let report = cliniko.create_attachment(NewAttachment::new("1001", "scan.pdf", &b"%PDF"[..]));

    let err = report.error().unwrap();
    assert!(err.is_transport(), "expected transport error, got {err}");
    assert!(matches!(
        err,
        AttachmentError::PresignedPostTransport(
            TransportError::Connection(_) | TransportError::Other(_)
        )
    ));
    assert!(report.presigned_post.is_none());
}
