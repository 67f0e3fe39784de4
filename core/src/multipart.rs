//! `multipart/form-data` body for the presigned storage POST.
//!
//! Encoding is done by ureq's form writer; the result is buffered into bytes
//! so it can travel in an `HttpRequest` like any other body. Parts keep
//! insertion order and S3-compatible buckets ignore any field after `file`,
//! so the file part always goes last.

use std::io::{self, Read};

use ureq::unversioned::multipart::{Form, Part};

/// `Content-Type` of the file part.
pub const FILE_CONTENT_TYPE: &str = "application/octet-stream";

/// An encoded form body and the `Content-Type` header naming its boundary.
#[derive(Debug, Clone)]
pub struct EncodedForm {
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Encode `fields` in order, then a `file_field` part carrying `content`
/// under `file_name`.
pub fn encode<R: Read>(
    fields: &[(&str, &str)],
    file_field: &str,
    file_name: &str,
    content: &mut R,
) -> io::Result<EncodedForm> {
    let file = Part::reader(content)
        .file_name(&escape_file_name(file_name))
        .mime_str(FILE_CONTENT_TYPE)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

    let mut form = fields
        .iter()
        .fold(Form::new(), |form, &(name, value)| form.text(name, value))
        .part(file_field, file);

    let content_type = format!("multipart/form-data; boundary={}", form.boundary());
    let mut body = Vec::new();
    form.read_to_end(&mut body)?;
    Ok(EncodedForm { content_type, body })
}

/// Percent-encode CR, LF and `"` so a caller-supplied name cannot end the
/// quoted `filename` parameter or the `Content-Disposition` header.
/// Everything else, non-ASCII included, passes through unchanged.
pub fn escape_file_name(name: &str) -> String {
    name.replace('\r', "%0D").replace('\n', "%0A").replace('"', "%22")
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;

    struct ParsedPart {
        name: String,
        file_name: Option<String>,
        content_type: Option<String>,
        data: Vec<u8>,
    }

    async fn parse(body: Vec<u8>, content_type: &str) -> Vec<ParsedPart> {
        let boundary = multer::parse_boundary(content_type).unwrap();
        let stream =
            futures_util::stream::once(async move { Ok::<_, Infallible>(bytes::Bytes::from(body)) });
        let mut multipart = multer::Multipart::new(stream, boundary);
        let mut parts = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(|mime| mime.to_string());
            let data = field.bytes().await.unwrap().to_vec();
            parts.push(ParsedPart {
                name,
                file_name,
                content_type,
                data,
            });
        }
        parts
    }

    #[test]
    fn content_type_names_the_boundary() {
        let form = encode(&[("acl", "private")], "file", "a.txt", &mut &b"hi"[..]).unwrap();
        let boundary = form.content_type.strip_prefix("multipart/form-data; boundary=").unwrap();
        let body = String::from_utf8(form.body).unwrap();
        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn random_boundaries_differ() {
        let a = encode(&[], "file", "f", &mut &b""[..]).unwrap();
        let b = encode(&[], "file", "f", &mut &b""[..]).unwrap();
        assert_ne!(a.content_type, b.content_type);
    }

    #[test]
    fn file_part_is_last_and_typed() {
        let form = encode(&[("acl", "private")], "file", "a.txt", &mut &b"hi"[..]).unwrap();
        let body = String::from_utf8(form.body).unwrap();
        let acl_at = body.find("name=\"acl\"").unwrap();
        let file_at = body
            .find("name=\"file\"; filename=\"a.txt\"\r\nContent-Type: application/octet-stream\r\n\r\nhi")
            .unwrap();
        assert!(acl_at < file_at);
    }

    #[test]
    fn header_breaking_file_names_are_escaped() {
        assert_eq!(escape_file_name("a.txt\r\nX-Injected: 1"), "a.txt%0D%0AX-Injected: 1");
        assert_eq!(escape_file_name("say \"hi\".txt"), "say %22hi%22.txt");
        assert_eq!(escape_file_name("résumé.pdf"), "résumé.pdf");
    }

    #[test]
    fn read_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            }
        }
        let err = encode(&[], "file", "f", &mut Broken).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn fields_and_file_survive_a_round_trip() {
        let fields = [
            ("acl", "private"),
            ("key", "patients/1/${filename}"),
            ("policy", "eyJleHBpcmF0aW9uIjoiMjAyNC0wMS0wMVQwMDowMDowMFoifQ=="),
            ("success_action_status", "201"),
            ("x-amz-algorithm", "AWS4-HMAC-SHA256"),
        ];
        let form = encode(&fields, "file", "filename", &mut &[0x00u8][..]).unwrap();

        let parts = parse(form.body, &form.content_type).await;

        assert_eq!(parts.len(), fields.len() + 1);
        for ((name, value), part) in fields.iter().zip(&parts) {
            assert_eq!(&part.name, name);
            assert_eq!(part.data, value.as_bytes());
            assert!(part.file_name.is_none());
        }
        let file = parts.last().unwrap();
        assert_eq!(file.name, "file");
        assert_eq!(file.file_name.as_deref(), Some("filename"));
        assert_eq!(file.content_type.as_deref(), Some(FILE_CONTENT_TYPE));
        assert_eq!(file.data, vec![0x00]);
    }

    #[tokio::test]
    async fn file_name_with_line_breaks_keeps_its_part_intact() {
        let form = encode(
            &[("acl", "private")],
            "file",
            "a.txt\r\nX-Injected: 1",
            &mut &b"x"[..],
        )
        .unwrap();

        let parts = parse(form.body, &form.content_type).await;

        assert_eq!(parts.len(), 2);
        let file = &parts[1];
        assert_eq!(file.name, "file");
        assert_eq!(file.file_name.as_deref(), Some("a.txt%0D%0AX-Injected: 1"));
        assert_eq!(file.data, b"x");
    }

    #[tokio::test]
    async fn binary_content_is_not_transcoded() {
        let content: Vec<u8> = (0..=255u8).chain([b'\r', b'\n', b'-', b'-']).collect();
        let form = encode(&[], "file", "blob.bin", &mut content.as_slice()).unwrap();
        let parts = parse(form.body, &form.content_type).await;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].data, content);
    }
}
