//! Multipart form ingestion with a per-field size limit.
//!
//! Encrypted uploads put the whole file, base64-encoded and sealed, into a
//! single text field, so the limit has to be well above the largest stored file.

use {
    bytes::{Bytes, BytesMut},
    futures_util::Stream,
    multer::Multipart,
    std::error::Error as StdError,
    thiserror::Error,
    tracing::debug,
};

pub use crate::config::DEFAULT_MAX_PART_SIZE as MAX_PART_SIZE;

/// Limits on the number of file parts and of text parts in one form.
pub const MAX_FILES: usize = 1000;
pub const MAX_FIELDS: usize = 1000;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("File too large. Maximum size is {limit} bytes per form field.")]
    PayloadTooLarge { field: Option<String>, limit: u64 },
    #[error("Form parsing failed: {0}")]
    MalformedForm(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    data: Bytes,
}

impl UploadedFile {
    #[must_use]
    pub fn read(&self) -> Bytes {
        self.data.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Text(String),
    File(UploadedFile),
}

/// Parsed fields in the order they were received. Duplicate names are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<(String, FormValue)>,
}

impl FormData {
    /// First field called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            FormValue::Text(text) => Some(text),
            FormValue::File(_) => None,
        }
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        match self.get(name)? {
            FormValue::File(file) => Some(file),
            FormValue::Text(_) => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn form_error(err: multer::Error) -> FormError {
    match err {
        multer::Error::FieldSizeExceeded { limit, field_name } => FormError::PayloadTooLarge {
            field: field_name,
            limit,
        },
        multer::Error::StreamSizeExceeded { limit } => {
            FormError::PayloadTooLarge { field: None, limit }
        }
        other => FormError::MalformedForm(other.to_string()),
    }
}

/// Reads a whole `multipart/form-data` body.
///
/// Fails with [`FormError::PayloadTooLarge`] as soon as any single field grows
/// beyond `max_part_bytes`; a field of exactly `max_part_bytes` is accepted.
/// Parts with a filename become [`FormValue::File`], others must be UTF-8 text.
/// More than [`MAX_FILES`] file parts or [`MAX_FIELDS`] text parts make the
/// form malformed.
pub async fn ingest_multipart<S, O, E>(
    content_type: Option<&str>,
    body: S,
    max_part_bytes: u64,
) -> Result<FormData, FormError>
where
    S: Stream<Item = Result<O, E>> + Send + 'static,
    O: Into<Bytes> + 'static,
    E: Into<Box<dyn StdError + Send + Sync>> + 'static,
{
    let content_type = content_type
        .ok_or_else(|| FormError::MalformedForm("missing content type".into()))?;
    let boundary = multer::parse_boundary(content_type).map_err(form_error)?;
    let mut multipart = Multipart::new(body, boundary);

    let mut form = FormData::default();
    let (mut files, mut texts) = (0_usize, 0_usize);
    while let Some(mut field) = multipart.next_field().await.map_err(form_error)? {
        let name = field.name().unwrap_or_default().to_owned();
        let filename = field.file_name().map(ToOwned::to_owned);
        let content_type = field.content_type().map(ToString::to_string);
        if filename.is_some() {
            files = files.saturating_add(1);
            if files > MAX_FILES {
                return Err(FormError::MalformedForm(format!(
                    "Too many files. Maximum number of files is {MAX_FILES}."
                )));
            }
        } else {
            texts = texts.saturating_add(1);
            if texts > MAX_FIELDS {
                return Err(FormError::MalformedForm(format!(
                    "Too many fields. Maximum number of fields is {MAX_FIELDS}."
                )));
            }
        }

        let mut data = BytesMut::new();
        let mut size: u64 = 0;
        while let Some(chunk) = field.chunk().await.map_err(form_error)? {
            size = size.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
            if size > max_part_bytes {
                debug!(field = %name, max_part_bytes, "form field is too large");
                return Err(FormError::PayloadTooLarge {
                    field: Some(name),
                    limit: max_part_bytes,
                });
            }
            data.extend_from_slice(&chunk);
        }

        let value = if filename.is_some() {
            FormValue::File(UploadedFile {
                filename,
                content_type,
                data: data.freeze(),
            })
        } else {
            let text = String::from_utf8(data.to_vec()).map_err(|_utf8_error| {
                FormError::MalformedForm(format!("field {name:?} is not valid UTF-8"))
            })?;
            FormValue::Text(text)
        };
        form.fields.push((name, value));
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use {super::*, futures_util::stream, std::convert::Infallible};

    const BOUNDARY: &str = "X-BOUNDARY";
    const CONTENT_TYPE: &str = "multipart/form-data; boundary=X-BOUNDARY";

    fn text_part(name: &str, value: &str) -> Vec<u8> {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .into_bytes()
    }

    fn file_part(name: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut part = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        part.extend_from_slice(data);
        part.extend_from_slice(b"\r\n");
        part
    }

    fn body(parts: &[Vec<u8>]) -> Vec<u8> {
        let mut body = parts.concat();
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    /// Splits the body into small chunks like a network stream would.
    fn chunked(body: Vec<u8>) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
        let chunks: Vec<_> = body
            .chunks(7)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        stream::iter(chunks)
    }

    #[tokio::test]
    async fn fields_in_order() {
        let data: Vec<u8> = (0..=255).collect();
        let form = body(&[
            text_part("file_id", "a.txt"),
            file_part("file", "a.bin", &data),
            text_part("is_public", "true"),
            text_part("file_id", "duplicate"),
        ]);
        let form = ingest_multipart(Some(CONTENT_TYPE), chunked(form), 1024)
            .await
            .unwrap();

        assert_eq!(form.len(), 4);
        assert_eq!(form.text("file_id"), Some("a.txt"));
        assert_eq!(form.text("is_public"), Some("true"));
        let file = form.file("file").unwrap();
        assert_eq!(file.filename.as_deref(), Some("a.bin"));
        assert_eq!(
            file.content_type.as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(file.read(), Bytes::from(data));
        assert!(form.text("file").is_none());
        let names: Vec<_> = form.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["file_id", "file", "is_public", "file_id"]);
    }

    #[tokio::test]
    async fn limit_is_per_field() {
        // Each field fits, the body as a whole doesn't.
        let two_files = body(&[
            file_part("first", "1", &[1; 100]),
            file_part("second", "2", &[2; 100]),
        ]);
        let form = ingest_multipart(Some(CONTENT_TYPE), chunked(two_files), 100)
            .await
            .unwrap();
        assert_eq!(form.file("first").unwrap().len(), 100);
        assert_eq!(form.file("second").unwrap().len(), 100);
    }

    #[tokio::test]
    async fn oversized_field() {
        let big_file = body(&[text_part("ok", "x"), file_part("file", "big", &[0; 101])]);
        let err = ingest_multipart(Some(CONTENT_TYPE), chunked(big_file), 100)
            .await
            .unwrap_err();
        match err {
            FormError::PayloadTooLarge { field, limit } => {
                assert_eq!(field.as_deref(), Some("file"));
                assert_eq!(limit, 100);
            }
            other @ FormError::MalformedForm(_) => panic!("unexpected error: {other:?}"),
        }

        let big_text = body(&[text_part("encrypted_payload", &"A".repeat(101))]);
        assert!(matches!(
            ingest_multipart(Some(CONTENT_TYPE), chunked(big_text), 100).await,
            Err(FormError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_forms() {
        let valid = body(&[text_part("a", "b")]);
        assert!(matches!(
            ingest_multipart(None, chunked(valid.clone()), 100).await,
            Err(FormError::MalformedForm(_))
        ));
        assert!(matches!(
            ingest_multipart(Some("application/json"), chunked(valid), 100).await,
            Err(FormError::MalformedForm(_))
        ));

        // Missing closing boundary.
        let truncated = text_part("a", "b");
        assert!(matches!(
            ingest_multipart(Some(CONTENT_TYPE), chunked(truncated), 100).await,
            Err(FormError::MalformedForm(_))
        ));

        let mut invalid_utf8 = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n"
        )
        .into_bytes();
        invalid_utf8.extend_from_slice(b"\xff\xfe\r\n");
        let invalid_utf8 = body(&[invalid_utf8]);
        assert!(matches!(
            ingest_multipart(Some(CONTENT_TYPE), chunked(invalid_utf8), 100).await,
            Err(FormError::MalformedForm(_))
        ));
    }

    #[tokio::test]
    async fn part_count_limits() {
        let fields: Vec<_> = (0..MAX_FIELDS)
            .map(|i| text_part(&format!("f{i}"), "x"))
            .collect();
        let form = ingest_multipart(Some(CONTENT_TYPE), chunked(body(&fields)), 100)
            .await
            .unwrap();
        assert_eq!(form.len(), MAX_FIELDS);

        let mut too_many = fields;
        too_many.push(text_part("one_more", "x"));
        let err = ingest_multipart(Some(CONTENT_TYPE), chunked(body(&too_many)), 100)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, FormError::MalformedForm(message) if message.starts_with("Too many fields")),
            "{err:?}"
        );

        let files: Vec<_> = (0..=MAX_FILES)
            .map(|i| file_part("file", &format!("{i}.bin"), b""))
            .collect();
        let err = ingest_multipart(Some(CONTENT_TYPE), chunked(body(&files)), 100)
            .await
            .unwrap_err();
        assert!(
            matches!(&err, FormError::MalformedForm(message) if message.starts_with("Too many files")),
            "{err:?}"
        );
    }

    #[test]
    fn default_limit() {
        assert_eq!(MAX_PART_SIZE, 250 * 1024 * 1024);
    }
}
