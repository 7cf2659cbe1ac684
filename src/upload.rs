//! Multipart upload parsing and validation.

use crate::config::parse_flag;
use axum::extract::Multipart;
use axum::http::StatusCode;
use std::path::Path;

/// File extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// An image upload plus the optional form fields that travel with it.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub data: Vec<u8>,
    pub keyword: Option<String>,
    /// `None` when the form did not say; the server default applies.
    pub preprocess: Option<bool>,
}

impl ImageUpload {
    /// MIME type matching the file extension, for previews.
    pub fn mime_type(&self) -> &'static str {
        match extension_of(&self.filename).as_deref() {
            Some("png") => "image/png",
            _ => "image/jpeg",
        }
    }
}

/// Rejection returned to the client.
pub type Rejection = (StatusCode, String);

/// Read the `file`, `keyword` and `preprocess` fields from a multipart body.
///
/// Unknown fields are ignored. For repeated `keyword`/`preprocess` fields the
/// last value wins.
pub async fn read_upload(mut multipart: Multipart) -> Result<ImageUpload, Rejection> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut keyword = None;
    let mut preprocess = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("image").to_string();
                let data = field.bytes().await.map_err(|e| {
                    (StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
                })?;
                file = Some((filename, data.to_vec()));
            }
            Some("keyword") => {
                keyword = Some(read_text(field).await?);
            }
            Some("preprocess") => {
                let raw = read_text(field).await?;
                preprocess = Some(parse_flag(&raw).ok_or_else(|| {
                    (
                        StatusCode::BAD_REQUEST,
                        format!("preprocess must be a boolean, got {:?}", raw),
                    )
                })?);
            }
            _ => {}
        }
    }

    let (filename, data) =
        file.ok_or_else(|| (StatusCode::BAD_REQUEST, "No file uploaded".to_string()))?;

    validate_image_file(&filename, &data)?;

    Ok(ImageUpload {
        filename,
        data,
        keyword: keyword.filter(|k: &String| !k.is_empty()),
        preprocess,
    })
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, Rejection> {
    field
        .text()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read form field: {}", e)))
}

/// Check the upload is non-empty and has an allowed extension.
pub fn validate_image_file(filename: &str, data: &[u8]) -> Result<(), Rejection> {
    if data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded".to_string()));
    }

    match extension_of(filename) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err((
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!(
                "Unsupported file type: {}. Allowed: {}",
                filename,
                ALLOWED_EXTENSIONS.join(", ")
            ),
        )),
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
