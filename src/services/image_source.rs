use std::path::{Path, PathBuf};

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{CanonicalImage, ImageMime};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Content of an uploaded file: already in memory (multipart, drag-and-drop)
/// or still on disk (file picker).
#[derive(Debug, Clone)]
pub enum UploadBody {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// A file handle as delivered by the upload widget.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub body: UploadBody,
}

impl UploadedFile {
    pub fn from_bytes(
        file_name: impl Into<String>,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            body: UploadBody::Bytes(bytes),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();

        Self {
            file_name,
            content_type: None,
            body: UploadBody::Path(path),
        }
    }

    /// Declared type: the MIME type when the widget supplied one, otherwise
    /// the file extension.
    fn declared_type(&self) -> Option<String> {
        if let Some(content_type) = self.content_type.as_deref().filter(|c| !c.trim().is_empty()) {
            return Some(content_type.to_string());
        }

        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_string())
    }
}

/// Normalizes camera frames and uploads into a `CanonicalImage`.
#[derive(Debug, Clone)]
pub struct ImageSource {
    max_upload_bytes: usize,
}

impl Default for ImageSource {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl ImageSource {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self { max_upload_bytes }
    }

    /// Camera stills are always JPEG.
    pub fn from_capture(&self, frame_bytes: Vec<u8>) -> AnalysisResult<CanonicalImage> {
        log::debug!("📷 Camera frame received: {} bytes", frame_bytes.len());

        CanonicalImage::new(frame_bytes, ImageMime::Jpeg)
            .ok_or_else(|| AnalysisError::UnreadableFile("camera frame is empty".to_string()))
    }

    pub async fn from_upload(&self, file: UploadedFile) -> AnalysisResult<CanonicalImage> {
        let declared = file.declared_type().unwrap_or_default();

        // Format check comes first so unsupported files are never read.
        let mime_type = ImageMime::from_declared(&declared).ok_or_else(|| {
            log::warn!("⚠️ Rejected upload '{}' with type '{}'", file.file_name, declared);
            AnalysisError::UnsupportedFormat(if declared.is_empty() {
                "unknown".to_string()
            } else {
                declared.clone()
            })
        })?;

        let bytes = match file.body {
            UploadBody::Bytes(bytes) => bytes,
            UploadBody::Path(path) => {
                let metadata = tokio::fs::metadata(&path).await?;
                if metadata.len() > self.max_upload_bytes as u64 {
                    return Err(self.too_large(metadata.len() as usize));
                }
                tokio::fs::read(&path).await?
            }
        };

        if bytes.len() > self.max_upload_bytes {
            return Err(self.too_large(bytes.len()));
        }

        log::debug!(
            "📁 Upload '{}' accepted as {} ({} bytes)",
            file.file_name,
            mime_type,
            bytes.len()
        );

        CanonicalImage::new(bytes, mime_type)
            .ok_or_else(|| AnalysisError::UnreadableFile(format!("'{}' is empty", file.file_name)))
    }

    /// Only the first file of a drop is used; the rest are ignored.
    pub async fn from_first_upload(
        &self,
        files: Vec<UploadedFile>,
    ) -> AnalysisResult<CanonicalImage> {
        let total = files.len();
        let first = files
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::UnreadableFile("no file was provided".to_string()))?;

        if total > 1 {
            log::debug!("Ignoring {} extra file(s) in drop", total - 1);
        }

        self.from_upload(first).await
    }

    fn too_large(&self, size: usize) -> AnalysisError {
        AnalysisError::UnreadableFile(format!(
            "file is {} bytes, maximum is {} bytes",
            size, self.max_upload_bytes
        ))
    }
}
