//! Document extraction seam.
//!
//! Turning an uploaded file into a header and lines is left to an external
//! OCR provider behind [`DocumentExtractor`]. [`StubExtractor`] stands in when
//! no provider is configured and is the fallback when the provider fails.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::debug;

use crate::errors::ServiceError;
use crate::models::invoice::UNKNOWN_SUPPLIER;
use crate::models::{DocumentMetadata, InvoiceHeader, NewLine};

/// Name recorded when the upload carries none.
const DEFAULT_FILE_NAME: &str = "uploaded";

/// An uploaded invoice document held in memory.
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl DocumentUpload {
    pub fn new(file_name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            mime_type,
            bytes,
        }
    }

    /// Reads a document from disk, guessing the mime type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, ServiceError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ServiceError::ValidationError(format!("cannot read {}: {}", path.display(), e))
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        let mime_type = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(mime_from_extension)
            .map(str::to_string);

        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }

    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or(DEFAULT_FILE_NAME)
    }

    /// Lower-case hex SHA-256 of the content.
    pub fn sha256_hex(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }

    pub fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata {
            file_name: self.display_name().to_string(),
            mime_type: self.mime_type.clone(),
            sha256: self.sha256_hex(),
            size: i64::try_from(self.bytes.len()).unwrap_or(i64::MAX),
        }
    }
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "tif" | "tiff" => Some("image/tiff"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Header and lines recovered from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub header: InvoiceHeader,
    #[serde(default)]
    pub lines: Vec<NewLine>,
}

/// Converts an uploaded document into structured invoice data.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, upload: &DocumentUpload) -> Result<ExtractedDocument, ServiceError>;
}

/// Placeholder extractor: unknown supplier, no lines, a marker as raw text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubExtractor;

impl StubExtractor {
    pub fn extract_now(&self, upload: &DocumentUpload) -> ExtractedDocument {
        let raw_text = format!(
            "STUB_OCR filename={} bytes={}",
            upload.display_name(),
            upload.bytes.len()
        );
        debug!(file_name = upload.display_name(), "Using stub extraction");

        ExtractedDocument {
            header: InvoiceHeader {
                supplier_id: UNKNOWN_SUPPLIER.to_string(),
                raw_text: Some(raw_text),
                ..Default::default()
            },
            lines: Vec::new(),
        }
    }
}

#[async_trait]
impl DocumentExtractor for StubExtractor {
    async fn extract(&self, upload: &DocumentUpload) -> Result<ExtractedDocument, ServiceError> {
        Ok(self.extract_now(upload))
    }
}

/// Returns a pre-computed extraction, e.g. one produced by an offline OCR run.
#[derive(Debug, Clone)]
pub struct PreparsedExtractor {
    document: ExtractedDocument,
}

impl PreparsedExtractor {
    pub fn new(document: ExtractedDocument) -> Self {
        Self { document }
    }
}

#[async_trait]
impl DocumentExtractor for PreparsedExtractor {
    async fn extract(&self, _upload: &DocumentUpload) -> Result<ExtractedDocument, ServiceError> {
        Ok(self.document.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_reports_unknown_supplier_and_marker_text() {
        let upload = DocumentUpload::new("factura.pdf", None, vec![0u8; 42]);
        let doc = StubExtractor.extract(&upload).await.unwrap();

        assert_eq!(doc.header.supplier_id, "UNKNOWN");
        assert_eq!(
            doc.header.raw_text.as_deref(),
            Some("STUB_OCR filename=factura.pdf bytes=42")
        );
        assert!(doc.lines.is_empty());
    }

    #[test]
    fn metadata_hashes_content() {
        let upload = DocumentUpload::new("a.png", Some("image/png".into()), b"abc".to_vec());
        let meta = upload.metadata();
        assert_eq!(
            meta.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(meta.size, 3);
        assert_eq!(meta.mime_type.as_deref(), Some("image/png"));
    }

    #[tokio::test]
    async fn reads_upload_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scan.JPG");
        std::fs::write(&path, b"jpeg-bytes").unwrap();

        let upload = DocumentUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.display_name(), "scan.JPG");
        assert_eq!(upload.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(upload.bytes, b"jpeg-bytes");
    }

    #[test]
    fn nameless_upload_uses_default_name() {
        let upload = DocumentUpload {
            file_name: None,
            mime_type: None,
            bytes: vec![],
        };
        assert_eq!(upload.display_name(), "uploaded");
    }
}
