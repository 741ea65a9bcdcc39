//! Input validation: wrap submitted bytes as a [`Document`].
//!
//! The `%PDF` signature is checked before any engine sees the bytes, so a
//! misnamed upload fails with `DocumentUnreadable` instead of a pdfium error
//! string. The document is owned by one extraction and dropped with it.

use crate::error::{ExtractError, UnreadableReason};
use std::path::Path;
use tracing::debug;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// One submitted PDF, validated by signature.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Vec<u8>,
}

impl Document {
    /// Validate `bytes` as a PDF by its leading signature.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self, ExtractError> {
        let bytes = bytes.into();
        if bytes.len() < PDF_MAGIC.len() || &bytes[..PDF_MAGIC.len()] != PDF_MAGIC {
            let magic = bytes.iter().take(PDF_MAGIC.len()).copied().collect();
            return Err(ExtractError::unreadable(UnreadableReason::NotAPdf { magic }));
        }
        debug!("Accepted PDF document: {} bytes", bytes.len());
        Ok(Self { bytes })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Read a local file into memory, mapping I/O failures to input errors.
pub async fn read_local(path: &Path) -> Result<Vec<u8>, ExtractError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(ExtractError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ExtractError::FileNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(ExtractError::Internal(format!(
            "Failed to read '{}': {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_pdf_signature() {
        let doc = Document::from_bytes(b"%PDF-1.7\n...".to_vec()).unwrap();
        assert_eq!(doc.len(), 12);
        assert!(doc.bytes().starts_with(b"%PDF"));
    }

    #[test]
    fn rejects_zip_bytes() {
        let err = Document::from_bytes(b"PK\x03\x04rest".to_vec()).unwrap_err();
        match err {
            ExtractError::DocumentUnreadable {
                reason: UnreadableReason::NotAPdf { magic },
            } => assert_eq!(magic, b"PK\x03\x04".to_vec()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_short_and_empty_input() {
        assert!(Document::from_bytes(Vec::new()).unwrap_err().is_document_unreadable());
        assert!(Document::from_bytes(b"%PD".to_vec()).unwrap_err().is_document_unreadable());
    }

    #[tokio::test]
    async fn read_local_missing_file() {
        let err = read_local(Path::new("/definitely/not/a/roll.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn read_local_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roll.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        assert_eq!(read_local(&path).await.unwrap(), b"%PDF-1.4".to_vec());
    }
}
