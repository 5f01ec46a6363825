//! Inbound file-text extraction for `/agent/chat/upload` (§6). spec.md
//! names this "the file-processing collaborator" without specifying its
//! interface — unlike RAG/remote-job/credit, which get a concrete outbound
//! wire contract, this one is genuinely out of scope. The trait exists so a
//! real extractor (docx/xlsx parsing) can be dropped in without touching
//! the upload handler; the shipped implementation only handles the
//! plain-text members of the allowed extension set.

use rsa_domain::error::{Error, Result};

pub trait FileTextExtractor: Send + Sync {
    fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String>;
}

pub struct PlainTextExtractor;

impl FileTextExtractor for PlainTextExtractor {
    fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String> {
        let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
        match ext.as_str() {
            "txt" | "md" | "csv" => Ok(String::from_utf8_lossy(bytes).into_owned()),
            "docx" | "xlsx" => Err(Error::HandlerFailure(format!(
                "extracting text from .{ext} requires the file-processing collaborator, which is not wired in this deployment"
            ))),
            other => Err(Error::Validation(format!("unsupported file extension: .{other}"))),
        }
    }
}

pub const ALLOWED_EXTENSIONS: &[&str] = &["txt", "md", "docx", "csv", "xlsx"];
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn validate_extension(filename: &str) -> Result<()> {
    let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(Error::Validation(format!(
            "file extension .{ext} is not one of {ALLOWED_EXTENSIONS:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_allowed_extension() {
        for ext in ALLOWED_EXTENSIONS {
            assert!(validate_extension(&format!("report.{ext}")).is_ok());
        }
    }

    #[test]
    fn rejects_other_extensions() {
        assert!(validate_extension("payload.exe").is_err());
    }

    #[test]
    fn plain_text_extractor_decodes_txt() {
        let extractor = PlainTextExtractor;
        let text = extractor.extract("notes.txt", b"hello world").unwrap();
        assert_eq!(text, "hello world");
    }
}
