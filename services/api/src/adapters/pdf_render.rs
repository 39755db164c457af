//! services/api/src/adapters/pdf_render.rs
//!
//! Renders the first page of an uploaded PDF to JPEG by running poppler's
//! `pdftoppm` on a temporary copy of the file.

use std::path::PathBuf;

use async_trait::async_trait;
use ats_gate_core::{
    domain::DocumentImage,
    ports::{DocumentRenderer, PortError, PortResult},
};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct PdftoppmRenderer {
    program: PathBuf,
    dpi: u32,
}

impl PdftoppmRenderer {
    pub fn new(program: PathBuf, dpi: u32) -> Self {
        Self { program, dpi }
    }
}

fn io_error(e: std::io::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

#[async_trait]
impl DocumentRenderer for PdftoppmRenderer {
    async fn render_first_page(&self, pdf: &[u8]) -> PortResult<DocumentImage> {
        let kind = infer::get(pdf).map(|k| k.mime_type());
        if kind != Some("application/pdf") {
            return Err(PortError::Unexpected(format!(
                "expected a PDF document, got {}",
                kind.unwrap_or("unknown data")
            )));
        }

        let workdir = tempfile::tempdir().map_err(io_error)?;
        let input = workdir.path().join("document.pdf");
        let output_root = workdir.path().join("page");
        tokio::fs::write(&input, pdf).await.map_err(io_error)?;

        let output = Command::new(&self.program)
            .arg("-jpeg")
            .args(["-f", "1", "-l", "1"])
            .arg("-singlefile")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&input)
            .arg(&output_root)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                PortError::Unexpected(format!("failed to run {:?}: {}", self.program, e))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = ?output.status, %stderr, "pdftoppm failed.");
            return Err(PortError::Unexpected(format!(
                "pdftoppm exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(output_root.with_extension("jpg"))
            .await
            .map_err(io_error)?;
        debug!(pdf_len = pdf.len(), jpeg_len = bytes.len(), "Rendered first page.");
        Ok(DocumentImage {
            mime_type: "image/jpeg".to_string(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_pdf_without_running_converter() {
        let renderer = PdftoppmRenderer::new(PathBuf::from("/nonexistent/pdftoppm"), 150);
        let err = renderer.render_first_page(b"\x89PNG\r\n\x1a\n0000").await.unwrap_err();
        assert!(err.to_string().contains("expected a PDF"));

        let err = renderer.render_first_page(b"plain text").await.unwrap_err();
        assert!(err.to_string().contains("unknown data"));
    }

    #[tokio::test]
    async fn missing_converter_is_an_error() {
        let renderer = PdftoppmRenderer::new(PathBuf::from("/nonexistent/pdftoppm"), 150);
        let err = renderer
            .render_first_page(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to run"));
    }
}
