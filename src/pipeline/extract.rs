//! Text extraction: pull Markdown-like text out of a plan PDF.
//!
//! Extraction is deliberately forgiving: a plan PDF that cannot be read
//! yields empty text plus a logged diagnostic, and the batch moves on to the
//! next file. The downstream interpreter is the place that decides whether
//! empty input is fatal — this stage never is. Week headings survive
//! extraction as plain lines, which is all the interpreter's heading filter
//! needs.
//!
//! `pdf-extract` is synchronous and CPU-bound, so the actual parse runs in
//! `spawn_blocking` to keep it off the async executor's hot path.

use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Extract plain text from a PDF.
///
/// Never fails: unreadable or image-only PDFs produce an empty string and a
/// `warn!` diagnostic so one bad file cannot take down a batch run.
pub async fn extract_text(pdf_path: &Path) -> String {
    let path = pdf_path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&path)).await;

    match result {
        Ok(Ok(text)) => {
            info!(
                "Extracted {} chars from {}",
                text.len(),
                pdf_path.display()
            );
            text
        }
        Ok(Err(e)) => {
            warn!("Extraction failed for {}: {}", pdf_path.display(), e);
            String::new()
        }
        Err(e) => {
            warn!("Extraction task panicked for {}: {}", pdf_path.display(), e);
            String::new()
        }
    }
}

/// List the PDF files in a raw-plan directory, sorted by name.
///
/// A missing or unreadable directory is reported as empty with a diagnostic,
/// matching the extraction policy above.
pub fn list_plan_pdfs(raw_dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(raw_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot read raw directory {}: {}", raw_dir.display(), e);
            return Vec::new();
        }
    };

    let mut pdfs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pdf"))
                .unwrap_or(false)
        })
        .collect();

    pdfs.sort();
    pdfs
}
