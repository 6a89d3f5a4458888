use crate::error::IngestError;
use lopdf::Document;
use std::fmt::Display;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

fn pdf_error(path: &Path, error: impl Display) -> IngestError {
    IngestError::PdfParse(format!("{}: {error}", path.display()))
}

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| pdf_error(path, error))?;

        let mut pages = Vec::new();
        for number in document.get_pages().into_keys() {
            let text = document
                .extract_text(&[number])
                .map_err(|error| pdf_error(path, error))?;
            if text.trim().is_empty() {
                debug!(path = %path.display(), page = number, "skipping page without text");
                continue;
            }
            pages.push(PageText { number, text });
        }

        if pages.is_empty() {
            return Err(pdf_error(path, "no readable page text"));
        }
        Ok(pages)
    }
}

pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}

#[cfg(test)]
mod tests {
    use super::extract_page_texts;
    use crate::IngestError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn truncated_pdf_names_the_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("pump-manual.pdf");
        fs::write(&path, b"%PDF-1.7\n1 0 obj\n<< /Type /Catalog")?;

        match extract_page_texts(&path) {
            Err(IngestError::PdfParse(message)) => assert!(message.contains("pump-manual.pdf")),
            other => panic!("expected a parse error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn missing_pdf_is_a_parse_error() {
        let result = extract_page_texts(std::path::Path::new("/nonexistent/valves.pdf"));
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
    }
}
