use crate::extractor::extract_page_texts;
use crate::models::{Document, Metadata, FILE_PATH_KEY, PAGE_KEY, SOURCE_KEY};
use crate::IngestError;
use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: [&str; 4] = ["json", "txt", "md", "pdf"];

fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted))
}

pub fn is_pdf(path: &Path) -> bool {
    has_extension(path, "pdf")
}

pub fn discover_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = SUPPORTED_EXTENSIONS
            .iter()
            .any(|ext| has_extension(entry.path(), ext));

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn load_documents(path: &Path) -> Result<Vec<Document>, IngestError> {
    let source = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?
        .to_string();

    let bytes = fs::read(path)?;
    let base = base_metadata(&source, path, &bytes);

    let documents = if is_pdf(path) {
        extract_page_texts(path)?
            .into_iter()
            .map(|page| {
                let mut metadata = base.clone();
                metadata.insert(PAGE_KEY.to_string(), Value::from(page.number));
                Document {
                    source: source.clone(),
                    file_path: Some(path.to_string_lossy().to_string()),
                    content: page.text,
                    metadata,
                }
            })
            .collect::<Vec<_>>()
    } else {
        let content = String::from_utf8_lossy(&bytes).into_owned();
        if content.trim().is_empty() {
            Vec::new()
        } else {
            vec![Document {
                source: source.clone(),
                file_path: Some(path.to_string_lossy().to_string()),
                content,
                metadata: base,
            }]
        }
    };

    if documents.is_empty() {
        return Err(IngestError::EmptyDocument(path.display().to_string()));
    }

    debug!(path = %path.display(), documents = documents.len(), "loaded file");
    Ok(documents)
}

fn base_metadata(source: &str, path: &Path, bytes: &[u8]) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), Value::String(source.to_string()));
    metadata.insert(
        FILE_PATH_KEY.to_string(),
        Value::String(path.to_string_lossy().to_string()),
    );
    metadata.insert("checksum".to_string(), Value::String(digest_bytes(bytes)));
    metadata.insert(
        "ingested_at".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    metadata
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedFile>,
}

pub fn load_directory_best_effort(folder: &Path) -> Result<LoadReport, IngestError> {
    let files = discover_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no supported files found in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_documents(&path) {
            Ok(loaded) => documents.extend(loaded),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped file");
                skipped_files.push(SkippedFile {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    if documents.is_empty() {
        return Err(IngestError::EmptyDocument(folder.display().to_string()));
    }

    Ok(LoadReport {
        documents,
        skipped_files,
    })
}

#[cfg(test)]
mod tests {
    use super::{discover_files, load_directory_best_effort, load_documents};
    use crate::models::{FILE_PATH_KEY, SOURCE_KEY};
    use crate::IngestError;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn discover_files_is_recursive_and_filters_extensions(
    ) -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.json")).and_then(|mut file| file.write_all(b"[]"))?;
        File::create(nested.join("b.TXT")).and_then(|mut file| file.write_all(b"text"))?;
        File::create(nested.join("c.png")).and_then(|mut file| file.write_all(b"png"))?;

        let files = discover_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[test]
    fn checksum_is_the_sha256_of_the_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("a.txt");
        fs::write(&file_path, b"hello")?;

        let documents = load_documents(&file_path)?;
        assert_eq!(
            documents[0].metadata["checksum"],
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        Ok(())
    }

    #[test]
    fn text_file_loads_as_single_document() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("notes.txt");
        fs::write(&file_path, "first line\nsecond line")?;

        let documents = load_documents(&file_path)?;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].source, "notes.txt");
        assert_eq!(documents[0].content, "first line\nsecond line");
        assert_eq!(
            documents[0].metadata.get(SOURCE_KEY).and_then(|v| v.as_str()),
            Some("notes.txt")
        );
        assert!(documents[0].metadata.contains_key(FILE_PATH_KEY));
        assert!(documents[0].metadata.contains_key("checksum"));
        Ok(())
    }

    #[test]
    fn blank_file_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let file_path = dir.path().join("blank.txt");
        fs::write(&file_path, "  \n\t")?;

        let result = load_documents(&file_path);
        assert!(matches!(result, Err(IngestError::EmptyDocument(_))));
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = load_documents(std::path::Path::new("/definitely/not/here.txt"));
        assert!(matches!(result, Err(IngestError::Io(_))));
    }

    #[test]
    fn loading_fails_without_supported_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = load_directory_best_effort(dir.path());
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn best_effort_skips_unreadable_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;
        fs::write(dir.path().join("ok.md"), "# Title\n\nBody")?;

        let report = load_directory_best_effort(dir.path())?;

        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        Ok(())
    }
}
