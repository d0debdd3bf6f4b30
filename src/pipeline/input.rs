//! Input resolution: turn a user-supplied path, URL or byte buffer into a
//! [`Document`] backed by a local file.
//!
//! pdfium, lopdf and the converter subprocess all want a file-system path.
//! URL downloads and in-memory inputs are written into a per-request
//! `TempDir` owned by the `Document`; dropping the document removes the
//! directory on every exit path, panics included. The `%PDF` magic bytes are
//! checked up front so callers get a meaningful error instead of a backend
//! failure.

use crate::error::Pdf2MdError;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// A PDF ready to be parsed. Read-only for the duration of a request.
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    name: String,
    /// Keeps the per-request working area alive until the document drops.
    _workdir: Option<TempDir>,
}

impl Document {
    /// Wrap an existing local PDF without copying it.
    ///
    /// No validation is done here; use [`resolve_input`] for user input.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = display_name(&path);
        Self {
            path,
            name,
            _workdir: None,
        }
    }

    /// Write `bytes` into a fresh temp directory and wrap the result.
    pub fn from_bytes(bytes: &[u8], filename: &str) -> Result<Self, Pdf2MdError> {
        let workdir = TempDir::new().map_err(|e| Pdf2MdError::Internal(e.to_string()))?;
        let filename = sanitise_filename(filename);
        let path = workdir.path().join(&filename);

        check_magic_bytes(bytes, &path)?;
        std::fs::write(&path, bytes)
            .map_err(|e| Pdf2MdError::Internal(format!("Failed to write temp file: {e}")))?;

        debug!("Staged {} bytes at {}", bytes.len(), path.display());
        Ok(Self {
            path,
            name: filename,
            _workdir: Some(workdir),
        })
    }

    /// Path to the PDF on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used in logs, metadata and history.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// File name without the `.pdf` extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF document.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<Document, Pdf2MdError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and PDF magic bytes.
fn resolve_local(path_str: &str) -> Result<Document, Pdf2MdError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(Pdf2MdError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(Pdf2MdError::InvalidInput {
            input: path_str.to_string(),
        });
    }

    match std::fs::File::open(&path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
                return Err(Pdf2MdError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(Pdf2MdError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(Pdf2MdError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(Document::from_path(path))
}

/// Download a URL into a per-request temp directory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<Document, Pdf2MdError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Pdf2MdError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            Pdf2MdError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            Pdf2MdError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(Pdf2MdError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| Pdf2MdError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let doc = Document::from_bytes(&bytes, &filename)?;
    info!("Downloaded to: {}", doc.path().display());
    Ok(doc)
}

fn check_magic_bytes(bytes: &[u8], path: &Path) -> Result<(), Pdf2MdError> {
    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(Pdf2MdError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

/// File name to show for a raw user input, path or URL.
pub fn filename_from_input(input: &str) -> String {
    if is_url(input) {
        filename_from_url(input)
    } else {
        display_name(Path::new(input))
    }
}

/// Output stems for a batch, one per input, in order.
///
/// Inputs that share a file stem get `-2`, `-3`, … suffixes so their
/// Markdown files do not overwrite each other in one output directory.
pub fn output_stems<S: AsRef<str>>(inputs: &[S]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    inputs
        .iter()
        .map(|input| {
            let name = filename_from_input(input.as_ref());
            let stem = Path::new(&name)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or(name);
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                stem
            } else {
                format!("{stem}-{count}")
            }
        })
        .collect()
}

/// Last URL path segment if it looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return sanitise_filename(last);
                }
            }
        }
    }

    "downloaded.pdf".to_string()
}

/// Keep only the final component so a caller-supplied name cannot escape
/// the temp directory.
fn sanitise_filename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document.pdf")
        .to_string()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn filename_from_url_path() {
        assert_eq!(filename_from_url("https://x.org/a/paper.pdf"), "paper.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), "downloaded.pdf");
    }

    #[test]
    fn filename_from_input_handles_paths_and_urls() {
        assert_eq!(filename_from_input("/data/in/trial.pdf"), "trial.pdf");
        assert_eq!(filename_from_input("https://x.org/b/c.pdf"), "c.pdf");
    }

    #[test]
    fn output_stems_disambiguate_same_named_pdfs() {
        let inputs = ["a/x.pdf", "b/x.pdf", "c/y.pdf", "https://x.org/x.pdf"];
        assert_eq!(output_stems(&inputs), vec!["x", "x-2", "y", "x-3"]);
    }

    #[test]
    fn sanitise_strips_directories() {
        assert_eq!(sanitise_filename("../../etc/passwd.pdf"), "passwd.pdf");
        assert_eq!(sanitise_filename(""), "document.pdf");
    }

    #[test]
    fn from_bytes_rejects_non_pdf() {
        let err = Document::from_bytes(b"PK\x03\x04zip", "a.pdf").unwrap_err();
        assert!(matches!(err, Pdf2MdError::NotAPdf { magic, .. } if &magic == b"PK\x03\x04"));
    }

    #[test]
    fn staged_document_is_removed_on_drop() {
        let doc = Document::from_bytes(b"%PDF-1.4\n%%EOF\n", "paper.pdf").unwrap();
        let dir = doc.path().parent().unwrap().to_path_buf();
        assert!(doc._workdir.is_some());
        assert!(doc.path().exists());
        assert_eq!(doc.stem(), "paper");
        drop(doc);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn local_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, Pdf2MdError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn local_non_pdf_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("notes.pdf");
        std::fs::write(&p, b"hello world").unwrap();
        let err = resolve_input(p.to_str().unwrap(), 5).await.unwrap_err();
        assert!(matches!(err, Pdf2MdError::NotAPdf { .. }));
    }
}
