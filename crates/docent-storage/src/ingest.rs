//! Document ingestion into the passage store.
//!
//! Text documents are split into pages on form-feed characters; PDF
//! documents are read page by page. Each page is chunked into
//! paragraph-bounded passages located by their 1-based page number.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use docent_core::error::DocentError;

use crate::search::{PageText, PassageStore};

/// Page separator in plain-text documents.
const FORM_FEED: char = '\u{000C}';

/// Outcome of an ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Documents stored successfully.
    pub documents: usize,
    /// Passages stored across all documents.
    pub passages: usize,
    /// Files ignored because of their extension.
    pub skipped: usize,
    /// Files that could not be read or parsed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

/// Ingest every supported file directly inside `dir`.
///
/// A file that fails to parse is recorded in the report and does not stop
/// the run. Files are processed in name order.
pub fn ingest_directory(
    store: &PassageStore,
    dir: &Path,
    max_passage_chars: usize,
) -> Result<IngestReport, DocentError> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    entries.sort();

    let mut report = IngestReport::default();
    for path in entries {
        if !is_supported(&path) {
            debug!(path = %path.display(), "Skipping unsupported file");
            report.skipped += 1;
            continue;
        }
        match ingest_file(store, &path, max_passage_chars) {
            Ok(stored) => {
                report.documents += 1;
                report.passages += stored;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to ingest document");
                report.failed.push((path, e.to_string()));
            }
        }
    }

    info!(
        dir = %dir.display(),
        documents = report.documents,
        passages = report.passages,
        skipped = report.skipped,
        failed = report.failed.len(),
        "Ingestion complete"
    );
    Ok(report)
}

/// Ingest a single document, replacing any earlier version of it.
///
/// The source name is the file name. Returns the number of passages stored.
pub fn ingest_file(
    store: &PassageStore,
    path: &Path,
    max_passage_chars: usize,
) -> Result<usize, DocentError> {
    let source_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| DocentError::Ingestion(format!("{} has no file name", path.display())))?;

    let raw_pages = match extension(path).as_deref() {
        Some("pdf") => read_pdf_pages(path)?,
        Some("txt") | Some("md") => split_pages(&std::fs::read_to_string(path)?),
        _ => {
            return Err(DocentError::Ingestion(format!(
                "unsupported document type: {}",
                path.display()
            )))
        }
    };

    let pages: Vec<PageText> = raw_pages
        .iter()
        .enumerate()
        .map(|(i, text)| PageText {
            locator: (i + 1).to_string(),
            passages: chunk_page(text, max_passage_chars),
        })
        .filter(|p| !p.passages.is_empty())
        .collect();

    if pages.is_empty() {
        return Err(DocentError::Ingestion(format!(
            "no text content in {}",
            path.display()
        )));
    }

    let stored = store.replace_document(&source_name, &pages)?;
    debug!(source = %source_name, pages = pages.len(), passages = stored, "Document ingested");
    Ok(stored)
}

/// Split plain text into pages on form-feed characters.
pub fn split_pages(text: &str) -> Vec<String> {
    text.split(FORM_FEED).map(str::to_string).collect()
}

/// Chunk one page into passages of at most `max_chars` characters.
///
/// Paragraphs (blank-line separated) are packed together while they fit;
/// whitespace inside a paragraph is collapsed. A paragraph longer than
/// `max_chars` is split on word boundaries.
pub fn chunk_page(page: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut passages = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs(page) {
        for piece in split_long(&paragraph, max_chars) {
            let joined_len = current.chars().count() + 1 + piece.chars().count();
            if current.is_empty() {
                current = piece;
            } else if joined_len <= max_chars {
                current.push('\n');
                current.push_str(&piece);
            } else {
                passages.push(std::mem::replace(&mut current, piece));
            }
        }
    }
    if !current.is_empty() {
        passages.push(current);
    }
    passages
}

fn paragraphs(page: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut words: Vec<&str> = Vec::new();
    for line in page.lines() {
        if line.trim().is_empty() {
            if !words.is_empty() {
                out.push(words.join(" "));
                words.clear();
            }
        } else {
            words.extend(line.split_whitespace());
        }
    }
    if !words.is_empty() {
        out.push(words.join(" "));
    }
    out
}

fn split_long(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.chars().count() <= max_chars {
        return vec![paragraph.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > max_chars {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = word.chars().collect();
            for slice in chars.chunks(max_chars) {
                pieces.push(slice.iter().collect());
            }
            continue;
        }
        let needed = if current.is_empty() {
            word_len
        } else {
            current.chars().count() + 1 + word_len
        };
        if needed > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn read_pdf_pages(path: &Path) -> Result<Vec<String>, DocentError> {
    let doc = lopdf::Document::load(path).map_err(|e| {
        DocentError::Ingestion(format!("failed to load PDF {}: {}", path.display(), e))
    })?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        match doc.extract_text(&[number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                warn!(path = %path.display(), page = number, error = %e, "Failed to extract page text");
                // Keep numbering aligned with the physical page.
                pages.push(String::new());
            }
        }
    }
    Ok(pages)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
}

fn is_supported(path: &Path) -> bool {
    matches!(extension(path).as_deref(), Some("pdf" | "txt" | "md"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use std::sync::Arc;

    fn make_store() -> PassageStore {
        PassageStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    // ---- Page splitting ----

    #[test]
    fn test_split_pages_on_form_feed() {
        let pages = split_pages("page one\u{000C}page two\u{000C}page three");
        assert_eq!(pages, vec!["page one", "page two", "page three"]);
    }

    #[test]
    fn test_split_pages_without_form_feed() {
        assert_eq!(split_pages("just one page").len(), 1);
    }

    // ---- Chunking ----

    #[test]
    fn test_chunk_packs_short_paragraphs() {
        let passages = chunk_page("First paragraph.\n\nSecond paragraph.", 200);
        assert_eq!(passages, vec!["First paragraph.\nSecond paragraph."]);
    }

    #[test]
    fn test_chunk_collapses_whitespace_in_paragraph() {
        let passages = chunk_page("The   Night\n   Watch", 200);
        assert_eq!(passages, vec!["The Night Watch"]);
    }

    #[test]
    fn test_chunk_splits_when_full() {
        let a = "a".repeat(120);
        let b = "b".repeat(120);
        let passages = chunk_page(&format!("{}\n\n{}", a, b), 200);
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0], a);
        assert_eq!(passages[1], b);
    }

    #[test]
    fn test_chunk_splits_long_paragraph_on_words() {
        let paragraph = "word ".repeat(100);
        let passages = chunk_page(&paragraph, 50);
        assert!(passages.len() > 1);
        assert!(passages.iter().all(|p| p.chars().count() <= 50));
        assert!(passages.iter().all(|p| !p.starts_with(' ')));
    }

    #[test]
    fn test_chunk_splits_oversized_word() {
        let passages = chunk_page(&"x".repeat(25), 10);
        assert_eq!(passages.len(), 3);
        assert_eq!(passages[2], "xxxxx");
    }

    #[test]
    fn test_chunk_empty_page() {
        assert!(chunk_page("   \n\n  ", 100).is_empty());
    }

    // ---- File ingestion ----

    #[test]
    fn test_ingest_text_file_locates_pages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("louvre.txt");
        std::fs::write(
            &path,
            "Intro page.\u{000C}Gallery map.\u{000C}Leonardo da Vinci painted the Mona Lisa around 1503.",
        )
        .unwrap();

        let store = make_store();
        let stored = ingest_file(&store, &path, 500).unwrap();
        assert_eq!(stored, 3);

        let results = store.search("Mona Lisa", None, 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_name, "louvre.txt");
        assert_eq!(results[0].locator, "3");
    }

    #[test]
    fn test_ingest_file_rejects_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.md");
        std::fs::write(&path, "\n\n").unwrap();
        let result = ingest_file(&make_store(), &path, 500);
        assert!(matches!(result, Err(DocentError::Ingestion(_))));
    }

    #[test]
    fn test_ingest_file_rejects_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, "binary").unwrap();
        assert!(ingest_file(&make_store(), &path, 500).is_err());
    }

    #[test]
    fn test_ingest_invalid_pdf_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, "not a pdf").unwrap();
        let result = ingest_file(&make_store(), &path, 500);
        assert!(matches!(result, Err(DocentError::Ingestion(_))));
    }

    // ---- Directory ingestion ----

    #[test]
    fn test_ingest_directory_reports_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Rembrandt self portrait.").unwrap();
        std::fs::write(dir.path().join("b.md"), "Vermeer used ultramarine.").unwrap();
        std::fs::write(dir.path().join("c.pdf"), "garbage").unwrap();
        std::fs::write(dir.path().join("notes.csv"), "x,y").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let store = make_store();
        let report = ingest_directory(&store, dir.path(), 500).unwrap();
        assert_eq!(report.documents, 2);
        assert_eq!(report.passages, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].0.ends_with("c.pdf"));
        assert_eq!(store.sources().unwrap(), vec!["a.txt", "b.md"]);
    }

    #[test]
    fn test_ingest_directory_missing_dir() {
        let result = ingest_directory(&make_store(), Path::new("/no/such/dir"), 500);
        assert!(matches!(result, Err(DocentError::Io(_))));
    }
}
