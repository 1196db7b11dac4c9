//! Document loading and chunking.

pub mod file_type;
pub mod loaders;
pub mod splitter;

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;

use tracing::debug;

use crate::error::Result;
use crate::utils::TextUtils;
use crate::vector_store::Metadata;

pub use file_type::FileType;
pub use loaders::{load_document, LoadedPage};
pub use splitter::RecursiveTextSplitter;

/// A bounded slice of a document plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub text: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionResult {
    pub filename: String,
    pub chunk_count: usize,
    pub status: String,
    pub group_id: String,
}

/// Split every page and stamp `source_file`, `chunk_index` and `group_id`.
/// Chunk indexes run across the whole document.
pub fn chunk_pages(
    pages: Vec<LoadedPage>,
    splitter: &RecursiveTextSplitter,
    filename: &str,
    group_id: &str,
) -> Vec<DocumentChunk> {
    let mut chunks = Vec::new();
    for page in pages {
        for text in splitter.split_text(&page.text) {
            let mut metadata = page.metadata.clone();
            metadata.insert("source_file".to_string(), json!(filename));
            metadata.insert("chunk_index".to_string(), json!(chunks.len()));
            metadata.insert("group_id".to_string(), json!(group_id));
            chunks.push(DocumentChunk { text, metadata });
        }
    }
    chunks
}

/// Load and chunk one file. Blocking.
pub fn prepare_document(
    path: &Path,
    file_type: FileType,
    splitter: &RecursiveTextSplitter,
    filename: &str,
    group_id: &str,
) -> Result<Vec<DocumentChunk>> {
    let pages = load_document(path, file_type)?;
    let words: usize = pages.iter().map(|p| TextUtils::count_words(&p.text)).sum();
    debug!("Loaded {} page(s), {} words from {}", pages.len(), words, filename);
    Ok(chunk_pages(pages, splitter, filename, group_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_chunk_indexes_span_pages() {
        let splitter = RecursiveTextSplitter::new(40, 10).unwrap();
        let page = |text: &str, n: usize| {
            let mut metadata = Metadata::new();
            metadata.insert("page".to_string(), json!(n));
            LoadedPage { text: text.to_string(), metadata }
        };
        let pages = vec![
            page("alpha beta gamma delta epsilon zeta eta theta iota kappa", 0),
            page("short page", 1),
        ];

        let chunks = chunk_pages(pages, &splitter, "greek.pdf", "team_a");
        assert!(chunks.len() >= 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.metadata["chunk_index"], i);
            assert_eq!(chunk.metadata["source_file"], "greek.pdf");
            assert_eq!(chunk.metadata["group_id"], "team_a");
        }
        assert_eq!(chunks.last().unwrap().metadata["page"], 1);
    }

    #[test]
    fn test_prepare_text_document() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", "Refunds are issued within five business days. ".repeat(60)).unwrap();

        let splitter = RecursiveTextSplitter::new(1000, 200).unwrap();
        let chunks = prepare_document(file.path(), FileType::Txt, &splitter, "faq.txt", "g").unwrap();
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 1000));
    }
}
