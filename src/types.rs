//! Core types shared by the index, retrieval and review layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Unique identifier for an indexed document (one code chunk)
pub type DocId = String;

/// Identifier of the repository an index belongs to
pub type RepoId = String;

/// Embedding vector type
pub type Embedding = Vec<f32>;

/// Metadata attached to an indexed code chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    /// Repository-relative path of the file the chunk came from
    pub file_path: Option<String>,
    /// Programming language of the chunk
    pub language: Option<String>,
    /// Structural marker produced by the chunker (e.g. "function", "class")
    pub chunk_type: Option<String>,
    /// Name of the symbol the chunk defines, if any
    pub symbol_name: Option<String>,
    /// Last modification time of the source file
    pub last_modified: Option<DateTime<Utc>>,
    /// Usage/popularity signal in [0, 1]
    pub popularity: Option<f32>,
    /// Additional custom metadata
    pub extra: HashMap<String, String>,
}

impl DocumentMetadata {
    /// File name component of `file_path`
    pub fn basename(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .and_then(|p| Path::new(p).file_name())
            .and_then(|name| name.to_str())
    }

    /// Whether the chunker recorded structural information for this chunk
    pub fn has_structure(&self) -> bool {
        self.chunk_type.is_some() || self.symbol_name.is_some()
    }
}

/// A document held by the keyword index and the vector store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: DocId,
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(doc_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            content: content.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.metadata.file_path = Some(path.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.metadata.language = Some(language.into());
        self
    }

    pub fn with_chunk_type(mut self, chunk_type: impl Into<String>) -> Self {
        self.metadata.chunk_type = Some(chunk_type.into());
        self
    }

    pub fn with_last_modified(mut self, ts: DateTime<Utc>) -> Self {
        self.metadata.last_modified = Some(ts);
        self
    }
}

/// Optional search filters, shared by keyword and semantic search
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    /// Only match documents whose file path starts with this prefix
    pub path_prefix: Option<String>,
    /// Only match documents in one of these languages
    pub languages: Option<Vec<String>>,
    /// Metadata `extra` key must exactly equal value (all must match)
    pub metadata_equals: Option<Vec<(String, String)>>,
}

impl SearchFilters {
    /// Check if all filter fields are empty/None
    pub fn is_empty(&self) -> bool {
        self.path_prefix.is_none() && self.languages.is_none() && self.metadata_equals.is_none()
    }

    /// Check whether a document's metadata passes every filter
    pub fn matches(&self, meta: &DocumentMetadata) -> bool {
        if let Some(ref prefix) = self.path_prefix {
            match &meta.file_path {
                Some(path) if path.starts_with(prefix.as_str()) => {}
                _ => return false,
            }
        }

        if let Some(ref languages) = self.languages {
            match &meta.language {
                Some(lang) if languages.iter().any(|l| l.eq_ignore_ascii_case(lang)) => {}
                _ => return false,
            }
        }

        if let Some(ref equals) = self.metadata_equals {
            for (key, value) in equals {
                if meta.extra.get(key) != Some(value) {
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_builder_chaining() {
        let doc = Document::new("doc-1", "fn main() {}")
            .with_path("src/main.rs")
            .with_language("rust")
            .with_chunk_type("function");

        assert_eq!(doc.doc_id, "doc-1");
        assert_eq!(doc.metadata.file_path.as_deref(), Some("src/main.rs"));
        assert_eq!(doc.metadata.language.as_deref(), Some("rust"));
        assert!(doc.metadata.has_structure());
    }

    #[test]
    fn test_basename() {
        let doc = Document::new("d", "x").with_path("src/auth/session_store.rs");
        assert_eq!(doc.metadata.basename(), Some("session_store.rs"));
        assert_eq!(DocumentMetadata::default().basename(), None);
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let filters = SearchFilters::default();
        assert!(filters.is_empty());
        assert!(filters.matches(&DocumentMetadata::default()));
    }

    #[test]
    fn test_path_prefix_filter() {
        let filters = SearchFilters {
            path_prefix: Some("src/".to_string()),
            ..Default::default()
        };
        let inside = Document::new("a", "x").with_path("src/lib.rs");
        let outside = Document::new("b", "x").with_path("tests/it.rs");
        let unknown = Document::new("c", "x");

        assert!(filters.matches(&inside.metadata));
        assert!(!filters.matches(&outside.metadata));
        assert!(!filters.matches(&unknown.metadata));
    }

    #[test]
    fn test_language_filter_is_case_insensitive() {
        let filters = SearchFilters {
            languages: Some(vec!["TypeScript".to_string()]),
            ..Default::default()
        };
        let doc = Document::new("a", "x").with_language("typescript");
        assert!(filters.matches(&doc.metadata));
    }

    #[test]
    fn test_metadata_equals_filter() {
        let filters = SearchFilters {
            metadata_equals: Some(vec![("branch".to_string(), "main".to_string())]),
            ..Default::default()
        };
        let mut doc = Document::new("a", "x");
        assert!(!filters.matches(&doc.metadata));
        doc.metadata.extra.insert("branch".to_string(), "main".to_string());
        assert!(filters.matches(&doc.metadata));
    }
}
