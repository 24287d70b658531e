//! BM25 keyword index using Tantivy
//!
//! Content is run through the code-aware tokenizer first and indexed into a
//! whitespace-analyzed field, so camelCase and snake_case parts are
//! searchable. Tantivy scores with Okapi BM25 (k1 = 1.2, b = 0.75).

use super::tokenize::{query_terms, tokenize};
use crate::types::{DocId, Document, SearchFilters};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tantivy::{
    collector::TopDocs,
    query::BooleanQuery,
    schema::{Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, Value, STORED, STRING},
    tokenizer::{TextAnalyzer, WhitespaceTokenizer},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};
use tracing::debug;

const CODE_TOKENIZER: &str = "code";
const WRITER_MEMORY_BYTES: usize = 20_000_000;

/// Options for a keyword search
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeywordSearchOptions {
    pub limit: usize,
    #[serde(default)]
    pub filters: SearchFilters,
}

impl Default for KeywordSearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            filters: SearchFilters::default(),
        }
    }
}

/// BM25 search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHit {
    pub doc_id: DocId,
    pub score: f32,
}

/// Schema fields for the keyword index
struct KeywordSchema {
    doc_id: Field,
    terms: Field,
}

/// In-memory BM25 index over one repository's documents
pub struct KeywordIndex {
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    schema: KeywordSchema,
    documents: HashMap<DocId, Document>,
    /// Writes staged since the last commit
    dirty: AtomicBool,
}

impl std::fmt::Debug for KeywordIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordIndex")
            .field("documents", &self.documents.len())
            .field("dirty", &self.dirty.load(Ordering::Relaxed))
            .finish()
    }
}

impl KeywordIndex {
    /// Create an empty index in RAM
    pub fn new_in_memory() -> Result<Self> {
        let (schema, fields) = Self::build_schema();
        let index = Index::create_in_ram(schema);
        index
            .tokenizers()
            .register(CODE_TOKENIZER, TextAnalyzer::from(WhitespaceTokenizer::default()));

        let writer = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .context("Failed to create keyword index writer")?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create keyword index reader")?;

        Ok(Self {
            reader,
            writer: Mutex::new(writer),
            schema: fields,
            documents: HashMap::new(),
            dirty: AtomicBool::new(false),
        })
    }

    fn build_schema() -> (Schema, KeywordSchema) {
        let mut schema_builder = Schema::builder();

        let doc_id = schema_builder.add_text_field("doc_id", STRING | STORED);
        let indexing = TextFieldIndexing::default()
            .set_tokenizer(CODE_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqs)
            .set_fieldnorms(true);
        let terms = schema_builder.add_text_field("terms", TextOptions::default().set_indexing_options(indexing));

        (schema_builder.build(), KeywordSchema { doc_id, terms })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Delete all documents and commit
    pub fn clear(&mut self) -> Result<()> {
        self.writer.get_mut().delete_all_documents()?;
        self.documents.clear();
        self.dirty.store(true, Ordering::SeqCst);
        self.commit()
    }

    /// Stage a document, replacing any existing document with the same id.
    ///
    /// Visible to `search` after the next commit; `search` commits staged
    /// writes itself.
    pub fn add_document(&mut self, document: Document) -> Result<()> {
        let writer = self.writer.get_mut();
        writer.delete_term(Term::from_field_text(self.schema.doc_id, &document.doc_id));

        let mut doc = TantivyDocument::new();
        doc.add_text(self.schema.doc_id, &document.doc_id);
        doc.add_text(self.schema.terms, tokenize(&document.content).join(" "));
        writer.add_document(doc)?;

        self.documents.insert(document.doc_id.clone(), document);
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Stage a batch of documents and commit once
    pub fn add_documents(&mut self, documents: impl IntoIterator<Item = Document>) -> Result<()> {
        for document in documents {
            self.add_document(document)?;
        }
        self.commit()?;
        debug!("Keyword index now holds {} documents", self.documents.len());
        Ok(())
    }

    /// Remove a document; `false` if it was not indexed
    pub fn remove_document(&mut self, doc_id: &str) -> bool {
        if self.documents.remove(doc_id).is_none() {
            return false;
        }
        self.writer
            .get_mut()
            .delete_term(Term::from_field_text(self.schema.doc_id, doc_id));
        self.dirty.store(true, Ordering::SeqCst);
        true
    }

    /// Commit staged writes and reload the reader
    pub fn commit(&self) -> Result<()> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.writer.lock().commit().context("Failed to commit keyword index")?;
        self.reader.reload().context("Failed to reload keyword index reader")?;
        Ok(())
    }

    pub fn get_document(&self, doc_id: &str) -> Option<&Document> {
        self.documents.get(doc_id)
    }

    /// Rank documents for `query`, highest score first.
    ///
    /// Filters are applied to the retrieved hits.
    pub fn search(&self, query: &str, options: &KeywordSearchOptions) -> Result<Vec<KeywordHit>> {
        if options.limit == 0 || self.documents.is_empty() {
            return Ok(Vec::new());
        }
        let terms: Vec<Term> = query_terms(query)
            .iter()
            .map(|t| Term::from_field_text(self.schema.terms, t))
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        self.commit()?;

        let searcher = self.reader.searcher();
        let query = BooleanQuery::new_multiterms_query(terms);
        let window = if options.filters.is_empty() {
            options.limit
        } else {
            self.documents.len()
        };
        let top_docs = searcher
            .search(&query, &TopDocs::with_limit(window))
            .context("Keyword search failed")?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            let Some(doc_id) = doc.get_first(self.schema.doc_id).and_then(|v| v.as_str()) else {
                continue;
            };
            let Some(document) = self.documents.get(doc_id) else {
                continue;
            };
            if !options.filters.is_empty() && !options.filters.matches(&document.metadata) {
                continue;
            }
            hits.push(KeywordHit {
                doc_id: doc_id.to_string(),
                score,
            });
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.doc_id.cmp(&b.doc_id)));
        hits.truncate(options.limit);
        Ok(hits)
    }
}
