//! Ingestion and query orchestration.
//!
//! [`DocumentManager`] ties the pipeline together: extract → segment →
//! assign ids → store → index on the way in, retrieve → generate → cite on
//! the way out. The serving binary owns one manager and serializes access
//! to it; tests construct fresh managers with stub providers.

use anyhow::Result;
use uuid::Uuid;

use crate::engine::{CitationQueryEngine, QueryResult};
use crate::extract::extract_page_texts;
use crate::index::RetrievalIndex;
use crate::segmenter::segment;
use crate::store::{DocumentId, DocumentStore, SectionRecord};

/// Outcome of one ingestion request.
#[derive(Debug, Clone)]
pub struct IngestReceipt {
    /// Identifier assigned to the new document.
    pub doc_id: DocumentId,
    /// Number of sections stored.
    pub section_count: usize,
    /// CRC32 checksum of the raw upload.
    pub checksum: u32,
    /// Labels of sections that failed to index; their text is stored but
    /// not retrievable.
    pub failed_sections: Vec<String>,
}

/// Owns the document store, the retrieval index, and the query engine.
pub struct DocumentManager {
    store: DocumentStore,
    index: RetrievalIndex,
    engine: CitationQueryEngine,
}

impl DocumentManager {
    /// Builds a manager around an already-connected index and engine.
    pub fn new(index: RetrievalIndex, engine: CitationQueryEngine) -> Self {
        Self {
            store: DocumentStore::new(),
            index,
            engine,
        }
    }

    /// Ingests an uploaded PDF.
    ///
    /// Extraction failure aborts the request before any state changes;
    /// indexing failures do not, they are reported in the receipt while
    /// the document (and any successfully indexed sections) remain.
    pub fn ingest_bytes(&mut self, bytes: &[u8]) -> Result<IngestReceipt> {
        let pages = extract_page_texts(bytes)?;
        Ok(self.ingest_extracted(&pages.concat(), checksum(bytes)))
    }

    /// Ingests already-extracted text, skipping the PDF stage.
    pub fn ingest_text(&mut self, text: &str) -> IngestReceipt {
        self.ingest_extracted(text, checksum(text.as_bytes()))
    }

    fn ingest_extracted(&mut self, raw: &str, checksum: u32) -> IngestReceipt {
        let records: Vec<SectionRecord> = segment(raw)
            .into_iter()
            .map(|section| SectionRecord {
                id: Uuid::new_v4().to_string(),
                section,
            })
            .collect();

        let report = self.index.index_sections(&records);
        let section_count = records.len();
        let doc_id = self.store.add_document(records);
        crate::debug_log!(
            "ingested document {doc_id}: {section_count} sections, {} index failures",
            report.failures.len()
        );

        IngestReceipt {
            doc_id,
            section_count,
            checksum,
            failed_sections: report
                .failures
                .into_iter()
                .map(|failure| failure.label)
                .collect(),
        }
    }

    /// Answers a query against everything ingested so far.
    pub fn query(&self, query: &str) -> Result<QueryResult> {
        self.engine.answer(&self.index, query)
    }

    /// Read access to the underlying document store.
    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// First document containing a section with the given citation label.
    pub fn find_document_by_label(&self, label: &str) -> Option<&DocumentId> {
        self.store.find_document_by_label(label)
    }
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::Embedder;
    use crate::engine::EngineConfig;
    use crate::generator::{GenerationRequest, Generator};
    use crate::index::IndexConfig;
    use std::sync::Arc;

    struct UnitEmbedder;

    impl Embedder for UnitEmbedder {
        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(inputs.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct EchoGenerator;

    impl Generator for EchoGenerator {
        fn complete(&self, _request: &GenerationRequest<'_>) -> Result<String> {
            Ok("stub answer".to_string())
        }
    }

    fn manager() -> DocumentManager {
        let index = RetrievalIndex::connect(IndexConfig::default(), Arc::new(UnitEmbedder));
        let engine = CitationQueryEngine::new(EngineConfig::default(), Arc::new(EchoGenerator));
        DocumentManager::new(index, engine)
    }

    #[test]
    fn ingest_text_stores_and_indexes_sections() {
        let mut manager = manager();
        let receipt = manager.ingest_text("1. Scope 1.1. This applies to all vehicles.");

        assert_eq!(receipt.section_count, 1);
        assert!(receipt.failed_sections.is_empty());
        let sections = manager.store().get(receipt.doc_id.as_str());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].section.label, "Scope 1.1");
        assert!(!sections[0].id.is_empty());
    }

    #[test]
    fn receipt_checksum_is_stable_for_identical_input() {
        let mut manager = manager();
        let first = manager.ingest_text("1. Scope 1.1. Text.");
        let second = manager.ingest_text("1. Scope 1.1. Text.");
        assert_eq!(first.checksum, second.checksum);
        assert_ne!(first.doc_id, second.doc_id);
    }

    #[test]
    fn unreadable_bytes_leave_the_store_untouched() {
        let mut manager = manager();
        assert!(manager.ingest_bytes(b"not a pdf at all").is_err());
        assert!(manager.store().is_empty());
    }

    #[test]
    fn query_before_any_ingestion_is_not_an_error() {
        let manager = manager();
        let result = manager.query("anything").unwrap();
        assert!(result.citations.is_empty());
        assert_eq!(result.answer, "stub answer");
    }

    #[test]
    fn citation_label_lookup_round_trips() {
        let mut manager = manager();
        let receipt = manager.ingest_text("1. Scope 1.1. Some body text.");
        assert_eq!(
            manager.find_document_by_label("Scope 1.1"),
            Some(&receipt.doc_id)
        );
        assert_eq!(manager.find_document_by_label("Nope 0.0"), None);
    }
}
