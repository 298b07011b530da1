//! In-memory registry of ingested documents.
//!
//! The store is an explicitly constructed service object: the serving
//! binary owns one instance for the process lifetime, tests build fresh
//! ones. Entries are append-only: nothing is removed or mutated after
//! insertion, and state does not survive a restart.

use uuid::Uuid;

use crate::segmenter::Section;

/// Opaque identifier assigned to a document at ingestion time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as a plain string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A section together with its ingestion-time identifier.
#[derive(Debug, Clone)]
pub struct SectionRecord {
    /// Unique id, stable for the document's lifetime.
    pub id: String,
    /// The segmented section itself.
    pub section: Section,
}

/// Insertion-ordered mapping from document id to its section sequence.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: Vec<(DocumentId, Vec<SectionRecord>)>,
}

impl DocumentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a (possibly empty) section sequence under a fresh id.
    pub fn add_document(&mut self, sections: Vec<SectionRecord>) -> DocumentId {
        let id = DocumentId::generate();
        self.documents.push((id.clone(), sections));
        id
    }

    /// Sections of the given document, in source order.
    ///
    /// Unknown ids yield an empty slice; callers treat "no sections" and
    /// "unknown id" identically.
    pub fn get(&self, id: &str) -> &[SectionRecord] {
        self.documents
            .iter()
            .find(|(doc_id, _)| doc_id.as_str() == id)
            .map(|(_, sections)| sections.as_slice())
            .unwrap_or(&[])
    }

    /// All documents in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&DocumentId, &[SectionRecord])> {
        self.documents
            .iter()
            .map(|(id, sections)| (id, sections.as_slice()))
    }

    /// First document (in insertion order) containing a section whose
    /// citation label matches `label` exactly. `None` is the not-found
    /// value; lookup never fails.
    pub fn find_document_by_label(&self, label: &str) -> Option<&DocumentId> {
        self.documents
            .iter()
            .find(|(_, sections)| {
                sections
                    .iter()
                    .any(|record| record.section.label == label)
            })
            .map(|(id, _)| id)
    }

    /// Number of registered documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when no document has been ingested yet.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::segment;

    fn records(doc: &str) -> Vec<SectionRecord> {
        segment(doc)
            .into_iter()
            .map(|section| SectionRecord {
                id: Uuid::new_v4().to_string(),
                section,
            })
            .collect()
    }

    #[test]
    fn stores_and_returns_sections_in_order() {
        let mut store = DocumentStore::new();
        let id = store.add_document(records("1. Scope 1.1. First. 1.2. Second."));

        let sections = store.get(id.as_str());
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].section.number.to_string(), "1.1");
        assert_eq!(sections[1].section.number.to_string(), "1.2");
    }

    #[test]
    fn unknown_id_yields_empty_slice() {
        let mut store = DocumentStore::new();
        let known = store.add_document(records("1. Scope 1.1. Text."));

        assert!(!store.get(known.as_str()).is_empty());
        assert!(store.get("no-such-document-id").is_empty());
    }

    #[test]
    fn generated_ids_are_distinct() {
        let mut store = DocumentStore::new();
        let first = store.add_document(Vec::new());
        let second = store.add_document(Vec::new());
        assert_ne!(first, second);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn finds_first_document_by_citation_label() {
        let mut store = DocumentStore::new();
        let first = store.add_document(records("1. Scope 1.1. Shared text."));
        let _second = store.add_document(records("1. Scope 1.1. Same label, later doc."));

        // Labels are unique per document, not globally; insertion order
        // decides which document wins.
        assert_eq!(store.find_document_by_label("Scope 1.1"), Some(&first));
    }

    #[test]
    fn missing_label_is_a_value_not_an_error() {
        let mut store = DocumentStore::new();
        store.add_document(records("1. Scope 1.1. Text."));
        assert_eq!(store.find_document_by_label("Annex 9.9"), None);
        assert_eq!(DocumentStore::new().find_document_by_label("anything"), None);
    }

    #[test]
    fn iterates_in_insertion_order() {
        let mut store = DocumentStore::new();
        let first = store.add_document(Vec::new());
        let second = store.add_document(Vec::new());
        let ids: Vec<&DocumentId> = store.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, [&first, &second]);
    }
}
