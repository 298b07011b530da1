//! Semantic retrieval over embedded section text.
//!
//! The index pairs an [`Embedder`] with an in-process vector store:
//! sections go in with a typed metadata bag, similarity queries come out
//! ranked best-first. Similarity scores are an internal detail: callers
//! observe only the ranking and the metadata.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use lru::LruCache;

use crate::embedder::Embedder;
use crate::store::SectionRecord;

/// Typed metadata carried by every index entry; sufficient to reconstruct
/// a citation without consulting the document store.
///
/// `label` is the canonical citation field: it is both the displayed
/// source string and the key citation lookups match on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionMeta {
    /// Citation label, `"{main_title} {number}"`.
    pub label: String,
    /// Title of the owning top-level section.
    pub main_title: String,
    /// Dotted numeral rendered as a string.
    pub number: String,
}

impl SectionMeta {
    fn from_record(record: &SectionRecord) -> Self {
        Self {
            label: record.section.label.clone(),
            main_title: record.section.main_title.clone(),
            number: record.section.number.to_string(),
        }
    }
}

/// Retrieval tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct IndexConfig {
    /// Result count used when a query does not specify `k`.
    pub default_top_k: usize,
    /// Query-embedding cache capacity; 0 disables caching.
    pub query_cache_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            default_top_k: 2,
            query_cache_size: 256,
        }
    }
}

/// One ranked match returned by [`RetrievalIndex::query`].
#[derive(Debug, Clone)]
pub struct RetrievedSection {
    /// Citation metadata of the matched section.
    pub meta: SectionMeta,
    /// The section text as indexed.
    pub text: String,
}

/// Per-section failure recorded while indexing a batch.
#[derive(Debug, Clone)]
pub struct IndexFailure {
    /// Citation label of the section that failed to embed.
    pub label: String,
    /// Human-readable cause.
    pub error: String,
}

/// Outcome of an [`RetrievalIndex::index_sections`] call.
///
/// Indexing is not transactional: sections that embedded successfully stay
/// retrievable even when others in the same batch failed.
#[derive(Debug, Default)]
pub struct IndexReport {
    /// Number of sections inserted.
    pub indexed: usize,
    /// Sections whose embedding failed, in input order.
    pub failures: Vec<IndexFailure>,
}

struct IndexedEntry {
    text: String,
    meta: SectionMeta,
    embedding: Vec<f32>,
}

/// Embedder plus in-process vector store.
pub struct RetrievalIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<IndexedEntry>,
    query_cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
    config: IndexConfig,
}

impl RetrievalIndex {
    /// Wires the index to its embedding provider. Must precede any
    /// indexing or querying; provider selection lives in the caller's
    /// configuration.
    pub fn connect(config: IndexConfig, embedder: Arc<dyn Embedder>) -> Self {
        let query_cache = NonZeroUsize::new(config.query_cache_size)
            .map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self {
            embedder,
            entries: Vec::new(),
            query_cache,
            config,
        }
    }

    /// Result count used when the caller does not pass an explicit `k`.
    pub fn default_top_k(&self) -> usize {
        self.config.default_top_k
    }

    /// Embeds and inserts the given sections.
    ///
    /// A batch embedding failure falls back to per-section embedding so
    /// individual failures can be attributed; failed sections are reported
    /// rather than silently dropped.
    pub fn index_sections(&mut self, records: &[SectionRecord]) -> IndexReport {
        let mut report = IndexReport::default();
        if records.is_empty() {
            return report;
        }

        let texts: Vec<&str> = records
            .iter()
            .map(|record| record.section.text.as_str())
            .collect();
        match self.embedder.embed_batch(&texts) {
            Ok(vectors) => {
                for (record, embedding) in records.iter().zip(vectors) {
                    self.insert(record, embedding);
                    report.indexed += 1;
                }
            }
            Err(batch_err) => {
                crate::debug_log!("batch embedding failed, retrying per section: {batch_err:#}");
                for record in records {
                    match self.embedder.embed(&record.section.text) {
                        Ok(embedding) => {
                            self.insert(record, embedding);
                            report.indexed += 1;
                        }
                        Err(err) => report.failures.push(IndexFailure {
                            label: record.section.label.clone(),
                            error: format!("{err:#}"),
                        }),
                    }
                }
            }
        }
        report
    }

    fn insert(&mut self, record: &SectionRecord, embedding: Vec<f32>) {
        self.entries.push(IndexedEntry {
            text: record.section.text.clone(),
            meta: SectionMeta::from_record(record),
            embedding,
        });
    }

    /// Returns the `k` indexed entries most similar to `query`, best
    /// first. An empty index yields an empty result, not an error.
    pub fn query(&self, query: &str, k: usize) -> Result<Vec<RetrievedSection>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embed_query(query)?;

        let mut ranked: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (cosine_similarity(&query_embedding, &entry.embedding), idx))
            .collect();
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(_, idx)| {
                let entry = &self.entries[idx];
                RetrievedSection {
                    meta: entry.meta.clone(),
                    text: entry.text.clone(),
                }
            })
            .collect())
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        if let Some(cache) = &self.query_cache {
            let mut guard = cache
                .lock()
                .map_err(|_| anyhow::anyhow!("query embedding cache poisoned"))?;
            if let Some(hit) = guard.get(query) {
                return Ok(hit.clone());
            }
        }
        let embedding = self
            .embedder
            .embed(query)
            .context("failed to embed query text")?;
        if let Some(cache) = &self.query_cache {
            let mut guard = cache
                .lock()
                .map_err(|_| anyhow::anyhow!("query embedding cache poisoned"))?;
            guard.put(query.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been indexed yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denominator = (norm_a * norm_b).sqrt();
    if denominator == 0.0 {
        return 0.0;
    }
    dot / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::segment;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic embedder: maps texts onto fixed axes by keyword.
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl Embedder for KeywordEmbedder {
        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs.iter().map(|input| keyword_vector(input)).collect())
        }
    }

    fn keyword_vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        vec![
            if lower.contains("vehicle") { 1.0 } else { 0.1 },
            if lower.contains("widget") { 1.0 } else { 0.1 },
        ]
    }

    /// Embedder whose batch path always fails and whose single path fails
    /// for one marked section.
    struct FlakyEmbedder;

    impl Embedder for FlakyEmbedder {
        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            if inputs.len() > 1 {
                anyhow::bail!("batch endpoint unavailable");
            }
            if inputs[0].contains("poison") {
                anyhow::bail!("embedding rejected");
            }
            Ok(vec![keyword_vector(inputs[0])])
        }
    }

    fn records(doc: &str) -> Vec<SectionRecord> {
        segment(doc)
            .into_iter()
            .map(|section| SectionRecord {
                id: uuid::Uuid::new_v4().to_string(),
                section,
            })
            .collect()
    }

    fn sample_records() -> Vec<SectionRecord> {
        records(
            "1. Scope 1.1. This applies to all vehicles. \
             2. Definitions 2.1. A widget is a thing.",
        )
    }

    #[test]
    fn ranks_matches_best_first() {
        let mut index =
            RetrievalIndex::connect(IndexConfig::default(), Arc::new(KeywordEmbedder::new()));
        let report = index.index_sections(&sample_records());
        assert_eq!(report.indexed, 2);
        assert!(report.failures.is_empty());

        let results = index.query("which vehicles are covered?", 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].meta.label, "Scope 1.1");
        assert_eq!(results[1].meta.label, "Definitions 2.1");

        let results = index.query("define a widget", 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].meta.label, "Definitions 2.1");
    }

    #[test]
    fn empty_index_returns_no_matches() {
        let index =
            RetrievalIndex::connect(IndexConfig::default(), Arc::new(KeywordEmbedder::new()));
        assert!(index.query("anything", 2).unwrap().is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn partial_failures_are_reported_not_dropped() {
        let mut index = RetrievalIndex::connect(IndexConfig::default(), Arc::new(FlakyEmbedder));
        let report = index.index_sections(&records(
            "1. Scope 1.1. This applies to all vehicles. 1.2. poison section body.",
        ));

        assert_eq!(report.indexed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].label, "Scope 1.2");

        // The successfully embedded section stays retrievable.
        let results = index.query("vehicles", 2).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].meta.label, "Scope 1.1");
    }

    #[test]
    fn query_embeddings_are_cached() {
        let embedder = Arc::new(KeywordEmbedder::new());
        let mut index = RetrievalIndex::connect(IndexConfig::default(), embedder.clone());
        index.index_sections(&sample_records());
        let after_indexing = embedder.calls.load(Ordering::SeqCst);

        index.query("vehicles", 1).unwrap();
        index.query("vehicles", 1).unwrap();
        index.query("vehicles", 1).unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), after_indexing + 1);
    }

    #[test]
    fn metadata_reconstructs_the_citation() {
        let mut index =
            RetrievalIndex::connect(IndexConfig::default(), Arc::new(KeywordEmbedder::new()));
        index.index_sections(&sample_records());
        let result = &index.query("widget", 1).unwrap()[0];
        assert_eq!(result.meta.main_title, "Definitions");
        assert_eq!(result.meta.number, "2.1");
        assert_eq!(
            result.meta.label,
            format!("{} {}", result.meta.main_title, result.meta.number)
        );
    }

    #[test]
    fn cosine_similarity_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }
}
