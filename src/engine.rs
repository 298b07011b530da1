//! Citation-aware query answering.
//!
//! The engine retrieves the top-k sections for a query, re-chunks them to
//! citation granularity, asks the configured generation provider for an
//! answer grounded in exactly those excerpts, and reports one citation per
//! excerpt in retrieval rank order.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::generator::{GenerationRequest, Generator};
use crate::index::{RetrievalIndex, SectionMeta};

/// Source label used when a retrieved entry carries no usable metadata.
const UNKNOWN_SECTION: &str = "Unknown Section";

/// Query engine tuning knobs. The retrieval count itself lives in the
/// index configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound on citation excerpt length, in characters.
    pub citation_chunk_chars: usize,
    /// Sampling temperature passed to the generator.
    pub temperature: f32,
    /// Completion token ceiling passed to the generator.
    pub max_completion_tokens: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            citation_chunk_chars: 512,
            temperature: 0.2,
            max_completion_tokens: 400,
        }
    }
}

/// One grounding reference attached to an answer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Citation {
    /// Citation label of the section the excerpt came from.
    pub source: String,
    /// Excerpt text, never longer than the configured chunk bound.
    pub excerpt: String,
}

/// A generated answer with its grounding citations.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    /// The query as asked.
    pub query: String,
    /// Generated natural-language answer.
    pub answer: String,
    /// Citations in retrieval rank order.
    pub citations: Vec<Citation>,
}

/// Orchestrates retrieve → generate → cite.
pub struct CitationQueryEngine {
    config: EngineConfig,
    generator: Arc<dyn Generator>,
}

impl CitationQueryEngine {
    /// Builds an engine around the configured generation provider.
    pub fn new(config: EngineConfig, generator: Arc<dyn Generator>) -> Self {
        Self { config, generator }
    }

    /// Answers `query` from the given index.
    ///
    /// Zero retrieved sections is not an error: the generator still runs
    /// (over an empty source list) and the citation list stays empty.
    /// Retrieval or generation failures surface as the query's error with
    /// no partial result.
    pub fn answer(&self, index: &RetrievalIndex, query: &str) -> Result<QueryResult> {
        let retrieved = index
            .query(query, index.default_top_k())
            .context("retrieval failed")?;

        let mut citations = Vec::new();
        for section in &retrieved {
            let source = citation_source(&section.meta);
            for excerpt in split_excerpts(&section.text, self.config.citation_chunk_chars) {
                citations.push(Citation {
                    source: source.clone(),
                    excerpt,
                });
            }
        }

        let prompt = build_prompt(query, &citations);
        let answer = self
            .generator
            .complete(&GenerationRequest {
                prompt: &prompt,
                temperature: self.config.temperature,
                max_tokens: self.config.max_completion_tokens,
            })
            .context("generation failed")?;

        Ok(QueryResult {
            query: query.to_string(),
            answer,
            citations,
        })
    }
}

fn citation_source(meta: &SectionMeta) -> String {
    if meta.label.trim().is_empty() {
        UNKNOWN_SECTION.to_string()
    } else {
        meta.label.clone()
    }
}

/// Splits text into word-boundary chunks of at most `max_chars` characters;
/// a single token longer than the bound is split mid-token.
fn split_excerpts(text: &str, max_chars: usize) -> Vec<String> {
    let max = max_chars.max(1);
    let mut excerpts = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;
    for word in text.split_whitespace() {
        for piece in split_oversized(word, max) {
            let needed = piece.chars().count();
            if count > 0 && count + 1 + needed > max {
                excerpts.push(std::mem::take(&mut current));
                count = 0;
            }
            if count > 0 {
                current.push(' ');
                count += 1;
            }
            current.push_str(&piece);
            count += needed;
        }
    }
    if !current.is_empty() {
        excerpts.push(current);
    }
    excerpts
}

fn split_oversized(word: &str, max: usize) -> Vec<String> {
    if word.chars().count() <= max {
        return vec![word.to_string()];
    }
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn build_prompt(query: &str, citations: &[Citation]) -> String {
    let mut prompt = String::new();
    prompt.push_str("Sources:\n");
    for (idx, citation) in citations.iter().enumerate() {
        prompt.push_str(&format!(
            "Source {} [{}]:\n{}\n---\n",
            idx + 1,
            citation.source,
            citation.excerpt
        ));
    }
    if citations.is_empty() {
        prompt.push_str("(no sources available)\n");
    }
    prompt.push_str("\nQuestion:\n");
    prompt.push_str(query);
    prompt.push_str("\n\nAnswer using only the sources above, citing them as [N].\n");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::Embedder;
    use crate::index::IndexConfig;
    use crate::segmenter::segment;
    use crate::store::SectionRecord;

    struct UnitEmbedder;

    impl Embedder for UnitEmbedder {
        fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    /// Generator that records nothing and answers with a canned string.
    struct CannedGenerator;

    impl Generator for CannedGenerator {
        fn complete(&self, request: &GenerationRequest<'_>) -> Result<String> {
            assert!(request.prompt.contains("Question:"));
            Ok("Per [1], widgets are things.".to_string())
        }
    }

    fn indexed(doc: &str) -> RetrievalIndex {
        let records: Vec<SectionRecord> = segment(doc)
            .into_iter()
            .map(|section| SectionRecord {
                id: uuid::Uuid::new_v4().to_string(),
                section,
            })
            .collect();
        let mut index = RetrievalIndex::connect(IndexConfig::default(), Arc::new(UnitEmbedder));
        let report = index.index_sections(&records);
        assert!(report.failures.is_empty());
        index
    }

    #[test]
    fn answers_with_citations_in_rank_order() {
        let index = indexed("1. Scope 1.1. This applies to all vehicles.");
        let engine = CitationQueryEngine::new(EngineConfig::default(), Arc::new(CannedGenerator));

        let result = engine.answer(&index, "what does this apply to?").unwrap();
        assert_eq!(result.query, "what does this apply to?");
        assert_eq!(result.answer, "Per [1], widgets are things.");
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].source, "Scope 1.1");
        assert_eq!(result.citations[0].excerpt, "This applies to all vehicles.");
    }

    #[test]
    fn empty_index_yields_empty_citations_not_an_error() {
        let index = RetrievalIndex::connect(IndexConfig::default(), Arc::new(UnitEmbedder));
        let engine = CitationQueryEngine::new(EngineConfig::default(), Arc::new(CannedGenerator));

        let result = engine.answer(&index, "anything at all").unwrap();
        assert!(result.citations.is_empty());
        assert_eq!(result.answer, "Per [1], widgets are things.");
    }

    #[test]
    fn oversized_sections_are_rechunked_to_the_citation_bound() {
        let long_body = "word ".repeat(200);
        let doc = format!("1. Scope 1.1. {long_body}end.");
        let index = indexed(&doc);
        let config = EngineConfig {
            citation_chunk_chars: 64,
            ..EngineConfig::default()
        };
        let engine = CitationQueryEngine::new(config, Arc::new(CannedGenerator));

        let result = engine.answer(&index, "query").unwrap();
        assert!(result.citations.len() > 1);
        for citation in &result.citations {
            assert!(citation.excerpt.chars().count() <= 64);
            assert_eq!(citation.source, "Scope 1.1");
        }
    }

    #[test]
    fn missing_metadata_falls_back_to_unknown_section() {
        let meta = SectionMeta {
            label: "  ".to_string(),
            main_title: String::new(),
            number: String::new(),
        };
        assert_eq!(citation_source(&meta), UNKNOWN_SECTION);
    }

    #[test]
    fn split_excerpts_respects_the_bound() {
        let text = "alpha beta gamma delta";
        let chunks = split_excerpts(text, 11);
        assert_eq!(chunks, ["alpha beta", "gamma delta"]);

        let oversized = split_excerpts("abcdefghij", 4);
        assert_eq!(oversized, ["abcd", "efgh", "ij"]);

        assert!(split_excerpts("", 16).is_empty());
    }
}
