//! Embedding providers: text in, similarity vector out.
//!
//! The index talks to embedding services through the [`Embedder`] trait so
//! tests can substitute deterministic implementations for the HTTP client.

use anyhow::Result;

mod openai;

pub use openai::{OpenAiEmbedder, OpenAiEmbedderConfig};

/// A service that turns text into fixed-dimension similarity vectors.
pub trait Embedder: Send + Sync {
    /// Embeds a batch of inputs, returning one vector per input in order.
    fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single input.
    fn embed(&self, input: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[input])?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for input"))
    }
}
