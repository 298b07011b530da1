//! Natural-language generation providers.
//!
//! The query engine hands a grounded prompt to a [`Generator`]; which
//! concrete provider answers is a configuration decision made by the
//! caller, the same way the embedding provider is selected.

use anyhow::Result;

mod anthropic;
mod openai;

pub use anthropic::AnthropicGenerator;
pub use openai::OpenAiGenerator;

/// A completion service: grounded prompt in, answer text out.
pub trait Generator: Send + Sync {
    /// Produces a completion for the given request.
    fn complete(&self, request: &GenerationRequest<'_>) -> Result<String>;
}

/// Request envelope shared by the concrete providers.
pub struct GenerationRequest<'a> {
    /// Fully rendered prompt, sources included.
    pub prompt: &'a str,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion token ceiling.
    pub max_tokens: usize,
}

/// System instruction shared by the chat-shaped providers.
pub(crate) const SYSTEM_PROMPT: &str = "You answer questions about regulatory documents \
using only the numbered sources provided. Cite sources as [N] and never invent references.";
