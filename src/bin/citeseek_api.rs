use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use citeseek::{
    AnthropicGenerator, CitationQueryEngine, DocumentManager, EngineConfig, Generator,
    IndexConfig, OpenAiEmbedder, OpenAiEmbedderConfig, OpenAiGenerator, QueryResult,
    RetrievalIndex, SectionRecord,
};
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(
    name = "citeseek-api",
    about = "HTTP API for ingesting numbered regulatory PDFs and answering cited queries"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "CITESEEK_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// OpenAI API key used for embeddings (and generation with the
    /// openai provider).
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Embedding model identifier.
    #[arg(
        long,
        env = "CITESEEK_EMBEDDING_MODEL",
        default_value = "text-embedding-3-small"
    )]
    embedding_model: String,

    /// Optional embedding dimension override.
    #[arg(long, env = "CITESEEK_EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Base URL for OpenAI-compatible endpoints.
    #[arg(
        long,
        env = "CITESEEK_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    openai_base_url: String,

    /// Max inputs per embedding request.
    #[arg(long, env = "CITESEEK_EMBEDDING_BATCH", default_value_t = 32)]
    embedding_batch_size: usize,

    /// Seconds before provider requests time out.
    #[arg(long, env = "CITESEEK_PROVIDER_TIMEOUT_SECS", default_value_t = 30)]
    provider_timeout_secs: u64,

    /// Retry attempts for transient embedding errors.
    #[arg(long, env = "CITESEEK_EMBEDDING_MAX_RETRIES", default_value_t = 3)]
    embedding_max_retries: usize,

    /// Max cached query embeddings kept in memory (0 disables caching).
    #[arg(long, default_value_t = 256)]
    query_cache_size: usize,

    /// Sections retrieved per query.
    #[arg(long, env = "CITESEEK_TOP_K", default_value_t = 2)]
    top_k: usize,

    /// Upper bound on citation excerpt length, in characters.
    #[arg(long, env = "CITESEEK_CITATION_CHARS", default_value_t = 512)]
    citation_chunk_chars: usize,

    /// Target generation provider (openai or anthropic).
    #[arg(long, env = "CITESEEK_LLM_PROVIDER", default_value = "openai")]
    llm_provider: String,

    /// Chat model used for answer synthesis with the openai provider.
    #[arg(long, env = "CITESEEK_LLM_MODEL", default_value = "gpt-4o-mini")]
    llm_model: String,

    /// Anthropic API key (required when --llm-provider anthropic).
    #[arg(long, env = "ANTHROPIC_API_KEY")]
    anthropic_api_key: Option<String>,

    /// Anthropic model identifier.
    #[arg(
        long,
        env = "CITESEEK_ANTHROPIC_MODEL",
        default_value = "claude-3-5-sonnet-20240620"
    )]
    anthropic_model: String,

    /// Sampling temperature for the answer model.
    #[arg(long, default_value_t = 0.2)]
    temperature: f32,

    /// Maximum tokens to request from the completion model.
    #[arg(long, default_value_t = 400)]
    max_completion_tokens: usize,
}

#[derive(Clone)]
struct AppState {
    manager: Arc<Mutex<DocumentManager>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

#[derive(Debug, Serialize)]
struct SectionsView {
    #[serde(rename = "docId")]
    doc_id: String,
    sections: Vec<SectionView>,
}

#[derive(Debug, Serialize)]
struct SectionView {
    id: String,
    extra_info: ExtraInfoView,
    text: String,
}

#[derive(Debug, Serialize)]
struct ExtraInfoView {
    #[serde(rename = "Section")]
    section: String,
    #[serde(rename = "MainSection")]
    main_section: String,
    #[serde(rename = "SubsectionNumber")]
    subsection_number: String,
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    doc_id: String,
    message: String,
    section_count: usize,
    checksum: u32,
    failed_sections: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueryParams {
    q: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ApiCli::parse();
    let provider_timeout = Duration::from_secs(cli.provider_timeout_secs.max(1));

    let embedder = Arc::new(OpenAiEmbedder::new(OpenAiEmbedderConfig {
        api_key: cli.openai_api_key.clone(),
        base_url: cli.openai_base_url.clone(),
        model: cli.embedding_model.clone(),
        dimensions: cli.embedding_dimensions,
        timeout: provider_timeout,
        max_retries: cli.embedding_max_retries.max(1),
        batch_size: cli.embedding_batch_size.max(1),
    })?);

    let generator: Arc<dyn Generator> = match cli.llm_provider.to_lowercase().as_str() {
        "openai" => Arc::new(OpenAiGenerator::new(
            cli.openai_api_key.clone(),
            cli.llm_model.clone(),
            provider_timeout,
        )?),
        "anthropic" => {
            let key = cli.anthropic_api_key.clone().ok_or_else(|| {
                anyhow!("ANTHROPIC_API_KEY must be set for the Anthropic provider")
            })?;
            Arc::new(AnthropicGenerator::new(
                key,
                cli.anthropic_model.clone(),
                provider_timeout,
            )?)
        }
        other => bail!(
            "unsupported llm provider '{}'; use openai or anthropic",
            other
        ),
    };

    let index = RetrievalIndex::connect(
        IndexConfig {
            default_top_k: cli.top_k.max(1),
            query_cache_size: cli.query_cache_size,
        },
        embedder,
    );
    let engine = CitationQueryEngine::new(
        EngineConfig {
            citation_chunk_chars: cli.citation_chunk_chars.max(1),
            temperature: cli.temperature,
            max_completion_tokens: cli.max_completion_tokens,
        },
        generator,
    );
    let state = AppState {
        manager: Arc::new(Mutex::new(DocumentManager::new(index, engine))),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/documents", get(list_documents))
        .route("/documents/upload", post(upload_document))
        .route("/documents/:id", get(get_document))
        .route("/section_by_citation/:source", get(section_by_citation))
        .route("/query", get(query_documents))
        .with_state(state);

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    println!("citeseek-api listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn upload_document(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    if body.is_empty() {
        return Err(bad_request("upload body must not be empty"));
    }
    let manager = state.manager.clone();
    let receipt = tokio::task::spawn_blocking(move || {
        let mut guard = lock_manager(&manager)?;
        guard.ingest_bytes(&body)
    })
    .await
    .map_err(|err| internal_error(anyhow!("ingest task join error: {err}")))?
    .map_err(bad_request_from)?;

    Ok(Json(UploadResponse {
        doc_id: receipt.doc_id.to_string(),
        message: "Document uploaded successfully".to_string(),
        section_count: receipt.section_count,
        checksum: receipt.checksum,
        failed_sections: receipt.failed_sections,
    }))
}

async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<Vec<SectionsView>>, ApiError> {
    let guard = lock_manager(&state.manager).map_err(internal_error)?;
    let views = guard
        .store()
        .iter()
        .map(|(id, sections)| sections_view(id.as_str(), sections))
        .collect();
    Ok(Json(views))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SectionsView>, ApiError> {
    let guard = lock_manager(&state.manager).map_err(internal_error)?;
    let sections = guard.store().get(&id);
    Ok(Json(sections_view(&id, sections)))
}

async fn section_by_citation(
    State(state): State<AppState>,
    Path(source): Path<String>,
) -> Result<Json<String>, ApiError> {
    let guard = lock_manager(&state.manager).map_err(internal_error)?;
    let reply = match guard.find_document_by_label(&source) {
        Some(doc_id) => doc_id.to_string(),
        None => "No matching section found".to_string(),
    };
    Ok(Json(reply))
}

async fn query_documents(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> Result<Json<QueryResult>, ApiError> {
    if params.q.trim().is_empty() {
        return Err(bad_request("query text must not be empty"));
    }
    let manager = state.manager.clone();
    let result = tokio::task::spawn_blocking(move || {
        let guard = lock_manager(&manager)?;
        guard.query(&params.q)
    })
    .await
    .map_err(|err| internal_error(anyhow!("query task join error: {err}")))?
    .map_err(internal_error)?;
    Ok(Json(result))
}

fn sections_view(doc_id: &str, records: &[SectionRecord]) -> SectionsView {
    SectionsView {
        doc_id: doc_id.to_string(),
        sections: records
            .iter()
            .map(|record| SectionView {
                id: record.id.clone(),
                extra_info: ExtraInfoView {
                    section: record.section.label.clone(),
                    main_section: record.section.main_title.clone(),
                    subsection_number: record.section.number.to_string(),
                },
                text: record.section.text.clone(),
            })
            .collect(),
    }
}

fn lock_manager(
    manager: &Arc<Mutex<DocumentManager>>,
) -> Result<std::sync::MutexGuard<'_, DocumentManager>> {
    manager
        .lock()
        .map_err(|_| anyhow!("document manager lock poisoned"))
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn bad_request_from(err: anyhow::Error) -> ApiError {
    bad_request(format!("{err:#}"))
}

fn internal_error(err: anyhow::Error) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: err.to_string(),
        }),
    )
}
