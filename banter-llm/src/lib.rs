//! BANTER LLM - provider traits for generation, vision captioning,
//! retrieval, and ingestion.
//!
//! The session pipeline talks to its collaborators exclusively through the
//! traits in this crate. Concrete HTTP implementations live under
//! [`providers`]; every trait also ships a mock so pipeline tests run
//! without a network.

use async_trait::async_trait;
use banter_core::{BanterResult, LlmError, SourcePassage};
use futures_util::{stream, Stream};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

pub mod providers;

pub use providers::openai::{OpenAiChatProvider, OpenAiClient, OpenAiVisionProvider};
pub use providers::retrieval::{HttpIngestor, HttpRetriever};

// ============================================================================
// GENERATION CONSTANTS
// ============================================================================

/// System instruction sent with every generation request.
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant answering questions using the provided context. \
If the context does not contain the answer and you are unsure, say you don't know and suggest what information is missing. \
Be concise and accurate. Do not fabricate citations or sources.";

/// Instruction used when captioning an uploaded image.
pub const CAPTION_INSTRUCTION: &str = "Describe this image for retrieval in a knowledge base. \
Include: what it shows, any visible text (transcribe), entities, and key details. \
Write as compact factual bullet points.";

/// Sampling temperature for generation and captioning.
pub const GENERATION_TEMPERATURE: f32 = 0.2;

/// Default number of passages retrieved per chat request.
pub const DEFAULT_TOP_K: i64 = 5;

/// Upper bound on passages retrieved per chat request.
pub const MAX_TOP_K: i64 = 20;

/// Clamp a client-supplied `top_k` into the accepted range.
pub fn clamp_top_k(requested: i64) -> i64 {
    requested.clamp(1, MAX_TOP_K)
}

// ============================================================================
// CONTEXT SERIALIZATION
// ============================================================================

/// Render one passage as a prompt context block. `index` is 1-based.
pub fn context_block(index: usize, passage: &SourcePassage) -> String {
    format!("[SOURCE {}] {}\n{}", index, passage.source, passage.text)
}

/// Render the full context set in order.
pub fn context_blocks(passages: &[SourcePassage]) -> Vec<String> {
    passages
        .iter()
        .enumerate()
        .map(|(i, passage)| context_block(i + 1, passage))
        .collect()
}

/// User content for a generation request: context first, then the question.
/// With no context the bare message goes through.
pub fn compose_user_content(message: &str, context_blocks: &[String]) -> String {
    if context_blocks.is_empty() {
        message.to_string()
    } else {
        format!(
            "Context:\n{}\n\nQuestion: {}",
            context_blocks.join("\n\n"),
            message
        )
    }
}

// ============================================================================
// PROVIDER TRAITS
// ============================================================================

/// Stream of generated answer fragments.
pub type TokenStream = Pin<Box<dyn Stream<Item = BanterResult<String>> + Send>>;

/// Streaming chat generation.
///
/// Implementations prepend [`SYSTEM_INSTRUCTION`] and serialize the context
/// blocks ahead of the question; callers pass raw blocks.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Open a token stream answering `message` grounded in `context_blocks`.
    /// Setup failures (connect, auth, bad status) surface here; failures
    /// after the stream starts surface as `Err` items in the stream.
    async fn stream_chat(
        &self,
        message: &str,
        context_blocks: &[String],
    ) -> BanterResult<TokenStream>;

    /// Model identifier used for generation.
    fn model_id(&self) -> &str;
}

/// Image captioning, called synchronously during upload of image content.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Produce a retrieval-oriented description of the image. The filename
    /// only informs the mime type guess.
    async fn describe_image(
        &self,
        image: &[u8],
        filename: Option<&str>,
    ) -> BanterResult<String>;
}

/// Context passage retrieval.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `top_k` passages relevant to `query`, descending score.
    async fn retrieve(&self, query: &str, top_k: i64) -> BanterResult<Vec<SourcePassage>>;
}

/// Metadata forwarded to the indexing backend with each ingested file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestMetadata {
    pub uri: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub scope: String,
    pub owner_user_id: Option<String>,
}

/// Hands stored files to the indexing backend so they become retrievable.
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn ingest(&self, path: &str, metadata: &IngestMetadata) -> BanterResult<()>;
}

// ============================================================================
// NULL PROVIDERS
// ============================================================================

/// Retriever used when no retrieval backend is configured. Every query
/// yields an empty context set; chat still answers from the model alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRetriever;

#[async_trait]
impl Retriever for NullRetriever {
    async fn retrieve(&self, _query: &str, _top_k: i64) -> BanterResult<Vec<SourcePassage>> {
        Ok(Vec::new())
    }
}

/// Ingestor used when no indexing backend is configured. Uploads succeed
/// but their content is not retrievable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullIngestor;

#[async_trait]
impl Ingestor for NullIngestor {
    async fn ingest(&self, _path: &str, _metadata: &IngestMetadata) -> BanterResult<()> {
        Ok(())
    }
}

// ============================================================================
// MOCK PROVIDERS FOR TESTING
// ============================================================================

/// Mock chat provider. Streams a canned answer split into word fragments;
/// optionally interrupts mid-stream to exercise error paths.
#[derive(Debug, Clone)]
pub struct MockChatProvider {
    answer: String,
    interrupt_after: Option<usize>,
}

impl MockChatProvider {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            interrupt_after: None,
        }
    }

    /// Emit `fragments` fragments and then fail the stream.
    pub fn interrupting(answer: impl Into<String>, fragments: usize) -> Self {
        Self {
            answer: answer.into(),
            interrupt_after: Some(fragments),
        }
    }
}

#[async_trait]
impl ChatProvider for MockChatProvider {
    async fn stream_chat(
        &self,
        _message: &str,
        _context_blocks: &[String],
    ) -> BanterResult<TokenStream> {
        // split_inclusive keeps the separators, so joining the fragments
        // reproduces the answer exactly.
        let mut items: Vec<BanterResult<String>> = self
            .answer
            .split_inclusive(' ')
            .map(|fragment| Ok(fragment.to_string()))
            .collect();
        if let Some(after) = self.interrupt_after {
            items.truncate(after);
            items.push(Err(LlmError::StreamInterrupted {
                provider: "mock".to_string(),
                reason: "interrupted by test".to_string(),
            }
            .into()));
        }
        Ok(Box::pin(stream::iter(items)))
    }

    fn model_id(&self) -> &str {
        "mock-chat"
    }
}

/// Mock vision provider returning a fixed caption and counting calls.
#[derive(Debug, Clone, Default)]
pub struct MockVisionProvider {
    caption: String,
    calls: Arc<AtomicUsize>,
}

impl MockVisionProvider {
    pub fn new(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of captioning calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    async fn describe_image(
        &self,
        _image: &[u8],
        _filename: Option<&str>,
    ) -> BanterResult<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.caption.clone())
    }
}

/// Mock retriever serving a fixed passage list, truncated to `top_k`.
#[derive(Debug, Clone, Default)]
pub struct MockRetriever {
    passages: Vec<SourcePassage>,
}

impl MockRetriever {
    pub fn new(passages: Vec<SourcePassage>) -> Self {
        Self { passages }
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    async fn retrieve(&self, _query: &str, top_k: i64) -> BanterResult<Vec<SourcePassage>> {
        Ok(self
            .passages
            .iter()
            .take(top_k.max(0) as usize)
            .cloned()
            .collect())
    }
}

/// Mock ingestor recording every ingested path.
#[derive(Debug, Clone, Default)]
pub struct MockIngestor {
    ingested: Arc<RwLock<Vec<String>>>,
}

impl MockIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths handed to [`Ingestor::ingest`] so far.
    pub fn ingested_paths(&self) -> Vec<String> {
        self.ingested
            .read()
            .map(|paths| paths.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Ingestor for MockIngestor {
    async fn ingest(&self, path: &str, _metadata: &IngestMetadata) -> BanterResult<()> {
        if let Ok(mut paths) = self.ingested.write() {
            paths.push(path.to_string());
        }
        Ok(())
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
