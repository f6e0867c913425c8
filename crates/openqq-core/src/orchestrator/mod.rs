//! Resolution orchestrator: tiered text lookup and image tagging.
//!
//! Text queries walk `CacheLookup -> KnowledgeSearch -> GenerativeFallback -> Persist -> Done`.
//! A cache hit jumps straight to `Done`; knowledge hits skip the generative tier but are
//! persisted like generated answers. Storage failures degrade (read = miss, write = logged),
//! generative failures come back as a placeholder string. Image queries go straight to the
//! configured [`ImageTagger`].

use crate::cache::PromptCache;
use crate::error::{InputError, TagError};
use crate::knowledge::{KnowledgeRecord, KnowledgeSource};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one call to the generative service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Text(String),
    /// The call failed; `reason` carries the failure detail.
    Degraded { reason: String },
}

/// Placeholder returned to the caller when the generative service fails.
pub fn format_degraded(reason: &str) -> String {
    format!("[Error calling model: {}]", reason)
}

/// Remote text-completion service.
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Name for logs and status output.
    fn name(&self) -> &str;

    /// Single attempt, never fails: transport and API errors come back as [`Completion::Degraded`].
    async fn complete(&self, prompt: &str) -> Completion;
}

/// Zero-shot image classifier over a fixed label set.
#[async_trait::async_trait]
pub trait ImageTagger: Send + Sync {
    /// Candidate labels, in tie-break order.
    fn labels(&self) -> &[String];

    /// Returns exactly one label from [`ImageTagger::labels`] or an error; never an empty label.
    async fn tag(&self, image: Vec<u8>) -> Result<String, TagError>;
}

/// Which tier produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Cache,
    Knowledge,
    Generative,
    Degraded,
}

/// Final answer for a text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub response: String,
    pub source: ResolutionSource,
}

enum Stage {
    CacheLookup,
    KnowledgeSearch,
    GenerativeFallback,
    Persist(Resolution),
    Done(Resolution),
}

/// Validates the Ask payload before any resolution runs. Absent and empty prompts are rejected.
pub fn require_prompt(prompt: Option<String>) -> Result<String, InputError> {
    prompt
        .filter(|p| !p.is_empty())
        .ok_or(InputError::MissingPrompt)
}

/// Joins matched records as `name: description` lines, in search order.
fn format_knowledge(records: &[KnowledgeRecord]) -> String {
    records
        .iter()
        .map(KnowledgeRecord::summary_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sequences the cache, knowledge base, generative fallback and image tagger.
pub struct Orchestrator {
    cache: Arc<dyn PromptCache>,
    knowledge: Arc<dyn KnowledgeSource>,
    generator: Arc<dyn TextGenerator>,
    tagger: Arc<dyn ImageTagger>,
    cache_degraded: bool,
}

impl Orchestrator {
    pub fn new(
        cache: Arc<dyn PromptCache>,
        knowledge: Arc<dyn KnowledgeSource>,
        generator: Arc<dyn TextGenerator>,
        tagger: Arc<dyn ImageTagger>,
    ) -> Self {
        Self {
            cache,
            knowledge,
            generator,
            tagger,
            cache_degraded: true,
        }
    }

    /// When false, degraded placeholders are returned but not written back, so a transient
    /// outage does not pin the error string to the prompt.
    pub fn with_degraded_caching(mut self, enabled: bool) -> Self {
        self.cache_degraded = enabled;
        self
    }

    /// Name of the generative backend (status output).
    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    /// Candidate labels of the image tagger.
    pub fn labels(&self) -> &[String] {
        self.tagger.labels()
    }

    /// Resolves a text prompt. Always produces a response; storage and generative failures
    /// are absorbed into degraded-but-present answers.
    pub async fn resolve_text(&self, prompt: &str) -> Resolution {
        let mut stage = Stage::CacheLookup;
        loop {
            stage = match stage {
                Stage::CacheLookup => match self.cache.get(prompt) {
                    Ok(Some(response)) => Stage::Done(Resolution {
                        response,
                        source: ResolutionSource::Cache,
                    }),
                    Ok(None) => Stage::KnowledgeSearch,
                    Err(e) => {
                        tracing::warn!(
                            target: "openqq::resolve",
                            error = %e,
                            "cache read failed, treating as miss"
                        );
                        Stage::KnowledgeSearch
                    }
                },
                Stage::KnowledgeSearch => match self.knowledge.search(prompt) {
                    Ok(records) if !records.is_empty() => Stage::Persist(Resolution {
                        response: format_knowledge(&records),
                        source: ResolutionSource::Knowledge,
                    }),
                    Ok(_) => Stage::GenerativeFallback,
                    Err(e) => {
                        tracing::warn!(
                            target: "openqq::resolve",
                            error = %e,
                            "knowledge search failed, treating as no match"
                        );
                        Stage::GenerativeFallback
                    }
                },
                Stage::GenerativeFallback => {
                    let resolution = match self.generator.complete(prompt).await {
                        Completion::Text(response) => Resolution {
                            response,
                            source: ResolutionSource::Generative,
                        },
                        Completion::Degraded { reason } => {
                            tracing::warn!(
                                target: "openqq::resolve",
                                generator = self.generator.name(),
                                reason = %reason,
                                "generative fallback degraded"
                            );
                            Resolution {
                                response: format_degraded(&reason),
                                source: ResolutionSource::Degraded,
                            }
                        }
                    };
                    Stage::Persist(resolution)
                }
                Stage::Persist(resolution) => {
                    self.persist(prompt, &resolution);
                    Stage::Done(resolution)
                }
                Stage::Done(resolution) => {
                    tracing::info!(
                        target: "openqq::resolve",
                        source = ?resolution.source,
                        prompt_len = prompt.len(),
                        "prompt resolved from {:?}",
                        resolution.source
                    );
                    return resolution;
                }
            };
        }
    }

    fn persist(&self, prompt: &str, resolution: &Resolution) {
        if resolution.source == ResolutionSource::Degraded && !self.cache_degraded {
            tracing::debug!(
                target: "openqq::resolve",
                "degraded response not cached (cache_degraded_responses = false)"
            );
            return;
        }
        if let Err(e) = self.cache.put(prompt, &resolution.response) {
            tracing::warn!(
                target: "openqq::resolve",
                error = %e,
                "cache write failed; returning computed response anyway"
            );
        }
    }

    /// Classifies an uploaded image into one of the tagger's labels.
    pub async fn classify_image(&self, image: Vec<u8>) -> Result<String, TagError> {
        let bytes = image.len();
        let label = self.tagger.tag(image).await?;
        tracing::info!(
            target: "openqq::autotag",
            bytes,
            label = %label,
            "image tagged as '{}'",
            label
        );
        Ok(label)
    }
}
