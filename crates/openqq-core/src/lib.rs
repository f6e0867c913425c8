//! openqq-core: shared config, prompt cache, knowledge base and the resolution orchestrator.
//!
//! The gateway and the skills crate depend on this crate for the storage layer and for the
//! `TextGenerator` / `ImageTagger` seams the orchestrator dispatches to.

mod cache;
mod error;
mod knowledge;
mod orchestrator;
mod shared;
mod store;

pub use shared::{CoreConfig, LlmModeSetting, STORE_DIR_NAME};

pub use error::{InputError, StorageError, TagError};

pub use cache::{CacheStore, PromptCache};

pub use store::open_store;

pub use knowledge::{KnowledgeRecord, KnowledgeSource, KnowledgeStore, HEALTHCARE_TECH};

pub use orchestrator::{
    format_degraded, require_prompt, Completion, ImageTagger, Orchestrator, Resolution,
    ResolutionSource, TextGenerator,
};
