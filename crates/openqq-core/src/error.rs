//! Error taxonomy shared by the store, the orchestrator and the gateway.

use thiserror::Error;

/// Missing or unacceptable request field. Reported to the caller before any resolution runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Prompt is required")]
    MissingPrompt,
    #[error("No image uploaded.")]
    MissingImage,
    /// The upload was present but the body exceeded the configured limit.
    #[error("Image exceeds the upload size limit.")]
    ImageTooLarge,
}

/// The sled store is unreachable, or a record cannot be encoded or read back.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Sled(#[from] sled::Error),
    #[error("corrupt record at '{key}': {reason}")]
    Corrupt { key: String, reason: String },
    #[error("cannot encode record '{key}': {reason}")]
    Encode { key: String, reason: String },
}

/// Image classification failures.
#[derive(Debug, Error)]
pub enum TagError {
    /// The uploaded payload is not a decodable image.
    #[error("invalid image: {0}")]
    Decode(String),
    /// Weights or tokenizer could not be loaded.
    #[error("classifier model unavailable: {0}")]
    Model(String),
    /// The model ran but produced something unusable.
    #[error("classification failed: {0}")]
    Inference(String),
}

impl TagError {
    /// True when the caller sent a bad payload (as opposed to a server-side fault).
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, TagError::Decode(_))
    }
}
