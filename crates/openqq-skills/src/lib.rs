//! OpenQQ capabilities plugged into the core orchestrator: the generative fallback client and
//! the zero-shot image tagger.

mod autotag;
mod clip;
mod model_router;

pub use autotag::{argmax_first, decode_rgb, softmax, LabelScorer, ZeroShotTagger, DEFAULT_LABELS};
pub use clip::{ClipScorer, ClipSource};
pub use model_router::{GenerationError, LlmMode, ModelRouter};

/// Tagger used by the gateway: CLIP scores behind the fixed label set.
pub type ClipTagger = ZeroShotTagger<ClipScorer>;
