//! Zero-shot image tagging over a fixed label set.
//!
//! Decoding and the softmax/argmax selection live here; the per-label similarity logits come
//! from a [`LabelScorer`] (CLIP in production, stubs in tests).

use image::RgbImage;
use openqq_core::{ImageTagger, TagError};
use std::sync::Arc;

/// Candidate labels for `/api/autotag`, in tie-break order.
pub const DEFAULT_LABELS: [&str; 4] = ["robot", "sensor", "healthcare", "technology"];

/// Produces one image/text similarity logit per label.
#[async_trait::async_trait]
pub trait LabelScorer: Send + Sync {
    async fn logits(&self, image: RgbImage, labels: &[String]) -> Result<Vec<f32>, TagError>;
}

/// Decodes any supported container format into an RGB8 pixel buffer.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, TagError> {
    let image = image::load_from_memory(bytes).map_err(|e| TagError::Decode(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; ties resolve to the first occurrence. `None` for empty input
/// or when every value is NaN.
pub fn argmax_first(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// [`ImageTagger`] that always answers with one of its labels (no confidence threshold).
pub struct ZeroShotTagger<S> {
    labels: Vec<String>,
    scorer: Arc<S>,
}

impl<S: LabelScorer> ZeroShotTagger<S> {
    pub fn new(scorer: Arc<S>) -> Self {
        Self::with_labels(scorer, DEFAULT_LABELS.iter().map(|l| l.to_string()).collect())
    }

    pub fn with_labels(scorer: Arc<S>, labels: Vec<String>) -> Self {
        Self { labels, scorer }
    }

    pub fn scorer(&self) -> &Arc<S> {
        &self.scorer
    }
}

#[async_trait::async_trait]
impl<S: LabelScorer + 'static> ImageTagger for ZeroShotTagger<S> {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    async fn tag(&self, image: Vec<u8>) -> Result<String, TagError> {
        let rgb = decode_rgb(&image)?;
        tracing::debug!(
            target: "openqq::autotag",
            width = rgb.width(),
            height = rgb.height(),
            "image decoded"
        );

        let logits = self.scorer.logits(rgb, &self.labels).await?;
        if logits.len() != self.labels.len() {
            return Err(TagError::Inference(format!(
                "expected {} scores, got {}",
                self.labels.len(),
                logits.len()
            )));
        }
        let probs = softmax(&logits);
        let best = argmax_first(&probs)
            .ok_or_else(|| TagError::Inference("no finite scores".to_string()))?;
        tracing::debug!(
            target: "openqq::autotag",
            label = %self.labels[best],
            probability = probs[best],
            "label selected"
        );
        Ok(self.labels[best].clone())
    }
}
