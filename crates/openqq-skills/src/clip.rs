//! CLIP ViT-B/32 label scorer on candle.
//!
//! The model and tokenizer are loaded once per process behind a `OnceCell` and shared
//! read-only by every request; both loading and inference run on the blocking pool.

use crate::autotag::LabelScorer;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use image::RgbImage;
use openqq_core::TagError;
use std::path::PathBuf;
use std::sync::Arc;
use tokenizers::Tokenizer;
use tokio::sync::OnceCell;

const HUB_REPO: &str = "openai/clip-vit-base-patch32";
const HUB_REVISION: &str = "refs/pr/15";
const WEIGHTS_FILE: &str = "model.safetensors";
const TOKENIZER_FILE: &str = "tokenizer.json";
const PAD_TOKEN: &str = "<|endoftext|>";
/// Per-channel statistics of the CLIP training set (RGB).
const IMAGE_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const IMAGE_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Where the weights come from.
#[derive(Debug, Clone)]
pub enum ClipSource {
    /// Download (or reuse the local hub cache) from Hugging Face.
    Hub { repo: String, revision: String },
    /// Directory holding `model.safetensors` and `tokenizer.json`.
    Local(PathBuf),
}

impl Default for ClipSource {
    fn default() -> Self {
        ClipSource::Hub {
            repo: HUB_REPO.to_string(),
            revision: HUB_REVISION.to_string(),
        }
    }
}

impl ClipSource {
    fn resolve(&self) -> Result<(PathBuf, PathBuf), TagError> {
        match self {
            ClipSource::Local(dir) => Ok((dir.join(WEIGHTS_FILE), dir.join(TOKENIZER_FILE))),
            ClipSource::Hub { repo, revision } => {
                let api = hf_hub::api::sync::Api::new().map_err(|e| TagError::Model(e.to_string()))?;
                let repo = api.repo(hf_hub::Repo::with_revision(
                    repo.clone(),
                    hf_hub::RepoType::Model,
                    revision.clone(),
                ));
                let weights = repo.get(WEIGHTS_FILE).map_err(|e| TagError::Model(e.to_string()))?;
                let tokenizer = repo
                    .get(TOKENIZER_FILE)
                    .map_err(|e| TagError::Model(e.to_string()))?;
                Ok((weights, tokenizer))
            }
        }
    }
}

fn model_err(e: impl std::fmt::Display) -> TagError {
    TagError::Model(e.to_string())
}

fn inference_err(e: impl std::fmt::Display) -> TagError {
    TagError::Inference(e.to_string())
}

/// Resizes to fill a `side` x `side` square and standardizes each channel with the CLIP
/// mean/std. Output shape is `(1, 3, side, side)`.
fn pixel_values(image: RgbImage, side: usize, device: &Device) -> Result<Tensor, TagError> {
    let resized = image::DynamicImage::ImageRgb8(image)
        .resize_to_fill(side as u32, side as u32, image::imageops::FilterType::Triangle)
        .to_rgb8();
    let mean = Tensor::new(&IMAGE_MEAN[..], device)
        .and_then(|t| t.reshape((3, 1, 1)))
        .map_err(inference_err)?;
    let std = Tensor::new(&IMAGE_STD[..], device)
        .and_then(|t| t.reshape((3, 1, 1)))
        .map_err(inference_err)?;
    Tensor::from_vec(resized.into_raw(), (side, side, 3), device)
        .and_then(|t| t.permute((2, 0, 1)))
        .and_then(|t| t.to_dtype(DType::F32))
        .and_then(|t| t.affine(1. / 255., 0.))
        .and_then(|t| t.broadcast_sub(&mean))
        .and_then(|t| t.broadcast_div(&std))
        .and_then(|t| t.unsqueeze(0))
        .map_err(inference_err)
}

/// Loaded model, immutable after construction.
struct ClipHandle {
    model: ClipModel,
    tokenizer: Tokenizer,
    image_size: usize,
    pad_id: u32,
    device: Device,
}

impl ClipHandle {
    fn load(source: &ClipSource) -> Result<Self, TagError> {
        let (weights, tokenizer_path) = source.resolve()?;
        let device = Device::Cpu;
        let config = ClipConfig::vit_base_patch32();
        // SAFETY: the weights file is not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device) }
            .map_err(model_err)?;
        let model = ClipModel::new(vb, &config).map_err(model_err)?;
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(model_err)?;
        let pad_id = *tokenizer
            .get_vocab(true)
            .get(PAD_TOKEN)
            .ok_or_else(|| TagError::Model(format!("tokenizer has no {} token", PAD_TOKEN)))?;
        Ok(Self {
            model,
            tokenizer,
            image_size: config.image_size,
            pad_id,
            device,
        })
    }

    /// Token ids for every label, right-padded to a common length.
    fn input_ids(&self, labels: &[String]) -> Result<Tensor, TagError> {
        let mut tokens = Vec::with_capacity(labels.len());
        for label in labels {
            let encoding = self
                .tokenizer
                .encode(label.as_str(), true)
                .map_err(inference_err)?;
            tokens.push(encoding.get_ids().to_vec());
        }
        let max_len = tokens.iter().map(Vec::len).max().unwrap_or(0);
        for ids in tokens.iter_mut() {
            ids.resize(max_len, self.pad_id);
        }
        Tensor::new(tokens, &self.device).map_err(inference_err)
    }

    fn logits(&self, image: RgbImage, labels: &[String]) -> Result<Vec<f32>, TagError> {
        let pixels = pixel_values(image, self.image_size, &self.device)?;
        let input_ids = self.input_ids(labels)?;
        let (_per_text, per_image) = self
            .model
            .forward(&pixels, &input_ids)
            .map_err(inference_err)?;
        per_image
            .flatten_all()
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(inference_err)
    }
}

/// [`LabelScorer`] backed by CLIP, initialized on first use (or by [`ClipScorer::preload`]).
pub struct ClipScorer {
    source: ClipSource,
    handle: OnceCell<Arc<ClipHandle>>,
}

impl ClipScorer {
    pub fn new(source: ClipSource) -> Self {
        Self {
            source,
            handle: OnceCell::new(),
        }
    }

    /// Hub source unless `dir` names a local model directory.
    pub fn from_model_dir(dir: Option<&str>) -> Self {
        match dir {
            Some(dir) => Self::new(ClipSource::Local(PathBuf::from(dir))),
            None => Self::new(ClipSource::default()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.handle.initialized()
    }

    async fn handle(&self) -> Result<Arc<ClipHandle>, TagError> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                let source = self.source.clone();
                tracing::info!(target: "openqq::autotag", source = ?source, "loading CLIP model");
                let started = std::time::Instant::now();
                let handle = tokio::task::spawn_blocking(move || ClipHandle::load(&source))
                    .await
                    .map_err(model_err)??;
                tracing::info!(
                    target: "openqq::autotag",
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "CLIP model loaded"
                );
                Ok::<_, TagError>(Arc::new(handle))
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Loads the model now instead of on the first request.
    pub async fn preload(&self) -> Result<(), TagError> {
        self.handle().await.map(|_| ())
    }
}

#[async_trait::async_trait]
impl LabelScorer for ClipScorer {
    async fn logits(&self, image: RgbImage, labels: &[String]) -> Result<Vec<f32>, TagError> {
        let handle = self.handle().await?;
        let labels = labels.to_vec();
        tokio::task::spawn_blocking(move || handle.logits(image, &labels))
            .await
            .map_err(inference_err)?
    }
}
