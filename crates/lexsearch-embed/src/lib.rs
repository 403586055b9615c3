//! lexsearch-embed
//!
//! Sentence embeddings for chunks and queries. [`BertEmbedder`] runs a BERT
//! sentence-transformer (MiniLM by default) with candle; [`HashEmbedder`] is a
//! deterministic stand-in for tests and offline development. Both return
//! unit-norm vectors. Construct one per process and share it as an
//! `Arc<dyn Embedder>`.

pub mod device;
pub mod pool;
pub mod tokenize;

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};
use twox_hash::XxHash64;

use lexsearch_core::config::{expand_path, EmbedSettings};
use lexsearch_core::normalize::tokenize;
pub use lexsearch_core::traits::Embedder;

pub use device::select_device;
pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

pub struct BertEmbedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    id: String,
    dim: usize,
    max_len: usize,
    pad_id: u32,
}

impl BertEmbedder {
    /// Load `config.json`, `tokenizer.json` and `model.safetensors` (or
    /// `pytorch_model.bin`) from `model_dir` onto `device`.
    pub fn load(model_dir: &Path, model_name: &str, max_len: usize, device: Device) -> Result<Self> {
        info!(model = model_name, dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        let config_path = model_dir.join("config.json");
        let raw: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;
        let dim = raw.get("hidden_size").and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("{} has no hidden_size", config_path.display()))? as usize;
        let config: BertConfig = serde_json::from_value(raw)?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        info!(model = model_name, dim, "embedding model loaded");

        Ok(Self { model, tokenizer, device, id: format!("bert:{}:d{}", model_name, dim), dim, max_len, pad_id })
    }

    fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        let elapsed = start.elapsed();
        if elapsed.as_millis() > 100 * texts.len() as u128 { warn!(batch = texts.len(), ?elapsed, "slow embedding batch"); }
        Ok(rows.into_iter().map(|mut v| { l2_normalize(&mut v); v }).collect())
    }
}

impl Embedder for BertEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> { self.embed_texts(texts) }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        debug!(path = %safetensors.display(), "loading safetensors weights");
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    debug!(path = %pickle.display(), "loading pickled weights");
    let weights = candle_core::pickle::read_all(&pickle)
        .with_context(|| format!("reading weights from {}", pickle.display()))?;
    weights.into_iter().map(|(name, t)| Ok((name, t.to_device(device)?))).collect()
}

/// Feature-hashing embedder: each normalized token adds ±1 to one of `dim`
/// buckets, then the vector is L2-normalized. Deterministic and model-free.
pub struct HashEmbedder { dim: usize, id: String }

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        let dim = dim.max(1);
        Self { dim, id: format!("hash:xxh64:d{}", dim) }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = tokenize(text);
        if tokens.is_empty() {
            // Still a unit vector, so empty input cannot poison validation.
            v[(hash(text) as usize) % self.dim] = 1.0;
            return v;
        }
        for token in &tokens {
            let h = hash(token);
            let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
            v[(h as usize) % self.dim] += sign;
        }
        if v.iter().all(|x| *x == 0.0) {
            // Every token cancelled out; fall back to the first token's bucket.
            v[(hash(&tokens[0]) as usize) % self.dim] = 1.0;
        }
        l2_normalize(&mut v);
        v
    }
}

impl Embedder for HashEmbedder {
    fn id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    value.hash(&mut hasher);
    hasher.finish()
}

/// Scale `v` to unit length, accumulating the norm in f64. Zero vectors are
/// left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() { *x = (f64::from(*x) / norm) as f32; }
    }
}

/// The process-wide embedder described by `settings`.
///
/// `embed.use_fake` (or `APP_USE_FAKE_EMBEDDINGS=1`) selects the
/// [`HashEmbedder`]; otherwise the BERT model is loaded from the resolved
/// model directory.
pub fn get_default_embedder(settings: &EmbedSettings) -> Result<Arc<dyn Embedder>> {
    let env_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    if settings.use_fake || env_fake {
        info!(dim = settings.fake_dim, "using HashEmbedder");
        return Ok(Arc::new(HashEmbedder::new(settings.fake_dim)));
    }
    let model_dir = resolve_model_dir(settings)?;
    Ok(Arc::new(BertEmbedder::load(&model_dir, &settings.model_name, settings.max_len, select_device(settings.device))?))
}

fn resolve_model_dir(settings: &EmbedSettings) -> Result<PathBuf> {
    if let Some(dir) = &settings.model_dir {
        let p = expand_path(dir);
        if p.exists() { return Ok(p); }
        warn!(dir = %p.display(), "configured model dir does not exist");
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = expand_path(&dir);
            if p.exists() { debug!(var, dir = %p.display(), "model dir from environment"); return Ok(p); }
        }
    }
    for base in ["../models", "models"] {
        let p = Path::new(base).join(&settings.model_name);
        if p.exists() { return Ok(p); }
    }
    Err(anyhow!("Could not locate model directory for {}", settings.model_name))
}
