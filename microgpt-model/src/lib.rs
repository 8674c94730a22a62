//! Forward-only decoder transformer over a word-level vocabulary.
//!
//! This crate holds the numerical core: embeddings, attention, layer
//! normalization, feed-forward blocks, the block stack, sampling and the
//! autoregressive generation loop, plus binary checkpoint persistence.
//! Corpus handling (text cleaning, vocabulary construction, batching)
//! lives in the sibling `microgpt-corpus` crate; this crate consumes only
//! token ids, a vocabulary size and a decode function.

mod checkpoint;
mod config;
mod generation;
mod rng;
mod sampler;
mod transformer;
mod utils;

use anyhow::Result;
use log::debug;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub use checkpoint::{load_checkpoint, save_checkpoint};
pub use config::ModelConfig;
pub use generation::run_generation;
pub use rng::Rng;
pub use sampler::Sampler;
pub use transformer::{
    AttentionHead, Dropout, FeedForward, LanguageModel, LayerNorm, Linear, Logits,
    MultiHeadAttention, TransformerBlock, softmax,
};

/// Settings for one text-generation session driven from a checkpoint.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    pub checkpoint_path: String,
    pub temperature: f32,
    pub topp: f32,
    pub ctx_length: Option<usize>,
    pub prompt: Option<String>,
    pub max_new_tokens: usize,
    pub seed: u64,
}

impl GenerationConfig {
    pub fn builder() -> GenerationConfigBuilder {
        GenerationConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct GenerationConfigBuilder {
    checkpoint_path: Option<String>,
    temperature: Option<f32>,
    topp: Option<f32>,
    ctx_length: Option<usize>,
    prompt: Option<String>,
    max_new_tokens: Option<usize>,
    seed: Option<u64>,
}

impl GenerationConfigBuilder {
    pub fn checkpoint_path(mut self, path: Option<&String>) -> Self {
        self.checkpoint_path = path.cloned();
        self
    }
    pub fn temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
    pub fn topp(mut self, topp: Option<f32>) -> Self {
        self.topp = topp;
        self
    }
    pub fn ctx_length(mut self, ctx_length: Option<usize>) -> Self {
        self.ctx_length = ctx_length;
        self
    }
    pub fn prompt(mut self, prompt: Option<&String>) -> Self {
        self.prompt = prompt.cloned();
        self
    }
    pub fn max_new_tokens(mut self, max_new_tokens: Option<usize>) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn build(self) -> Result<GenerationConfig, String> {
        Ok(GenerationConfig {
            checkpoint_path: self.checkpoint_path.ok_or("checkpoint_path is required")?,
            temperature: self.temperature.unwrap_or(1.0),
            topp: self.topp.unwrap_or(0.9),
            ctx_length: self.ctx_length,
            prompt: self.prompt,
            max_new_tokens: self.max_new_tokens.unwrap_or(100),
            seed: self.seed.unwrap_or_else(|| {
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap()
                    .as_secs()
            }),
        })
    }
}

/// Loads the checkpoint named by `config`, encodes the prompt and streams a
/// generation to stdout.
///
/// `encode` and `decode` are the vocabulary boundary: the session never
/// touches words directly.
pub fn run_session<E, D>(config: GenerationConfig, encode: E, decode: D) -> Result<()>
where
    E: Fn(&str) -> Result<Vec<usize>>,
    D: Fn(&[usize]) -> Result<String>,
{
    debug!("{config:#?}");

    let mut model = load_checkpoint(
        Path::new(&config.checkpoint_path),
        config.ctx_length,
        config.seed,
    )?;

    debug!("{model:#?}");

    let mut sampler = Sampler::new(
        model.config().vocab_size,
        config.temperature,
        config.topp,
        config.seed,
    );

    let prompt = config.prompt.as_deref().unwrap_or("");
    let prompt_ids = encode(prompt)?;

    run_generation(
        &mut model,
        &mut sampler,
        &prompt_ids,
        config.max_new_tokens,
        decode,
    )?;

    Ok(())
}
