use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Hyperparameters of a [`crate::LanguageModel`].
///
/// Replaces the process-wide mutable globals of older educational GPT code
/// with an explicit value passed into construction, so several independent
/// models can coexist in one process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of distinct token ids the model can consume and emit.
    /// Defaults to 0 in serialized form; the caller fills it in once the
    /// vocabulary is known.
    #[serde(default)]
    pub vocab_size: usize,
    /// Embedding width shared by both embedding tables and every block.
    pub n_embd: usize,
    /// Maximum context length fed into a single forward pass.
    pub block_size: usize,
    /// Number of stacked transformer blocks.
    pub n_layers: usize,
    /// Attention heads per block; must evenly divide `n_embd`.
    pub n_heads: usize,
    /// Stochastic masking rate applied to head outputs. 0.0 disables
    /// masking entirely and keeps generation deterministic.
    #[serde(default)]
    pub dropout: f32,
}

impl ModelConfig {
    /// Width of a single attention head.
    pub fn head_size(&self) -> usize {
        self.n_embd / self.n_heads
    }

    /// Checks that the configuration describes a constructible model.
    pub fn validate(&self) -> Result<()> {
        let dimensions = [
            ("vocab_size", self.vocab_size),
            ("n_embd", self.n_embd),
            ("block_size", self.block_size),
            ("n_layers", self.n_layers),
            ("n_heads", self.n_heads),
        ];

        for (name, value) in dimensions {
            if value == 0 {
                anyhow::bail!("Invalid {name}: must be positive, got 0");
            }
        }

        if self.n_embd % self.n_heads != 0 {
            anyhow::bail!(
                "n_heads ({}) must evenly divide n_embd ({})",
                self.n_heads,
                self.n_embd
            );
        }

        if !(0.0..1.0).contains(&self.dropout) {
            anyhow::bail!("dropout must be in [0, 1), got {}", self.dropout);
        }

        Ok(())
    }

    /// Loads hyperparameters from a JSON file.
    ///
    /// `vocab_size` may be omitted (the corpus determines it later), so the
    /// result is not validated here; [`crate::LanguageModel::new`] validates
    /// the completed configuration.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}
