use crate::config::ModelConfig;
use crate::rng::Rng;
use crate::sampler::Sampler;
use anyhow::{Result, ensure};
use log::debug;
use rayon::prelude::*;

/// Epsilon value for numerical stability in layer normalization
const EPSILON: f32 = 1e-5;

/// Standard deviation of the zero-mean normal distribution used for all
/// learned-parameter initialization
const INIT_STD: f32 = 0.02;

/// Dense affine projection: `output = W·x + b`.
///
/// `weight` is stored row-major with shape `[out_features, in_features]`;
/// each output row is an independent dot product, computed in parallel.
/// Parameters are drawn once at construction and never updated (this crate
/// performs no training).
pub struct Linear {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub in_features: usize,
    pub out_features: usize,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, rng: &mut Rng) -> Self {
        assert!(
            in_features > 0 && out_features > 0,
            "Projection dimensions must be positive: {in_features}x{out_features}"
        );
        let weight = (0..in_features * out_features)
            .map(|_| rng.normal(0.0, INIT_STD))
            .collect();
        let bias = vec![0.0; out_features];
        Self { weight, bias, in_features, out_features }
    }

    /// Rebuilds a projection from previously materialized parameters.
    pub fn from_parameters(
        weight: Vec<f32>,
        bias: Vec<f32>,
        in_features: usize,
        out_features: usize,
    ) -> Self {
        assert_eq!(weight.len(), in_features * out_features, "Weight matrix size mismatch");
        assert_eq!(bias.len(), out_features, "Bias vector size mismatch");
        Self { weight, bias, in_features, out_features }
    }

    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        assert_eq!(
            input.len(),
            self.in_features,
            "Input width {} does not match projection input width {}",
            input.len(),
            self.in_features
        );

        let mut output = vec![0.0; self.out_features];
        output.par_iter_mut().enumerate().for_each(|(row, out_val)| {
            let row_start = row * self.in_features;
            let row_weights = &self.weight[row_start..row_start + self.in_features];
            *out_val = row_weights
                .iter()
                .zip(input)
                .map(|(&w, &x)| w * x)
                .sum::<f32>()
                + self.bias[row];
        });
        output
    }

    /// Applies the projection to every leaf vector of a batch,
    /// shape-preserving except the last axis.
    pub fn forward_batch(&self, inputs: &[Vec<f32>]) -> Vec<Vec<f32>> {
        inputs.iter().map(|input| self.forward(input)).collect()
    }
}

impl std::fmt::Debug for Linear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linear")
            .field("in_features", &self.in_features)
            .field("out_features", &self.out_features)
            .finish()
    }
}

/// Stochastic masking: independently zeroes each element with probability
/// `rate` and rescales survivors by `1/(1-rate)` so the expected sum is
/// unchanged.
///
/// A rate of 0.0 makes the layer the identity and consumes no random draws,
/// which keeps generation deterministic. Non-zero rates apply masking to
/// every forward pass, generation included; there is no train/eval switch.
#[derive(Debug, Clone)]
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        assert!((0.0..1.0).contains(&rate), "Drop rate must be in [0, 1), got {rate}");
        Self { rate }
    }

    pub fn forward(&self, input: &[f32], rng: &mut Rng) -> Vec<f32> {
        if self.rate == 0.0 {
            return input.to_vec();
        }

        let keep = 1.0 - self.rate;
        let scale = keep.recip();
        input
            .iter()
            .map(|&val| if rng.next_f32() < keep { val * scale } else { 0.0 })
            .collect()
    }
}

/// One attention head over a single position's residual vector.
///
/// Projects the width-`E` input to query/key/value vectors of the head
/// width, scores them as an element-wise product scaled by `1/sqrt(H)`,
/// normalizes the scores with softmax and weights the value vector.
/// This is the single-position formulation: scores never span other
/// sequence positions, so the head stays a pure function of one vector.
pub struct AttentionHead {
    pub query: Linear,
    pub key: Linear,
    pub value: Linear,
    pub dropout: Dropout,
    pub head_size: usize,
}

impl AttentionHead {
    pub fn new(n_embd: usize, head_size: usize, dropout: f32, rng: &mut Rng) -> Self {
        Self {
            query: Linear::new(n_embd, head_size, rng),
            key: Linear::new(n_embd, head_size, rng),
            value: Linear::new(n_embd, head_size, rng),
            dropout: Dropout::new(dropout),
            head_size,
        }
    }

    pub fn from_parts(query: Linear, key: Linear, value: Linear, dropout: f32) -> Self {
        assert_eq!(query.out_features, key.out_features, "Query/key width mismatch");
        assert_eq!(key.out_features, value.out_features, "Key/value width mismatch");
        let head_size = query.out_features;
        Self { query, key, value, dropout: Dropout::new(dropout), head_size }
    }

    pub fn forward(&self, input: &[f32], rng: &mut Rng) -> Vec<f32> {
        let q = self.query.forward(input);
        let k = self.key.forward(input);
        let v = self.value.forward(input);

        let scale = (self.head_size as f32).sqrt().recip();
        let mut scores: Vec<f32> = q.iter().zip(&k).map(|(&q, &k)| q * k * scale).collect();
        softmax(&mut scores);

        let weighted: Vec<f32> = scores.iter().zip(&v).map(|(&w, &v)| w * v).collect();
        self.dropout.forward(&weighted, rng)
    }
}

impl std::fmt::Debug for AttentionHead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttentionHead")
            .field("head_size", &self.head_size)
            .finish()
    }
}

/// Multi-head attention over a single position.
///
/// Every head receives the same full-width residual vector (not a sliced
/// view of it); the concatenated head outputs are projected back to the
/// embedding width. Requires `n_heads * head_size == n_embd`.
pub struct MultiHeadAttention {
    pub heads: Vec<AttentionHead>,
    pub proj: Linear,
    pub n_embd: usize,
}

impl MultiHeadAttention {
    pub fn new(n_embd: usize, n_heads: usize, dropout: f32, rng: &mut Rng) -> Self {
        assert!(n_heads > 0, "At least one attention head is required");
        assert_eq!(
            n_embd % n_heads,
            0,
            "Head count {n_heads} must evenly divide embedding width {n_embd}"
        );
        let head_size = n_embd / n_heads;
        let heads = (0..n_heads)
            .map(|_| AttentionHead::new(n_embd, head_size, dropout, rng))
            .collect();
        let proj = Linear::new(n_embd, n_embd, rng);
        Self { heads, proj, n_embd }
    }

    pub fn from_parts(heads: Vec<AttentionHead>, proj: Linear) -> Self {
        assert!(!heads.is_empty(), "At least one attention head is required");
        let n_embd = proj.out_features;
        assert_eq!(
            heads.iter().map(|h| h.head_size).sum::<usize>(),
            n_embd,
            "Concatenated head width must match the output projection"
        );
        Self { heads, proj, n_embd }
    }

    pub fn forward(&self, input: &[f32], rng: &mut Rng) -> Vec<f32> {
        let mut concat = Vec::with_capacity(self.n_embd);
        for head in &self.heads {
            concat.extend(head.forward(input, rng));
        }
        self.proj.forward(&concat)
    }
}

impl std::fmt::Debug for MultiHeadAttention {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiHeadAttention")
            .field("n_heads", &self.heads.len())
            .field("n_embd", &self.n_embd)
            .finish()
    }
}

/// Layer normalization with learned per-feature scale and shift.
///
/// Normalizes a vector to zero mean and unit variance (biased variance,
/// epsilon-stabilized), then applies `gamma * x + beta`. Deterministic.
pub struct LayerNorm {
    pub gamma: Vec<f32>,
    pub beta: Vec<f32>,
}

impl LayerNorm {
    pub fn new(n_embd: usize) -> Self {
        assert!(n_embd > 0, "Normalization width must be positive");
        Self { gamma: vec![1.0; n_embd], beta: vec![0.0; n_embd] }
    }

    pub fn from_parameters(gamma: Vec<f32>, beta: Vec<f32>) -> Self {
        assert_eq!(gamma.len(), beta.len(), "Scale/shift width mismatch");
        Self { gamma, beta }
    }

    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        assert_eq!(
            input.len(),
            self.gamma.len(),
            "Input width {} does not match normalization width {}",
            input.len(),
            self.gamma.len()
        );

        let n = input.len() as f32;
        let mean = input.iter().sum::<f32>() / n;
        let variance = input.iter().map(|&v| (v - mean) * (v - mean)).sum::<f32>() / n;
        let inv_std = (variance + EPSILON).sqrt().recip();

        input
            .iter()
            .zip(self.gamma.iter())
            .zip(self.beta.iter())
            .map(|((&val, &g), &b)| g * ((val - mean) * inv_std) + b)
            .collect()
    }

    /// Normalizes every leaf vector of a batch independently.
    pub fn forward_batch(&self, inputs: &[Vec<f32>]) -> Vec<Vec<f32>> {
        inputs.iter().map(|input| self.forward(input)).collect()
    }
}

impl std::fmt::Debug for LayerNorm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerNorm")
            .field("dim", &self.gamma.len())
            .finish()
    }
}

/// Position-wise feed-forward block: expand to `4E`, rectify, contract to `E`.
pub struct FeedForward {
    pub expand: Linear,
    pub contract: Linear,
}

impl FeedForward {
    pub fn new(n_embd: usize, rng: &mut Rng) -> Self {
        Self {
            expand: Linear::new(n_embd, 4 * n_embd, rng),
            contract: Linear::new(4 * n_embd, n_embd, rng),
        }
    }

    pub fn from_parts(expand: Linear, contract: Linear) -> Self {
        assert_eq!(
            expand.out_features, contract.in_features,
            "Hidden widths of the two projections must agree"
        );
        Self { expand, contract }
    }

    pub fn forward(&self, input: &[f32]) -> Vec<f32> {
        let mut hidden = self.expand.forward(input);
        for val in &mut hidden {
            *val = val.max(0.0);
        }
        self.contract.forward(&hidden)
    }
}

impl std::fmt::Debug for FeedForward {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedForward")
            .field("hidden_dim", &self.expand.out_features)
            .finish()
    }
}

/// One decoder layer: normalization, multi-head attention and feed-forward,
/// combined through a triple-branch residual.
///
/// ```text
/// x1  = ln1(x)
/// out = x + attention(x1) + feed_forward(ln2(x1))
/// ```
///
/// Both sub-layer branches are added onto the *original* input rather than
/// chained through two sequential residual additions, and the feed-forward
/// branch normalizes `x1`, not the attention output.
pub struct TransformerBlock {
    pub ln1: LayerNorm,
    pub attention: MultiHeadAttention,
    pub ln2: LayerNorm,
    pub feed_forward: FeedForward,
}

impl TransformerBlock {
    pub fn new(n_embd: usize, n_heads: usize, dropout: f32, rng: &mut Rng) -> Self {
        Self {
            ln1: LayerNorm::new(n_embd),
            attention: MultiHeadAttention::new(n_embd, n_heads, dropout, rng),
            ln2: LayerNorm::new(n_embd),
            feed_forward: FeedForward::new(n_embd, rng),
        }
    }

    pub fn from_parts(
        ln1: LayerNorm,
        attention: MultiHeadAttention,
        ln2: LayerNorm,
        feed_forward: FeedForward,
    ) -> Self {
        Self { ln1, attention, ln2, feed_forward }
    }

    pub fn forward(&self, input: &[f32], rng: &mut Rng) -> Vec<f32> {
        let x1 = self.ln1.forward(input);
        let attn = self.attention.forward(&x1, rng);
        let x2 = self.ln2.forward(&x1);
        let ff = self.feed_forward.forward(&x2);

        input
            .iter()
            .zip(&attn)
            .zip(&ff)
            .map(|((&x, &a), &f)| x + a + f)
            .collect()
    }

    /// Maps the block over every leaf vector of a batch.
    pub fn forward_batch(&self, inputs: &[Vec<f32>], rng: &mut Rng) -> Vec<Vec<f32>> {
        inputs.iter().map(|input| self.forward(input, rng)).collect()
    }
}

impl std::fmt::Debug for TransformerBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerBlock")
            .field("ln1", &self.ln1)
            .field("attention", &self.attention)
            .field("ln2", &self.ln2)
            .field("feed_forward", &self.feed_forward)
            .finish()
    }
}

/// Vocabulary scores produced by a forward pass.
///
/// Rows may have differing position counts (ragged batches are allowed);
/// each row stores its positions contiguously as `positions × vocab_size`.
pub struct Logits {
    rows: Vec<Vec<f32>>,
    vocab_size: usize,
}

impl Logits {
    pub fn batch_size(&self) -> usize {
        self.rows.len()
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Number of sequence positions in one batch row.
    pub fn positions(&self, row: usize) -> usize {
        self.rows[row].len() / self.vocab_size
    }

    /// Scores over the vocabulary at one (row, position).
    pub fn at(&self, row: usize, pos: usize) -> &[f32] {
        let start = pos * self.vocab_size;
        &self.rows[row][start..start + self.vocab_size]
    }

    /// Scores at the final position of a row, the next-token distribution
    /// input for autoregressive decoding.
    pub fn last(&self, row: usize) -> &[f32] {
        self.at(row, self.positions(row) - 1)
    }
}

impl std::fmt::Debug for Logits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logits")
            .field("batch_size", &self.rows.len())
            .field("vocab_size", &self.vocab_size)
            .finish()
    }
}

/// Decoder-only language model: token and positional embeddings, a stack of
/// transformer blocks, a final normalization and a projection to vocabulary
/// logits.
///
/// **Process flow** (per batch row, per position):
/// 1. Embedding lookup: token table row plus positional table row.
/// 2. The residual vector passes through every block in order.
/// 3. Final layer normalization.
/// 4. Output projection to vocabulary-width logits.
///
/// All parameters are initialized from the construction seed through the
/// explicit [`Rng`], so a `(config, seed)` pair always denotes the same
/// model. The model performs forward inference and autoregressive
/// generation only; there is no training path.
pub struct LanguageModel {
    pub(crate) config: ModelConfig,
    /// Token embedding table, `vocab_size × n_embd` row-major.
    pub(crate) token_embedding: Vec<f32>,
    /// Positional embedding table, `block_size × n_embd` row-major.
    pub(crate) position_embedding: Vec<f32>,
    pub(crate) blocks: Vec<TransformerBlock>,
    pub(crate) final_norm: LayerNorm,
    pub(crate) lm_head: Linear,
    /// Random source for stochastic masking draws. Untouched when the
    /// configured dropout rate is zero.
    pub(crate) rng: Rng,
}

impl LanguageModel {
    /// Builds a model with freshly initialized parameters.
    ///
    /// Embedding tables and projection weights are drawn from N(0, 0.02²),
    /// biases start at zero, normalization scales at one. Deterministic
    /// given `seed`.
    pub fn new(config: ModelConfig, seed: u64) -> Result<Self> {
        config.validate()?;

        let mut rng = Rng::new(seed);
        let n_embd = config.n_embd;

        let token_embedding = (0..config.vocab_size * n_embd)
            .map(|_| rng.normal(0.0, INIT_STD))
            .collect();
        let position_embedding = (0..config.block_size * n_embd)
            .map(|_| rng.normal(0.0, INIT_STD))
            .collect();

        let blocks = (0..config.n_layers)
            .map(|_| TransformerBlock::new(n_embd, config.n_heads, config.dropout, &mut rng))
            .collect();

        let final_norm = LayerNorm::new(n_embd);
        let lm_head = Linear::new(n_embd, config.vocab_size, &mut rng);

        debug!(
            "Initialized model: vocab_size={}, n_embd={}, block_size={}, n_layers={}, n_heads={}",
            config.vocab_size, n_embd, config.block_size, config.n_layers, config.n_heads
        );

        Ok(Self {
            config,
            token_embedding,
            position_embedding,
            blocks,
            final_norm,
            lm_head,
            rng,
        })
    }

    /// Rebuilds a model from externally materialized parameters
    /// (checkpoint loading). The configuration must already be valid.
    pub(crate) fn from_parts(
        config: ModelConfig,
        token_embedding: Vec<f32>,
        position_embedding: Vec<f32>,
        blocks: Vec<TransformerBlock>,
        final_norm: LayerNorm,
        lm_head: Linear,
        seed: u64,
    ) -> Result<Self> {
        config.validate()?;
        ensure!(
            token_embedding.len() == config.vocab_size * config.n_embd,
            "Token embedding table has {} values, expected {}",
            token_embedding.len(),
            config.vocab_size * config.n_embd
        );
        ensure!(
            position_embedding.len() == config.block_size * config.n_embd,
            "Positional embedding table has {} values, expected {}",
            position_embedding.len(),
            config.block_size * config.n_embd
        );
        ensure!(
            blocks.len() == config.n_layers,
            "Expected {} transformer blocks, got {}",
            config.n_layers,
            blocks.len()
        );

        Ok(Self {
            config,
            token_embedding,
            position_embedding,
            blocks,
            final_norm,
            lm_head,
            rng: Rng::new(seed),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Forward pass over a batch of token-id sequences.
    ///
    /// Rows may have differing lengths; every row must be non-empty, no
    /// longer than the context window, and contain only in-vocabulary ids.
    /// When `targets` is given (same shape as `tokens`, ids in range) the
    /// mean cross-entropy over all (row, position) pairs is returned
    /// alongside the logits.
    pub fn forward(
        &mut self,
        tokens: &[Vec<usize>],
        targets: Option<&[Vec<usize>]>,
    ) -> Result<(Logits, Option<f32>)> {
        self.validate_batch(tokens)?;
        self.context_window_check(tokens)?;
        if let Some(targets) = targets {
            self.validate_targets(tokens, targets)?;
        }

        let n_embd = self.config.n_embd;
        let vocab_size = self.config.vocab_size;
        let token_embedding = &self.token_embedding;
        let position_embedding = &self.position_embedding;
        let blocks = &self.blocks;
        let final_norm = &self.final_norm;
        let lm_head = &self.lm_head;
        let rng = &mut self.rng;

        let mut rows = Vec::with_capacity(tokens.len());
        for sequence in tokens {
            // Residual stream: one width-E vector per position.
            let mut stream: Vec<Vec<f32>> = sequence
                .iter()
                .enumerate()
                .map(|(pos, &id)| {
                    let tok = &token_embedding[id * n_embd..(id + 1) * n_embd];
                    let pos_emb = &position_embedding[pos * n_embd..(pos + 1) * n_embd];
                    tok.iter().zip(pos_emb).map(|(&t, &p)| t + p).collect()
                })
                .collect();

            for block in blocks {
                stream = block.forward_batch(&stream, rng);
            }
            let stream = final_norm.forward_batch(&stream);

            let mut row = Vec::with_capacity(stream.len() * vocab_size);
            for vector in &stream {
                row.extend(lm_head.forward(vector));
            }
            rows.push(row);
        }

        let logits = Logits { rows, vocab_size };
        let loss = targets.map(|targets| cross_entropy(&logits, targets));
        Ok((logits, loss))
    }

    /// Autoregressive generation: extends every prompt by `max_new_tokens`
    /// ids, one per step.
    ///
    /// Each step crops every sequence to its last `block_size` ids, runs a
    /// forward pass, softmax-samples the final-position distribution
    /// through `sampler` and appends the drawn id. Prompts shorter than the
    /// context window are consumed whole.
    pub fn generate(
        &mut self,
        prompts: &[Vec<usize>],
        max_new_tokens: usize,
        sampler: &mut Sampler,
    ) -> Result<Vec<Vec<usize>>> {
        self.validate_batch(prompts)?;

        let block_size = self.config.block_size;
        let mut sequences: Vec<Vec<usize>> = prompts.to_vec();

        for _ in 0..max_new_tokens {
            let cropped: Vec<Vec<usize>> = sequences
                .iter()
                .map(|seq| {
                    let start = seq.len().saturating_sub(block_size);
                    seq[start..].to_vec()
                })
                .collect();

            let (logits, _) = self.forward(&cropped, None)?;

            for (row, sequence) in sequences.iter_mut().enumerate() {
                let mut scores = logits.last(row).to_vec();
                let next = sampler.sample(&mut scores);
                debug_assert!(next < self.config.vocab_size);
                sequence.push(next);
            }
        }

        Ok(sequences)
    }

    fn validate_batch(&self, tokens: &[Vec<usize>]) -> Result<()> {
        ensure!(!tokens.is_empty(), "Batch must contain at least one sequence");
        for (row, sequence) in tokens.iter().enumerate() {
            ensure!(!sequence.is_empty(), "Sequence {row} is empty");
            for (pos, &id) in sequence.iter().enumerate() {
                ensure!(
                    id < self.config.vocab_size,
                    "Token id {id} at ({row}, {pos}) is outside the vocabulary of size {}",
                    self.config.vocab_size
                );
            }
        }
        Ok(())
    }

    fn validate_targets(&self, tokens: &[Vec<usize>], targets: &[Vec<usize>]) -> Result<()> {
        ensure!(
            targets.len() == tokens.len(),
            "Target batch has {} rows, input batch has {}",
            targets.len(),
            tokens.len()
        );
        for (row, (sequence, target)) in tokens.iter().zip(targets).enumerate() {
            ensure!(
                target.len() == sequence.len(),
                "Target row {row} has {} positions, input row has {}",
                target.len(),
                sequence.len()
            );
            for (pos, &id) in target.iter().enumerate() {
                ensure!(
                    id < self.config.vocab_size,
                    "Target id {id} at ({row}, {pos}) is outside the vocabulary of size {}",
                    self.config.vocab_size
                );
            }
        }
        Ok(())
    }

    // Applies to `forward` only; `generate` crops before calling it.
    fn context_window_check(&self, tokens: &[Vec<usize>]) -> Result<()> {
        for (row, sequence) in tokens.iter().enumerate() {
            ensure!(
                sequence.len() <= self.config.block_size,
                "Sequence {row} has {} tokens, context window is {}",
                sequence.len(),
                self.config.block_size
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for LanguageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        struct BlocksSummary<'a, T>(&'a [T]);

        impl<'a, T: std::fmt::Debug> std::fmt::Debug for BlocksSummary<'a, T> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_list()
                    .entries(self.0.iter().take(1))
                    .entry(&format_args!(
                        "... and {} more",
                        self.0.len().saturating_sub(1)
                    ))
                    .finish()
            }
        }

        f.debug_struct("LanguageModel")
            .field("config", &self.config)
            .field("blocks", &BlocksSummary(&self.blocks))
            .field("final_norm", &self.final_norm)
            .field("lm_head", &self.lm_head)
            .finish()
    }
}

/// Applies softmax normalization to a slice in-place, with max-subtraction
/// for numerical stability.
pub fn softmax(x: &mut [f32]) {
    let max_val = x.iter().fold(f32::NEG_INFINITY, |acc, &val| acc.max(val));
    let sum = x
        .iter_mut()
        .map(|val| {
            *val = (*val - max_val).exp();
            *val
        })
        .sum::<f32>();
    let inv_sum = sum.recip();
    x.iter_mut().for_each(|val| *val *= inv_sum);
}

/// Mean cross-entropy of the target ids under the logits' softmax
/// distributions, computed via max-subtracted log-sum-exp.
fn cross_entropy(logits: &Logits, targets: &[Vec<usize>]) -> f32 {
    let mut total = 0.0f32;
    let mut count = 0usize;

    for row in 0..logits.batch_size() {
        for pos in 0..logits.positions(row) {
            let scores = logits.at(row, pos);
            let target = targets[row][pos];

            let max_val = scores.iter().fold(f32::NEG_INFINITY, |acc, &val| acc.max(val));
            let log_sum_exp = scores.iter().map(|&s| (s - max_val).exp()).sum::<f32>().ln() + max_val;

            total += log_sum_exp - scores[target];
            count += 1;
        }
    }

    total / count as f32
}
