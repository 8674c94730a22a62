//! Binary checkpoint persistence.
//!
//! A checkpoint is a 256-byte header (magic, version, configuration)
//! followed by every parameter tensor as little-endian f32 in a fixed
//! order. Saving a freshly constructed model and loading it back yields a
//! model that generates identically, which makes export-then-generate
//! reproducible across processes.

use crate::config::ModelConfig;
use crate::transformer::{
    AttentionHead, FeedForward, LanguageModel, LayerNorm, Linear, MultiHeadAttention,
    TransformerBlock,
};
use crate::utils::MemoryMapper;
use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::info;
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;

/// Magic number for validating checkpoint files ("mpgt" in ASCII)
const CHECKPOINT_MAGIC: u32 = 0x7467_706D;
/// Expected checkpoint version
const CHECKPOINT_VERSION: i32 = 1;
/// Size of the checkpoint header in bytes
const HEADER_SIZE: usize = 256;

/// Writes a model's configuration and parameters to `path`.
pub fn save_checkpoint(model: &LanguageModel, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create checkpoint: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    write_header(&mut writer, model.config())?;

    write_f32_slice(&mut writer, &model.token_embedding)?;
    write_f32_slice(&mut writer, &model.position_embedding)?;

    for block in &model.blocks {
        write_norm(&mut writer, &block.ln1)?;
        for head in &block.attention.heads {
            write_linear(&mut writer, &head.query)?;
            write_linear(&mut writer, &head.key)?;
            write_linear(&mut writer, &head.value)?;
        }
        write_linear(&mut writer, &block.attention.proj)?;
        write_norm(&mut writer, &block.ln2)?;
        write_linear(&mut writer, &block.feed_forward.expand)?;
        write_linear(&mut writer, &block.feed_forward.contract)?;
    }

    write_norm(&mut writer, &model.final_norm)?;
    write_linear(&mut writer, &model.lm_head)?;

    writer.flush()?;
    info!("💾 Written model checkpoint to {}", path.display());
    Ok(())
}

/// Loads a model from a checkpoint written by [`save_checkpoint`].
///
/// `ctx_length` optionally shrinks the context window (the positional table
/// is cropped to it); `seed` primes the masking RNG of the loaded model.
pub fn load_checkpoint(path: &Path, ctx_length: Option<usize>, seed: u64) -> Result<LanguageModel> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open checkpoint: {}", path.display()))?;
    let mut mapper = MemoryMapper::new(file)?;

    let mut config = read_header(&mut mapper)?;
    let stored_block_size = config.block_size;
    if let Some(ctx_len) = ctx_length {
        config.block_size = ctx_len.min(config.block_size);
    }

    let n_embd = config.n_embd;
    let head_size = config.head_size();

    let token_embedding = mapper
        .read_f32_vec(config.vocab_size * n_embd)
        .context("Failed to read token embedding table")?;

    let mut position_embedding = mapper
        .read_f32_vec(stored_block_size * n_embd)
        .context("Failed to read positional embedding table")?;
    position_embedding.truncate(config.block_size * n_embd);

    let mut blocks = Vec::with_capacity(config.n_layers);
    for layer_idx in 0..config.n_layers {
        let ln1 = read_norm(&mut mapper, n_embd)
            .with_context(|| format!("Failed to read attention norm of layer {layer_idx}"))?;

        let mut heads = Vec::with_capacity(config.n_heads);
        for _ in 0..config.n_heads {
            let query = read_linear(&mut mapper, n_embd, head_size)?;
            let key = read_linear(&mut mapper, n_embd, head_size)?;
            let value = read_linear(&mut mapper, n_embd, head_size)?;
            heads.push(AttentionHead::from_parts(query, key, value, config.dropout));
        }
        let proj = read_linear(&mut mapper, n_embd, n_embd)?;
        let attention = MultiHeadAttention::from_parts(heads, proj);

        let ln2 = read_norm(&mut mapper, n_embd)
            .with_context(|| format!("Failed to read feed-forward norm of layer {layer_idx}"))?;
        let expand = read_linear(&mut mapper, n_embd, 4 * n_embd)?;
        let contract = read_linear(&mut mapper, 4 * n_embd, n_embd)?;
        let feed_forward = FeedForward::from_parts(expand, contract);

        blocks.push(TransformerBlock::from_parts(ln1, attention, ln2, feed_forward));
    }

    let final_norm = read_norm(&mut mapper, n_embd).context("Failed to read final norm")?;
    let lm_head = read_linear(&mut mapper, n_embd, config.vocab_size)?;

    LanguageModel::from_parts(
        config,
        token_embedding,
        position_embedding,
        blocks,
        final_norm,
        lm_head,
        seed,
    )
}

fn write_header<W: Write>(writer: &mut W, config: &ModelConfig) -> Result<()> {
    writer.write_u32::<LittleEndian>(CHECKPOINT_MAGIC)?;
    writer.write_i32::<LittleEndian>(CHECKPOINT_VERSION)?;

    writer.write_u32::<LittleEndian>(config.vocab_size as u32)?;
    writer.write_u32::<LittleEndian>(config.n_embd as u32)?;
    writer.write_u32::<LittleEndian>(config.block_size as u32)?;
    writer.write_u32::<LittleEndian>(config.n_layers as u32)?;
    writer.write_u32::<LittleEndian>(config.n_heads as u32)?;
    writer.write_f32::<LittleEndian>(config.dropout)?;

    // Pad to header size
    let current_pos = 4 + 4 + 5 * 4 + 4; // magic + version + 5 dims + dropout
    let zeros = vec![0u8; HEADER_SIZE - current_pos];
    writer.write_all(&zeros)?;

    Ok(())
}

fn read_header(mapper: &mut MemoryMapper) -> Result<ModelConfig> {
    let data = mapper.get_bytes(HEADER_SIZE).context("Failed to read checkpoint header")?;
    let mut cursor = Cursor::new(data);

    macro_rules! read_u32 {
        ($field:literal) => {
            cursor
                .read_u32::<LittleEndian>()
                .with_context(|| format!("Failed to read {}", $field))? as usize
        };
    }

    let magic = cursor.read_u32::<LittleEndian>().context("Failed to read magic number")?;
    if magic != CHECKPOINT_MAGIC {
        anyhow::bail!(
            "Invalid checkpoint magic number: expected {:#x}, got {:#x}",
            CHECKPOINT_MAGIC,
            magic
        );
    }

    let version = cursor.read_i32::<LittleEndian>().context("Failed to read version")?;
    if version != CHECKPOINT_VERSION {
        anyhow::bail!(
            "Unsupported checkpoint version: expected {}, got {}",
            CHECKPOINT_VERSION,
            version
        );
    }

    let config = ModelConfig {
        vocab_size: read_u32!("vocabulary size"),
        n_embd: read_u32!("embedding width"),
        block_size: read_u32!("context length"),
        n_layers: read_u32!("number of layers"),
        n_heads: read_u32!("number of heads"),
        dropout: cursor
            .read_f32::<LittleEndian>()
            .context("Failed to read dropout rate")?,
    };

    config.validate().context("Invalid model configuration in checkpoint")?;
    Ok(config)
}

fn write_f32_slice<W: Write>(writer: &mut W, values: &[f32]) -> Result<()> {
    for &value in values {
        writer.write_f32::<LittleEndian>(value)?;
    }
    Ok(())
}

fn write_linear<W: Write>(writer: &mut W, linear: &Linear) -> Result<()> {
    write_f32_slice(writer, &linear.weight)?;
    write_f32_slice(writer, &linear.bias)
}

fn write_norm<W: Write>(writer: &mut W, norm: &LayerNorm) -> Result<()> {
    write_f32_slice(writer, &norm.gamma)?;
    write_f32_slice(writer, &norm.beta)
}

fn read_linear(mapper: &mut MemoryMapper, in_features: usize, out_features: usize) -> Result<Linear> {
    let weight = mapper.read_f32_vec(in_features * out_features)?;
    let bias = mapper.read_f32_vec(out_features)?;
    Ok(Linear::from_parameters(weight, bias, in_features, out_features))
}

fn read_norm(mapper: &mut MemoryMapper, width: usize) -> Result<LayerNorm> {
    let gamma = mapper.read_f32_vec(width)?;
    let beta = mapper.read_f32_vec(width)?;
    Ok(LayerNorm::from_parameters(gamma, beta))
}
