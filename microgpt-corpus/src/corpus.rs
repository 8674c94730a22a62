use crate::vocab::Vocabulary;
use anyhow::{Context, Result, ensure};
use log::debug;
use microgpt_model::Rng;
use std::fs;
use std::path::Path;

/// Lowercases a line and strips ASCII punctuation, preserving word breaks.
pub fn clean_line(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_ascii_punctuation())
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads a corpus file into cleaned lines.
///
/// Lines are trimmed and lowercased with punctuation stripped; blank lines
/// and speaker-label lines (those containing a colon) are dropped.
pub fn load_corpus(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;

    let lines: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.contains(':') {
                return None;
            }
            let cleaned = clean_line(line);
            (!cleaned.is_empty()).then_some(cleaned)
        })
        .collect();

    debug!("Loaded {} corpus lines from {}", lines.len(), path.display());
    Ok(lines)
}

/// Encodes cleaned corpus lines into one flat, ordered token-id stream.
pub fn encode_corpus(vocab: &Vocabulary, lines: &[String]) -> Result<Vec<usize>> {
    let mut tokens = Vec::new();
    for line in lines {
        tokens.extend(vocab.encode(line)?);
    }
    Ok(tokens)
}

/// Splits a token stream into a leading training part and a trailing
/// validation part.
pub fn split_tokens(tokens: &[usize], train_fraction: f64) -> (Vec<usize>, Vec<usize>) {
    assert!(
        (0.0..=1.0).contains(&train_fraction),
        "Train fraction must be in [0, 1], got {train_fraction}"
    );
    let train_len = (tokens.len() as f64 * train_fraction) as usize;
    (tokens[..train_len].to_vec(), tokens[train_len..].to_vec())
}

/// Samples `batch_size` random context windows from a token stream.
///
/// Returns `(x, y)` where each `y` row is its `x` row shifted one position
/// ahead — the next-token targets the loss path consumes.
pub fn sample_batch(
    data: &[usize],
    batch_size: usize,
    block_size: usize,
    rng: &mut Rng,
) -> Result<(Vec<Vec<usize>>, Vec<Vec<usize>>)> {
    ensure!(batch_size > 0, "Batch size must be positive");
    ensure!(block_size > 0, "Block size must be positive");
    ensure!(
        data.len() > block_size,
        "Token stream of {} ids is too short for windows of {} ids",
        data.len(),
        block_size
    );

    let span = data.len() - block_size;
    let mut inputs = Vec::with_capacity(batch_size);
    let mut targets = Vec::with_capacity(batch_size);

    for _ in 0..batch_size {
        let start = rng.next_u32() as usize % span;
        inputs.push(data[start..start + block_size].to_vec());
        targets.push(data[start + 1..start + block_size + 1].to_vec());
    }

    Ok((inputs, targets))
}
