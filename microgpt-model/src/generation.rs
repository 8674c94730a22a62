use crate::sampler::Sampler;
use crate::transformer::LanguageModel;
use anyhow::Result;
use std::io::{self, Write};
use std::time::Instant;

/// Streams `max_new_tokens` generated words to stdout, decoding each drawn
/// id through the caller-supplied `decode` function, and returns the
/// extended sequence.
///
/// The core never sees the vocabulary itself, only ids and the decode
/// closure; text concerns stay with the collaborator that owns them.
pub fn run_generation<D>(
    model: &mut LanguageModel,
    sampler: &mut Sampler,
    prompt: &[usize],
    max_new_tokens: usize,
    decode: D,
) -> Result<Vec<usize>>
where
    D: Fn(&[usize]) -> Result<String>,
{
    anyhow::ensure!(!prompt.is_empty(), "Please provide a prompt");

    print!("{}", decode(prompt)?);
    io::stdout().flush()?;

    let block_size = model.config().block_size;
    let mut metrics = TokenMetrics::new();
    let mut sequence = prompt.to_vec();

    for _ in 0..max_new_tokens {
        metrics.start_generation();

        let start = sequence.len().saturating_sub(block_size);
        let window = sequence[start..].to_vec();
        let (logits, _) = model.forward(&[window], None)?;

        let mut scores = logits.last(0).to_vec();
        let next = sampler.sample(&mut scores);
        metrics.increment_token();

        print!(" {}", decode(&[next])?);
        io::stdout().flush()?;
        sequence.push(next);
    }

    metrics.report_and_reset();
    println!();
    Ok(sequence)
}

/// Tracks token generation performance metrics
struct TokenMetrics {
    start_time: Option<Instant>,
    generated_count: usize,
}

impl TokenMetrics {
    fn new() -> Self {
        Self {
            start_time: None,
            generated_count: 0,
        }
    }

    fn start_generation(&mut self) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
    }

    fn increment_token(&mut self) {
        self.generated_count += 1;
    }

    fn report_and_reset(&mut self) {
        if let Some(start_time) = self.start_time.take() {
            let duration = start_time.elapsed();
            if self.generated_count > 0 && duration.as_secs_f64() > 0.0 {
                let tps = self.generated_count as f64 / duration.as_secs_f64();
                println!(
                    "\n[Generated {} tokens in {:.2}s - {:.2} tokens/sec]",
                    self.generated_count,
                    duration.as_secs_f64(),
                    tps
                );
            }
        }
        self.generated_count = 0;
    }
}
