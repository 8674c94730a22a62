use crate::rng::Rng;
use crate::transformer::softmax;

/// A candidate token and its probability, used by the nucleus cutoff.
#[derive(Clone, Debug)]
struct Candidate {
    prob: f32,
    token: usize,
}

/// Temperature / top-p sampler over vocabulary logits.
///
/// Decoding strategies, selected by the construction parameters:
/// - temperature 0: greedy argmax, no randomness consumed;
/// - temperature > 0, top-p in (0, 1): nucleus sampling over the smallest
///   probability mass exceeding `topp`;
/// - temperature > 0, top-p 0 or 1: plain multinomial over the full
///   softmax distribution.
///
/// The sampler owns its seeded [`Rng`], so a fixed seed makes every draw
/// sequence reproducible.
#[derive(Debug)]
pub struct Sampler {
    temperature: f32,
    topp: f32,
    rng: Rng,
    candidates: Vec<Candidate>,
}

impl Sampler {
    /// Creates a sampler for a vocabulary of `vocab_size` tokens.
    pub fn new(vocab_size: usize, temperature: f32, topp: f32, seed: u64) -> Self {
        assert!(vocab_size > 0, "Vocab size must be positive");
        assert!(temperature >= 0.0, "Temperature must be non-negative");
        assert!((0.0..=1.0).contains(&topp), "Top-p must be between 0.0 and 1.0");

        Self {
            temperature,
            topp,
            rng: Rng::new(seed),
            candidates: Vec::with_capacity(vocab_size),
        }
    }

    /// Samples a token index from logits.
    ///
    /// The slice is consumed as scratch space: temperature scaling and
    /// softmax are applied in place before the draw.
    pub fn sample(&mut self, logits: &mut [f32]) -> usize {
        if self.temperature == 0.0 {
            return argmax(logits);
        }

        for logit in logits.iter_mut() {
            *logit /= self.temperature;
        }
        softmax(logits);

        let coin = self.rng.next_f32();
        if self.topp <= 0.0 || self.topp >= 1.0 {
            multinomial(logits, coin)
        } else {
            self.nucleus(logits, coin)
        }
    }

    /// Top-p sampling: restrict the draw to the smallest set of tokens
    /// whose cumulative probability exceeds `topp`.
    fn nucleus(&mut self, probs: &[f32], coin: f32) -> usize {
        // Tokens below this probability cannot be part of the nucleus.
        let cutoff = (1.0 - self.topp) / (probs.len().saturating_sub(1).max(1)) as f32;

        self.candidates.clear();
        self.candidates.extend(
            probs
                .iter()
                .enumerate()
                .filter(|&(_, &prob)| prob >= cutoff)
                .map(|(token, &prob)| Candidate { prob, token }),
        );
        self.candidates
            .sort_unstable_by(|a, b| b.prob.total_cmp(&a.prob));

        // Truncate where the cumulative mass crosses topp.
        let mut cumulative = 0.0;
        let mut last_idx = self.candidates.len().saturating_sub(1);
        for (i, candidate) in self.candidates.iter().enumerate() {
            cumulative += candidate.prob;
            if cumulative > self.topp {
                last_idx = i;
                break;
            }
        }

        let r = coin * cumulative;
        let mut cdf = 0.0;
        for candidate in &self.candidates[..=last_idx] {
            cdf += candidate.prob;
            if r < cdf {
                return candidate.token;
            }
        }
        self.candidates[last_idx].token
    }
}

/// Index of the maximum score (greedy decoding).
fn argmax(scores: &[f32]) -> usize {
    scores
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or_default()
}

/// Multinomial draw from a probability distribution via a CDF walk.
fn multinomial(probs: &[f32], coin: f32) -> usize {
    let mut cdf = 0.0;
    for (i, &prob) in probs.iter().enumerate() {
        cdf += prob;
        if coin < cdf {
            return i;
        }
    }
    probs.len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greedy_picks_the_maximum() {
        let mut sampler = Sampler::new(4, 0.0, 0.9, 1);
        let mut logits = vec![0.1, 2.5, -1.0, 0.4];
        assert_eq!(sampler.sample(&mut logits), 1);
    }

    #[test]
    fn multinomial_walks_the_cdf() {
        assert_eq!(multinomial(&[0.2, 0.5, 0.3], 0.1), 0);
        assert_eq!(multinomial(&[0.2, 0.5, 0.3], 0.4), 1);
        assert_eq!(multinomial(&[0.2, 0.5, 0.3], 0.95), 2);
        // A coin beyond the accumulated mass falls back to the last token.
        assert_eq!(multinomial(&[0.2, 0.5, 0.3], 1.0), 2);
    }

    #[test]
    fn seeded_sampling_is_reproducible() {
        let mut a = Sampler::new(8, 0.8, 0.9, 42);
        let mut b = Sampler::new(8, 0.8, 0.9, 42);
        let logits: Vec<f32> = (0..8).map(|i| (i as f32 * 0.37).sin()).collect();
        for _ in 0..50 {
            assert_eq!(a.sample(&mut logits.clone()), b.sample(&mut logits.clone()));
        }
    }

    #[test]
    fn samples_stay_inside_the_vocabulary() {
        let mut sampler = Sampler::new(5, 1.0, 1.0, 7);
        for _ in 0..200 {
            let mut logits = vec![0.3, -0.2, 1.1, 0.0, -2.0];
            assert!(sampler.sample(&mut logits) < 5);
        }
    }
}
