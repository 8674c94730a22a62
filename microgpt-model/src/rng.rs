//! Deterministic random source shared by every stochastic component.
//!
//! Parameter initialization, stochastic masking, batch sampling and token
//! draws all consume an explicit, seedable generator instead of global or
//! OS-provided randomness, so two runs with the same seeds produce the same
//! model and the same output.

/// Xorshift64* pseudo-random generator.
#[derive(Debug, Clone)]
pub struct Rng {
    state: u64,
}

impl Rng {
    /// Creates a generator from a seed. A zero seed is remapped to a fixed
    /// non-zero constant, since xorshift is stuck at state zero.
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        ((self.state.wrapping_mul(0x2545F4914F6CDD1D)) >> 32) as u32
    }

    /// Returns a float in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / 16777216.0
    }

    /// Draws from N(mean, std²) via the Box-Muller transform.
    pub fn normal(&mut self, mean: f32, std: f32) -> f32 {
        // ln(0) is -inf, so clamp the uniform draw away from zero.
        let u1 = self.next_f32().max(f32::EPSILON);
        let u2 = self.next_f32();
        let radius = (-2.0 * u1.ln()).sqrt();
        let angle = 2.0 * std::f32::consts::PI * u2;
        mean + std * radius * angle.cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = Rng::new(7);
        let mut b = Rng::new(7);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn uniform_draws_stay_in_unit_interval() {
        let mut rng = Rng::new(123);
        for _ in 0..1000 {
            let x = rng.next_f32();
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn zero_seed_is_usable() {
        let mut rng = Rng::new(0);
        let first = rng.next_u32();
        let second = rng.next_u32();
        assert_ne!(first, second);
    }

    #[test]
    fn normal_draws_center_on_mean() {
        let mut rng = Rng::new(99);
        let n = 10_000;
        let sum: f32 = (0..n).map(|_| rng.normal(0.0, 0.02)).sum();
        assert!((sum / n as f32).abs() < 1e-3);
    }
}
