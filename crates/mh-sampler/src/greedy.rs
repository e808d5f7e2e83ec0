use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::sampler::{by_logit_desc, Sampler, TokenLogit};

/// Greedy sampler: selects the single token with the highest logit.
///
/// Ties are broken by the lowest token id so repeated runs are reproducible.
pub struct GreedySampler;

impl GreedySampler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for GreedySampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for GreedySampler {
    fn name(&self) -> &str {
        "greedy"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        let best = logits
            .iter()
            .min_by(|a, b| by_logit_desc(a, b))
            .cloned();

        logits.clear();
        logits.extend(best);
    }
}

/// Distribution-based sampler: converts logits to probabilities via softmax,
/// then samples from the resulting distribution.
///
/// The RNG lives as long as the sampler, so consecutive draws within one
/// generation are independent while a fixed seed still reproduces the run.
pub struct DistSampler {
    rng: StdRng,
}

impl DistSampler {
    /// Create a new distribution sampler with the given seed for reproducibility.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create a distribution sampler seeded from operating system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Sampler for DistSampler {
    fn name(&self) -> &str {
        "dist"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        if logits.is_empty() {
            return;
        }

        // Compute softmax probabilities.
        let max_logit = logits
            .iter()
            .map(|t| t.logit)
            .fold(f32::NEG_INFINITY, f32::max);

        let exps: Vec<f32> = logits.iter().map(|t| (t.logit - max_logit).exp()).collect();
        let sum: f32 = exps.iter().sum();
        let probs: Vec<f32> = exps.iter().map(|e| e / sum).collect();

        let dist = match WeightedIndex::new(&probs) {
            Ok(d) => d,
            Err(_) => {
                // Invalid weights: fall back to the most likely token.
                GreedySampler.apply(logits);
                return;
            }
        };

        let selected = logits[dist.sample(&mut self.rng)].clone();

        logits.clear();
        logits.push(selected);
    }
}
