use std::cmp::Ordering;

/// A token ID paired with its logit value.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenLogit {
    pub token_id: u32,
    pub logit: f32,
}

/// Orders candidates by descending logit, breaking ties by ascending token id.
pub(crate) fn by_logit_desc(a: &TokenLogit, b: &TokenLogit) -> Ordering {
    b.logit
        .partial_cmp(&a.logit)
        .unwrap_or(Ordering::Equal)
        .then(a.token_id.cmp(&b.token_id))
}

/// Trait for samplers that modify or select from a set of token logits.
pub trait Sampler: Send + Sync {
    /// Returns the name of this sampler.
    fn name(&self) -> &str;

    /// Modify logits in-place (filtering, scaling, selection).
    fn apply(&mut self, logits: &mut Vec<TokenLogit>);

    /// Observe a token that was appended to the sequence. Default implementation does nothing.
    fn accept(&mut self, _token: u32) {}

    /// Reset any internal state. Default implementation does nothing.
    fn reset(&mut self) {}
}

/// Composes multiple samplers into a pipeline.
/// The last sampler in the chain should be a selector (greedy or random).
pub struct SamplerChain {
    samplers: Vec<Box<dyn Sampler>>,
}

impl SamplerChain {
    /// Create a new empty sampler chain.
    pub fn new() -> Self {
        Self {
            samplers: Vec::new(),
        }
    }

    /// Add a sampler to the end of the chain. Returns self for builder-style usage.
    pub fn add(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.samplers.push(sampler);
        self
    }

    /// Names of the samplers in application order.
    pub fn names(&self) -> Vec<&str> {
        self.samplers.iter().map(|s| s.name()).collect()
    }

    /// Run all samplers in order on raw logits, return the selected token ID.
    ///
    /// Token ids are the indices into `logits`. Returns `None` when nothing
    /// survives the pipeline.
    pub fn sample(&mut self, logits: &[f32]) -> Option<u32> {
        let candidates = logits
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit {
                token_id: i as u32,
                logit,
            })
            .collect();

        self.sample_candidates(candidates)
    }

    /// Run the pipeline on a probability distribution indexed by token id.
    ///
    /// Probabilities are mapped to log space so that temperature scaling and
    /// softmax-based filters behave as they do on raw logits. Tokens with zero
    /// (or non-finite) probability can never be selected and are dropped.
    pub fn sample_probabilities(&mut self, probabilities: &[f32]) -> Option<u32> {
        let candidates = probabilities
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_finite() && **p > 0.0)
            .map(|(i, &p)| TokenLogit {
                token_id: i as u32,
                logit: p.ln(),
            })
            .collect();

        self.sample_candidates(candidates)
    }

    /// Run the pipeline on an explicit candidate set.
    pub fn sample_candidates(&mut self, mut candidates: Vec<TokenLogit>) -> Option<u32> {
        for sampler in self.samplers.iter_mut() {
            if candidates.is_empty() {
                break;
            }
            sampler.apply(&mut candidates);
        }

        candidates.first().map(|t| t.token_id)
    }

    /// Notify every sampler of a token appended to the sequence.
    pub fn accept(&mut self, token: u32) {
        for sampler in self.samplers.iter_mut() {
            sampler.accept(token);
        }
    }

    /// Reset every sampler's internal state.
    pub fn reset(&mut self) {
        for sampler in self.samplers.iter_mut() {
            sampler.reset();
        }
    }
}

impl Default for SamplerChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GreedySampler, TemperatureSampler, TopKSampler};

    #[test]
    fn test_empty_chain_returns_first_candidate() {
        let mut chain = SamplerChain::new();
        assert_eq!(chain.sample(&[0.5, 3.0]), Some(0));
    }

    #[test]
    fn test_empty_logits() {
        let mut chain = SamplerChain::new().add(Box::new(GreedySampler::new()));
        assert_eq!(chain.sample(&[]), None);
    }

    #[test]
    fn test_greedy_chain() {
        let mut chain = SamplerChain::new()
            .add(Box::new(TemperatureSampler::new(0.7)))
            .add(Box::new(TopKSampler::new(2)))
            .add(Box::new(GreedySampler::new()));
        assert_eq!(chain.sample(&[0.1, 2.0, 0.3, 1.9]), Some(1));
        assert_eq!(chain.names(), vec!["temperature", "top_k", "greedy"]);
    }

    #[test]
    fn test_probabilities_skip_zero_mass() {
        let mut chain = SamplerChain::new().add(Box::new(GreedySampler::new()));
        assert_eq!(chain.sample_probabilities(&[0.0, 0.25, 0.75]), Some(2));
        assert_eq!(chain.sample_probabilities(&[0.0, 0.0]), None);
        assert_eq!(chain.sample_probabilities(&[f32::NAN, 0.1]), Some(1));
    }
}
