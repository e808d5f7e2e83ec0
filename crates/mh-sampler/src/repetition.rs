use std::collections::{HashMap, VecDeque};

use crate::sampler::{Sampler, TokenLogit};

/// Applies repetition, frequency and presence penalties to tokens that have
/// appeared recently.
///
/// For tokens found in the recent window:
/// - Positive logits are divided by `penalty`.
/// - Negative logits are multiplied by `penalty`.
/// - `count * frequency + presence` is then subtracted from the logit.
///
/// This discourages the model from repeating the same tokens.
pub struct RepetitionPenaltySampler {
    penalty: f32,
    frequency: f32,
    presence: f32,
    recent_tokens: VecDeque<u32>,
    max_history: usize,
}

impl RepetitionPenaltySampler {
    /// Create a new repetition penalty sampler.
    ///
    /// - `penalty`: the penalty factor (1.0 = no penalty).
    /// - `max_history`: maximum number of recent tokens to track.
    pub fn new(penalty: f32, max_history: usize) -> Self {
        Self {
            penalty,
            frequency: 0.0,
            presence: 0.0,
            recent_tokens: VecDeque::with_capacity(max_history),
            max_history,
        }
    }

    /// Set the per-occurrence frequency penalty (0.0 = disabled).
    pub fn with_frequency(mut self, frequency: f32) -> Self {
        self.frequency = frequency;
        self
    }

    /// Set the flat presence penalty (0.0 = disabled).
    pub fn with_presence(mut self, presence: f32) -> Self {
        self.presence = presence;
        self
    }

    /// Seed the window with previously generated tokens, oldest first.
    pub fn with_history(mut self, tokens: &[u32]) -> Self {
        for &token in tokens {
            self.add_token(token);
        }
        self
    }

    /// Record a generated token so it will be penalized in future sampling steps.
    pub fn add_token(&mut self, token: u32) {
        if self.max_history == 0 {
            return;
        }
        if self.recent_tokens.len() == self.max_history {
            self.recent_tokens.pop_front();
        }
        self.recent_tokens.push_back(token);
    }

    fn counts(&self) -> HashMap<u32, u32> {
        let mut counts = HashMap::new();
        for &token in &self.recent_tokens {
            *counts.entry(token).or_insert(0) += 1;
        }
        counts
    }
}

impl Sampler for RepetitionPenaltySampler {
    fn name(&self) -> &str {
        "repetition_penalty"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        if self.recent_tokens.is_empty() {
            return;
        }

        let counts = self.counts();
        for token in logits.iter_mut() {
            let Some(&count) = counts.get(&token.token_id) else {
                continue;
            };
            if token.logit > 0.0 {
                token.logit /= self.penalty;
            } else {
                token.logit *= self.penalty;
            }
            token.logit -= count as f32 * self.frequency + self.presence;
        }
    }

    fn accept(&mut self, token: u32) {
        self.add_token(token);
    }

    fn reset(&mut self) {
        self.recent_tokens.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn candidates(values: &[f32]) -> Vec<TokenLogit> {
        values
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit { token_id: i as u32, logit })
            .collect()
    }

    #[test]
    fn test_penalizes_recent_tokens() {
        let mut sampler = RepetitionPenaltySampler::new(2.0, 8).with_history(&[0, 1]);
        let mut logits = candidates(&[4.0, -1.0, 3.0]);
        sampler.apply(&mut logits);
        assert_relative_eq!(logits[0].logit, 2.0);
        assert_relative_eq!(logits[1].logit, -2.0);
        assert_relative_eq!(logits[2].logit, 3.0);
    }

    #[test]
    fn test_frequency_and_presence() {
        let mut sampler = RepetitionPenaltySampler::new(1.0, 8)
            .with_frequency(0.5)
            .with_presence(0.25)
            .with_history(&[2, 2, 2]);
        let mut logits = candidates(&[1.0, 1.0, 1.0]);
        sampler.apply(&mut logits);
        assert_relative_eq!(logits[2].logit, 1.0 - 1.5 - 0.25);
        assert_relative_eq!(logits[0].logit, 1.0);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut sampler = RepetitionPenaltySampler::new(2.0, 2).with_history(&[0, 1]);
        sampler.accept(2);
        let mut logits = candidates(&[4.0, 4.0, 4.0]);
        sampler.apply(&mut logits);
        assert_relative_eq!(logits[0].logit, 4.0);
        assert_relative_eq!(logits[1].logit, 2.0);
        assert_relative_eq!(logits[2].logit, 2.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut sampler = RepetitionPenaltySampler::new(2.0, 4).with_history(&[0]);
        sampler.reset();
        let mut logits = candidates(&[4.0]);
        sampler.apply(&mut logits);
        assert_relative_eq!(logits[0].logit, 4.0);
    }
}
