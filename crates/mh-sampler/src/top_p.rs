use crate::sampler::{by_logit_desc, Sampler, TokenLogit};

/// Nucleus filtering: keeps the shortest run of most likely tokens whose
/// softmax mass exceeds `p`. At least one token always survives.
///
/// `p >= 1.0` disables filtering.
pub struct TopPSampler {
    p: f32,
}

impl TopPSampler {
    pub fn new(p: f32) -> Self {
        Self { p }
    }
}

impl Sampler for TopPSampler {
    fn name(&self) -> &str {
        "top_p"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        if logits.is_empty() || self.p >= 1.0 {
            return;
        }

        logits.sort_by(by_logit_desc);

        let max = logits[0].logit;
        let weights: Vec<f32> = logits.iter().map(|t| (t.logit - max).exp()).collect();
        let total: f32 = weights.iter().sum();

        let mut mass = 0.0f32;
        let keep = weights
            .iter()
            .position(|w| {
                mass += w / total;
                mass > self.p
            })
            .map_or(logits.len(), |i| i + 1);

        logits.truncate(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_probs(probs: &[f32]) -> Vec<TokenLogit> {
        probs
            .iter()
            .enumerate()
            .map(|(i, &p)| TokenLogit { token_id: i as u32, logit: p.ln() })
            .collect()
    }

    #[test]
    fn test_keeps_smallest_prefix() {
        let mut logits = from_probs(&[0.1, 0.5, 0.3, 0.1]);
        TopPSampler::new(0.7).apply(&mut logits);
        let ids: Vec<u32> = logits.iter().map(|t| t.token_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_one_disables() {
        let mut logits = from_probs(&[0.1, 0.5, 0.3, 0.1]);
        TopPSampler::new(1.0).apply(&mut logits);
        assert_eq!(logits.len(), 4);
        assert_eq!(logits[0].token_id, 0);
    }

    #[test]
    fn test_zero_keeps_one() {
        let mut logits = from_probs(&[0.2, 0.8]);
        TopPSampler::new(0.0).apply(&mut logits);
        assert_eq!(logits.len(), 1);
        assert_eq!(logits[0].token_id, 1);
    }

    #[test]
    fn test_mass_equal_to_p_keeps_next() {
        let mut logits = vec![
            TokenLogit { token_id: 0, logit: 0.0 },
            TokenLogit { token_id: 1, logit: 0.0 },
        ];
        TopPSampler::new(0.5).apply(&mut logits);
        let ids: Vec<u32> = logits.iter().map(|t| t.token_id).collect();
        assert_eq!(ids, vec![0, 1]);
    }
}
