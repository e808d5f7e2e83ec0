use crate::sampler::{by_logit_desc, Sampler, TokenLogit};

/// Restricts the candidates to the `k` highest logits.
///
/// `k == 0` disables filtering. Survivors are left sorted best-first; when
/// nothing is cut the order is untouched.
pub struct TopKSampler {
    k: usize,
}

impl TopKSampler {
    pub fn new(k: usize) -> Self {
        Self { k }
    }
}

impl Sampler for TopKSampler {
    fn name(&self) -> &str {
        "top_k"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        if self.k == 0 || self.k >= logits.len() {
            return;
        }

        logits.sort_by(by_logit_desc);
        logits.truncate(self.k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(values: &[f32]) -> Vec<TokenLogit> {
        values
            .iter()
            .enumerate()
            .map(|(i, &logit)| TokenLogit { token_id: i as u32, logit })
            .collect()
    }

    #[test]
    fn test_keeps_highest() {
        let mut logits = candidates(&[0.1, 0.9, 0.5, 0.7]);
        TopKSampler::new(2).apply(&mut logits);
        let ids: Vec<u32> = logits.iter().map(|t| t.token_id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_zero_disables() {
        let mut logits = candidates(&[0.1, 0.9, 0.5]);
        TopKSampler::new(0).apply(&mut logits);
        assert_eq!(logits, candidates(&[0.1, 0.9, 0.5]));
    }

    #[test]
    fn test_ties_prefer_lower_id() {
        let mut logits = candidates(&[0.5, 0.9, 0.9, 0.9]);
        TopKSampler::new(2).apply(&mut logits);
        let ids: Vec<u32> = logits.iter().map(|t| t.token_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
