use crate::sampler::{Sampler, TokenLogit};

/// Divides every logit by the temperature.
///
/// Only built into a chain for temperatures above zero; a zero temperature
/// selects the greedy chain instead. Temperatures whose reciprocal is not a
/// positive finite number leave the logits untouched.
pub struct TemperatureSampler {
    inverse: f32,
}

impl TemperatureSampler {
    pub fn new(temperature: f32) -> Self {
        let inverse = match temperature.recip() {
            inv if temperature > 0.0 && inv.is_finite() && inv > 0.0 => inv,
            _ => 1.0,
        };
        Self { inverse }
    }
}

impl Sampler for TemperatureSampler {
    fn name(&self) -> &str {
        "temperature"
    }

    fn apply(&mut self, logits: &mut Vec<TokenLogit>) {
        if self.inverse == 1.0 {
            return;
        }
        logits.iter_mut().for_each(|t| t.logit *= self.inverse);
    }
}
