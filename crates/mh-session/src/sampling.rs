use mh_sampler::{
    DistSampler, GreedySampler, RepetitionPenaltySampler, SamplerChain, TemperatureSampler,
    TopKSampler, TopPSampler,
};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DEFAULT_TEMPERATURE: f32 = 0.0;
pub const DEFAULT_TOP_K: u32 = 40;
pub const DEFAULT_TOP_P: f32 = 0.95;
pub const DEFAULT_REPEAT_PENALTY: f32 = 1.0;
pub const DEFAULT_REPEAT_LAST_N: u32 = 64;

/// Effective sampling parameters for one generation step.
///
/// - `temperature == 0` selects the most likely token deterministically.
/// - `top_k == 0` considers the full vocabulary.
/// - `top_p == 1` disables nucleus filtering.
/// - `repeat_penalty == 1`, `frequency_penalty == 0` and `presence_penalty == 0`
///   disable the respective repetition penalties.
///
/// `top_k`/`top_p` only matter when `temperature > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub repeat_penalty: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub repeat_last_n: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
            top_p: DEFAULT_TOP_P,
            repeat_penalty: DEFAULT_REPEAT_PENALTY,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            repeat_last_n: DEFAULT_REPEAT_LAST_N,
        }
    }
}

/// Optional per-call replacements for `SamplingParams` fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamplingOverrides {
    pub temperature: Option<f32>,
    pub top_k: Option<u32>,
    pub top_p: Option<f32>,
    pub repeat_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    pub repeat_last_n: Option<u32>,
}

impl SamplingParams {
    /// Replace every field the overrides set.
    pub fn overridden(self, overrides: &SamplingOverrides) -> Self {
        Self {
            temperature: overrides.temperature.unwrap_or(self.temperature),
            top_k: overrides.top_k.unwrap_or(self.top_k),
            top_p: overrides.top_p.unwrap_or(self.top_p),
            repeat_penalty: overrides.repeat_penalty.unwrap_or(self.repeat_penalty),
            frequency_penalty: overrides.frequency_penalty.unwrap_or(self.frequency_penalty),
            presence_penalty: overrides.presence_penalty.unwrap_or(self.presence_penalty),
            repeat_last_n: overrides.repeat_last_n.unwrap_or(self.repeat_last_n),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(ValidationError::Negative {
                name: "temperature",
                value: self.temperature,
            });
        }
        if self.temperature > 0.0 && !self.temperature.recip().is_finite() {
            return Err(ValidationError::TemperatureTooSmall(self.temperature));
        }
        for (name, value) in [
            ("frequencyPenalty", self.frequency_penalty),
            ("presencePenalty", self.presence_penalty),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NotFinite { name, value });
            }
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ValidationError::OutOfRange {
                name: "topP",
                min: 0.0,
                max: 1.0,
                value: self.top_p,
            });
        }
        if !self.repeat_penalty.is_finite() || self.repeat_penalty <= 0.0 {
            return Err(ValidationError::Zero("repeatPenalty"));
        }
        Ok(())
    }

    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }

    pub fn penalizes_repetition(&self) -> bool {
        self.repeat_last_n > 0
            && (self.repeat_penalty != 1.0
                || self.frequency_penalty != 0.0
                || self.presence_penalty != 0.0)
    }

    /// Build the sampler pipeline for these parameters.
    ///
    /// Order: repetition penalties, then either greedy selection or
    /// temperature, top-K, top-P and a weighted draw. `seed` values below zero
    /// (or `None`) seed the draw from entropy. `penalty_tokens` seeds the
    /// repetition window, oldest first.
    pub fn sampler_chain(&self, seed: Option<i64>, penalty_tokens: &[u32]) -> SamplerChain {
        let mut chain = SamplerChain::new();

        if self.penalizes_repetition() {
            chain = chain.add(Box::new(
                RepetitionPenaltySampler::new(self.repeat_penalty, self.repeat_last_n as usize)
                    .with_frequency(self.frequency_penalty)
                    .with_presence(self.presence_penalty)
                    .with_history(penalty_tokens),
            ));
        }

        if self.is_greedy() {
            return chain.add(Box::new(GreedySampler::new()));
        }

        let dist = match seed {
            Some(seed) if seed >= 0 => DistSampler::new(seed as u64),
            _ => DistSampler::from_entropy(),
        };

        chain
            .add(Box::new(TemperatureSampler::new(self.temperature)))
            .add(Box::new(TopKSampler::new(self.top_k as usize)))
            .add(Box::new(TopPSampler::new(self.top_p)))
            .add(Box::new(dist))
    }
}
