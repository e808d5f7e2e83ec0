//! Local token selection for evaluation streams.
//!
//! A `SamplerChain` turns one step's next-token distribution into a single
//! token id: optional repetition penalties, then either greedy selection or
//! temperature, top-k, top-p and a seeded weighted draw.

pub mod greedy;
pub mod repetition;
pub mod sampler;
pub mod temperature;
pub mod top_k;
pub mod top_p;

pub use greedy::{DistSampler, GreedySampler};
pub use repetition::RepetitionPenaltySampler;
pub use sampler::{Sampler, SamplerChain, TokenLogit};
pub use temperature::TemperatureSampler;
pub use top_k::TopKSampler;
pub use top_p::TopPSampler;
