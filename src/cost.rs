//! Static per-model pricing. Rates are USD per 1K tokens.
//!
//! Lookup is an exact match on the model identifier; provider-prefixed
//! variants are listed as their own keys. Anything unlisted is priced at
//! [`DEFAULT_MODEL`]'s rates.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelRate {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelRate {
    const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self { input_per_1k, output_per_1k }
    }
}

pub const DEFAULT_MODEL: &str = "default";

const RATES: &[(&str, ModelRate)] = &[
    ("kimi-k2", ModelRate::new(0.0005, 0.0005)),
    ("kimi-k2-0905-preview", ModelRate::new(0.0005, 0.0005)),
    ("kimi-k2-turbo-preview", ModelRate::new(0.0012, 0.005)),
    ("kimi-k2-thinking", ModelRate::new(0.0006, 0.0025)),
    ("moonshot/kimi-k2", ModelRate::new(0.0005, 0.0005)),
    ("moonshotai/kimi-k2", ModelRate::new(0.0005, 0.0005)),
    ("moonshot-v1-8k", ModelRate::new(0.0002, 0.002)),
    ("moonshot-v1-32k", ModelRate::new(0.001, 0.003)),
    ("gpt-4o", ModelRate::new(0.0025, 0.01)),
    ("gpt-4o-mini", ModelRate::new(0.00015, 0.0006)),
    ("openai/gpt-4o", ModelRate::new(0.0025, 0.01)),
    ("claude-3-5-sonnet", ModelRate::new(0.003, 0.015)),
    ("claude-sonnet-4", ModelRate::new(0.003, 0.015)),
    ("anthropic/claude-sonnet-4", ModelRate::new(0.003, 0.015)),
    ("deepseek-chat", ModelRate::new(0.00027, 0.0011)),
    (DEFAULT_MODEL, ModelRate::new(0.001, 0.002)),
];

fn lookup(model: &str) -> Option<ModelRate> {
    RATES
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, rate)| *rate)
}

/// Rate used for `model`, falling back to the default entry.
pub fn rate_for(model: &str) -> ModelRate {
    lookup(model)
        .or_else(|| lookup(DEFAULT_MODEL))
        .unwrap_or(ModelRate::new(0.0, 0.0))
}

/// Cost in USD of one call. Not rounded.
pub fn cost(model: &str, input_tokens: u64, output_tokens: u64) -> f64 {
    let rate = rate_for(model);
    (input_tokens as f64 / 1000.0) * rate.input_per_1k
        + (output_tokens as f64 / 1000.0) * rate.output_per_1k
}

/// Every priced model, in table order.
pub fn rate_table() -> impl Iterator<Item = (&'static str, ModelRate)> {
    RATES.iter().copied()
}
