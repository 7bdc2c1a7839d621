//! Token usage accounting.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// Accumulated LLM usage for a call, a request, or a process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Number of completions that returned (successful or not at validation)
    pub llm_calls: u32,

    pub prompt_tokens: u32,

    pub completion_tokens: u32,

    pub total_tokens: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add token usage from one provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.llm_calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.estimated_cost += estimate_cost(usage, model);
    }

    /// Fold another usage total into this one.
    pub fn merge(&mut self, other: &LlmUsage) {
        self.llm_calls += other.llm_calls;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.estimated_cost += other.estimated_cost;
    }

    pub fn merged<'a>(parts: impl IntoIterator<Item = &'a LlmUsage>) -> LlmUsage {
        let mut total = LlmUsage::default();
        for part in parts {
            total.merge(part);
        }
        total
    }
}

/// Cost estimate for one response.
fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
    // USD per million tokens
    let (input_rate, output_rate) = match model {
        m if m.contains("gpt-4o-mini") => (0.15, 0.6),
        m if m.contains("gpt-4o") => (2.5, 10.0),
        m if m.contains("gpt-3.5") => (0.5, 1.5),
        m if m.contains("gpt-4-turbo") || m.contains("gpt-4-1106") || m.contains("gpt-4-0125") => {
            (10.0, 30.0)
        }
        m if m.contains("gpt-4") => (30.0, 60.0),
        _ => (10.0, 30.0),
    };

    let input_cost = (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate;
    let output_cost = (usage.completion_tokens as f64 / 1_000_000.0) * output_rate;
    input_cost + output_cost
}

/// Process-lifetime usage total, shared by every clone of a client.
#[derive(Debug, Default)]
pub struct UsageMeter {
    usage: RwLock<LlmUsage>,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: &TokenUsage, model: &str) {
        self.usage.write().add(usage, model);
    }

    pub fn snapshot(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    pub fn reset(&self) {
        *self.usage.write() = LlmUsage::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(prompt: u32, completion: u32) -> TokenUsage {
        TokenUsage {
            prompt_tokens: prompt,
            completion_tokens: completion,
        }
    }

    #[test]
    fn test_add_counts_calls_and_tokens() {
        let mut usage = LlmUsage::default();
        usage.add(&tokens(1_000_000, 0), "gpt-4-turbo-preview");
        usage.add(&tokens(0, 1_000_000), "gpt-4-turbo-preview");

        assert_eq!(usage.llm_calls, 2);
        assert_eq!(usage.total_tokens, 2_000_000);
        assert!((usage.estimated_cost - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_model_pricing() {
        let mini = estimate_cost(&tokens(1_000_000, 1_000_000), "gpt-4o-mini");
        let full = estimate_cost(&tokens(1_000_000, 1_000_000), "gpt-4o");
        assert!((mini - 0.75).abs() < 1e-9);
        assert!((full - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_merge() {
        let mut a = LlmUsage::default();
        a.add(&tokens(10, 5), "gpt-4o");
        let mut b = LlmUsage::default();
        b.add(&tokens(20, 10), "gpt-4o");

        let total = LlmUsage::merged([&a, &b]);
        assert_eq!(total.llm_calls, 2);
        assert_eq!(total.prompt_tokens, 30);
        assert_eq!(total.completion_tokens, 15);
    }

    #[test]
    fn test_meter_snapshot_and_reset() {
        let meter = UsageMeter::new();
        meter.record(&tokens(3, 4), "gpt-4o");
        meter.record(&tokens(3, 4), "gpt-4o");
        assert_eq!(meter.snapshot().total_tokens, 14);

        meter.reset();
        assert_eq!(meter.snapshot(), LlmUsage::default());
    }
}
