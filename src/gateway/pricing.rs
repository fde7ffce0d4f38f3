//! Chat model prices used for `--usage` cost estimates.
//!
//! Costs are in nanodollars (1e-9 USD) per token.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_nanos_per_token: i64,
    pub output_nanos_per_token: i64,
}

impl ModelPricing {
    const fn new(input: i64, output: i64) -> Self {
        Self {
            input_nanos_per_token: input,
            output_nanos_per_token: output,
        }
    }

    pub fn calculate_cost(&self, input_tokens: u32, output_tokens: u32) -> i64 {
        (input_tokens as i64) * self.input_nanos_per_token
            + (output_tokens as i64) * self.output_nanos_per_token
    }
}

/// Charged for models missing from the table.
const UNKNOWN_MODEL: ModelPricing = ModelPricing::new(1_000, 5_000);

/// OpenRouter list prices for models that return logprobs.
pub fn pricing_for(model_id: &str) -> ModelPricing {
    match model_id {
        // $0.15/1M input, $0.60/1M output
        "openai/gpt-4o-mini" => ModelPricing::new(150, 600),
        // $2.50/1M input, $10.00/1M output
        "openai/gpt-4o" => ModelPricing::new(2_500, 10_000),
        _ => UNKNOWN_MODEL,
    }
}

pub fn chat_cost(model_id: &str, input_tokens: u32, output_tokens: u32) -> i64 {
    pricing_for(model_id).calculate_cost(input_tokens, output_tokens)
}
