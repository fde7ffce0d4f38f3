//! The judgment oracle: the only way recipes talk to a language model.
//!
//! Three capabilities, nothing else:
//! - `complete`: continue a prompt, optionally stopping early and optionally
//!   tagged with a cache key so repeated samples of one prompt stay distinct
//! - `classify`: a probability distribution over a fixed set of choices
//! - `answer`: free-text answer to a prompt
//!
//! Backends: [`ChatOracle`] (OpenRouter chat completions behind the response
//! cache) and [`ScriptedOracle`] (deterministic closures, for tests and dry runs).

pub mod chat;
pub mod scripted;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::gateway::{ProviderError, TokenLogprob};

pub use chat::{ChatOracle, ChatOracleConfig, DEFAULT_MODEL};
pub use scripted::{OracleCall, ScriptedOracle};

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// No response could be obtained from the provider. Fatal for the
    /// pipeline invocation that issued the call.
    #[error("oracle transport error: {0}")]
    Transport(#[from] ProviderError),
    #[error("invalid oracle request: {0}")]
    InvalidRequest(String),
    /// A scripted oracle was asked for a capability it was not given.
    #[error("no script for `{0}`")]
    Unscripted(&'static str),
}

/// Arguments of a `complete` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub stop: Vec<String>,
    pub max_tokens: Option<u32>,
    /// Distinguishes otherwise-identical calls in the response cache.
    pub cache_key: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn stop<I, S>(mut self, stop: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn cache_key(mut self, key: impl ToString) -> Self {
        self.cache_key = Some(key.to_string());
        self
    }
}

/// Result of a `classify` call.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// Probability per choice. Choices the oracle never produced are absent.
    pub probabilities: HashMap<String, f64>,
    /// First-position logprobs the distribution was derived from, when the
    /// backend had them.
    pub logprobs: Option<Vec<TokenLogprob>>,
}

impl Classification {
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        Self {
            probabilities: pairs.into_iter().map(|(c, p)| (c.into(), p)).collect(),
            logprobs: None,
        }
    }

    /// Probability mass on `choice`; 0.0 when absent.
    pub fn prob(&self, choice: &str) -> f64 {
        self.probabilities.get(choice).copied().unwrap_or(0.0)
    }
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<String, OracleError>;

    async fn classify(
        &self,
        prompt: &str,
        choices: &[String],
    ) -> Result<Classification, OracleError>;

    async fn answer(&self, prompt: &str) -> Result<String, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_choice_reads_as_zero() {
        let c = Classification::from_pairs([(" Yes", 0.8)]);
        assert!((c.prob(" Yes") - 0.8).abs() < 1e-12);
        assert_eq!(c.prob(" No"), 0.0);
    }

    #[test]
    fn completion_request_builder() {
        let req = CompletionRequest::new("p").stop(["\n"]).max_tokens(1).cache_key(2);
        assert_eq!(req.stop, vec!["\n".to_string()]);
        assert_eq!(req.max_tokens, Some(1));
        assert_eq!(req.cache_key.as_deref(), Some("2"));
    }
}
