//! Oracle backed by chat completions, with an optional response cache.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use crate::cache::{CachedResponse, ResponseCache, ResponseCacheKey};
use crate::gateway::{
    Attribution, ChatGateway, ChatModel, ChatRequest, ChatResponse, Message, TokenLogprob,
};

use super::{Classification, CompletionRequest, Oracle, OracleError};

/// Default model. Must expose token logprobs for `classify`.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Sampling temperature for agents whose samples should differ.
pub const STOCHASTIC_TEMPERATURE: f32 = 0.7;

const DEFAULT_TOP_LOGPROBS: u32 = 20;

#[derive(Debug, Clone)]
pub struct ChatOracleConfig {
    pub model: String,
    /// Used by `complete` and `answer`. `classify` always samples at 0.
    pub temperature: f32,
    pub classify_top_logprobs: u32,
    pub run_id: Option<Uuid>,
}

impl ChatOracleConfig {
    pub fn deterministic(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: 0.0,
            classify_top_logprobs: DEFAULT_TOP_LOGPROBS,
            run_id: None,
        }
    }

    pub fn stochastic(model: impl Into<String>) -> Self {
        Self {
            temperature: STOCHASTIC_TEMPERATURE,
            ..Self::deterministic(model)
        }
    }

    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

impl Default for ChatOracleConfig {
    fn default() -> Self {
        Self::deterministic(DEFAULT_MODEL)
    }
}

pub struct ChatOracle {
    gateway: Arc<dyn ChatGateway>,
    cache: Option<Arc<dyn ResponseCache>>,
    config: ChatOracleConfig,
}

impl ChatOracle {
    pub fn new(gateway: Arc<dyn ChatGateway>, config: ChatOracleConfig) -> Self {
        Self {
            gateway,
            cache: None,
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &ChatOracleConfig {
        &self.config
    }

    fn attribution(&self, caller: &'static str) -> Attribution {
        let attribution = Attribution::new(caller);
        match self.config.run_id {
            Some(run_id) => attribution.with_run(run_id),
            None => attribution,
        }
    }

    fn request(&self, prompt: &str, caller: &'static str) -> ChatRequest {
        ChatRequest::new(
            ChatModel::openrouter(&self.config.model),
            vec![Message::user(prompt)],
            self.attribution(caller),
        )
    }

    async fn cached(&self, key: &ResponseCacheKey) -> Option<CachedResponse> {
        let cache = self.cache.as_ref()?;
        match cache.get(key).await {
            Ok(hit) => hit,
            Err(err) => {
                warn!(error = %err, method = %key.method, "cache read failed; calling the provider");
                None
            }
        }
    }

    async fn store(&self, key: &ResponseCacheKey, payload: String, resp: &ChatResponse) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let entry = CachedResponse {
            payload,
            input_tokens: Some(resp.input_tokens),
            output_tokens: Some(resp.output_tokens),
            provider_cost_nanodollars: Some(resp.cost_nanodollars),
        };
        if let Err(err) = cache.put(key, &entry).await {
            warn!(error = %err, method = %key.method, "cache write failed");
        }
    }
}

#[async_trait]
impl Oracle for ChatOracle {
    async fn complete(&self, req: CompletionRequest) -> Result<String, OracleError> {
        let params = format!(
            "t={};stop={:?};max={:?}",
            self.config.temperature, req.stop, req.max_tokens
        );
        let key = ResponseCacheKey::new(
            "complete",
            &self.config.model,
            &params,
            &req.prompt,
            req.cache_key.as_deref(),
        );
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit.payload);
        }

        let mut chat = self
            .request(&req.prompt, "oracle::complete")
            .temperature(self.config.temperature)
            .stop(req.stop.iter().cloned());
        if let Some(max) = req.max_tokens {
            chat = chat.max_tokens(max);
        }

        let resp = self.gateway.chat(chat).await?;
        self.store(&key, resp.content.clone(), &resp).await;
        Ok(resp.content)
    }

    async fn classify(
        &self,
        prompt: &str,
        choices: &[String],
    ) -> Result<Classification, OracleError> {
        if choices.is_empty() {
            return Err(OracleError::InvalidRequest(
                "classify needs at least one choice".into(),
            ));
        }

        let params = format!(
            "top={};choices={:?}",
            self.config.classify_top_logprobs, choices
        );
        let key = ResponseCacheKey::new("classify", &self.config.model, &params, prompt, None);
        if let Some(hit) = self.cached(&key).await {
            match serde_json::from_str::<HashMap<String, f64>>(&hit.payload) {
                Ok(probabilities) => {
                    return Ok(Classification {
                        probabilities,
                        logprobs: None,
                    })
                }
                Err(err) => warn!(error = %err, "discarding unreadable cached classification"),
            }
        }

        let chat = self
            .request(prompt, "oracle::classify")
            .max_tokens(1)
            .with_logprobs(self.config.classify_top_logprobs);
        let resp = self.gateway.chat(chat).await?;

        let probabilities = resp
            .output_logprobs
            .as_deref()
            .and_then(|lps| distribution_from_logprobs(lps, choices))
            .unwrap_or_else(|| distribution_from_text(&resp.content, choices));

        if let Ok(payload) = serde_json::to_string(&probabilities) {
            self.store(&key, payload, &resp).await;
        }

        Ok(Classification {
            probabilities,
            logprobs: resp.output_logprobs,
        })
    }

    async fn answer(&self, prompt: &str) -> Result<String, OracleError> {
        let params = format!("t={}", self.config.temperature);
        let key = ResponseCacheKey::new("answer", &self.config.model, &params, prompt, None);
        if let Some(hit) = self.cached(&key).await {
            return Ok(hit.payload);
        }

        let chat = self
            .request(prompt, "oracle::answer")
            .temperature(self.config.temperature);
        let resp = self.gateway.chat(chat).await?;
        self.store(&key, resp.content.clone(), &resp).await;
        Ok(resp.content)
    }
}

/// Distribution over `choices` from the first generated position.
///
/// Sums `exp(logprob)` of every candidate token whose trimmed text equals a
/// trimmed choice, then normalizes over the matched mass. `None` when no
/// candidate token matches any choice.
pub fn distribution_from_logprobs(
    logprobs: &[TokenLogprob],
    choices: &[String],
) -> Option<HashMap<String, f64>> {
    let first = logprobs.first()?;

    let mut candidates: Vec<(&str, f64)> = first
        .top_alternatives
        .iter()
        .map(|alt| (alt.token.as_str(), alt.logprob))
        .collect();
    if !candidates.iter().any(|(token, _)| *token == first.token) {
        candidates.push((first.token.as_str(), first.logprob));
    }

    let mut mass: HashMap<String, f64> = HashMap::new();
    for (token, logprob) in candidates {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        for choice in choices.iter().filter(|c| c.trim() == token) {
            *mass.entry(choice.clone()).or_insert(0.0) += logprob.exp();
        }
    }

    let total: f64 = mass.values().sum();
    if total <= 0.0 {
        return None;
    }
    for p in mass.values_mut() {
        *p /= total;
    }
    Some(mass)
}

/// Fallback when no logprobs came back: all mass on the choice the model wrote.
fn distribution_from_text(content: &str, choices: &[String]) -> HashMap<String, f64> {
    let content = content.trim();
    choices
        .iter()
        .find(|c| !content.is_empty() && c.trim() == content)
        .map(|c| HashMap::from([(c.clone(), 1.0)]))
        .unwrap_or_default()
}
