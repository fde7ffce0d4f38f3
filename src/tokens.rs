//! Token counting, the cost measure for context packing.
//!
//! Any `Fn(&str) -> usize` is a counter, which keeps test costs explicit.

use std::sync::Arc;

use async_trait::async_trait;
use tiktoken_rs::CoreBPE;

#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("failed to load {encoding} tokenizer: {message}")]
    Load {
        encoding: &'static str,
        message: String,
    },
}

/// Deterministic text-to-cost function.
#[async_trait]
pub trait TokenCounter: Send + Sync {
    async fn count_tokens(&self, text: &str) -> usize;
}

#[async_trait]
impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    async fn count_tokens(&self, text: &str) -> usize {
        self(text)
    }
}

/// Byte-pair-encoding counter backed by `tiktoken-rs`.
#[derive(Clone)]
pub struct BpeTokenCounter {
    encoding: &'static str,
    bpe: Arc<CoreBPE>,
}

impl BpeTokenCounter {
    /// GPT-2 encoding (`r50k_base`).
    pub fn gpt2() -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::r50k_base().map_err(|e| TokenizerError::Load {
            encoding: "r50k_base",
            message: e.to_string(),
        })?;
        Ok(Self {
            encoding: "r50k_base",
            bpe: Arc::new(bpe),
        })
    }

    pub fn cl100k() -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| TokenizerError::Load {
            encoding: "cl100k_base",
            message: e.to_string(),
        })?;
        Ok(Self {
            encoding: "cl100k_base",
            bpe: Arc::new(bpe),
        })
    }

    pub fn encoding(&self) -> &'static str {
        self.encoding
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

#[async_trait]
impl TokenCounter for BpeTokenCounter {
    async fn count_tokens(&self, text: &str) -> usize {
        self.count(text)
    }
}
