//! Question answering over a paper: rank passages, pack the best into a
//! bounded context, answer from that context.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::oracle::{CompletionRequest, Oracle, OracleError};
use crate::pack::{pack, ContextWindow, CutoffPolicy, DEFAULT_BUDGET};
use crate::paper::{Paper, Passage};
use crate::prompts::qa_prompt;
use crate::rank::{ranker_for, ComparatorKind, RankMode};
use crate::tokens::TokenCounter;

#[derive(Debug, thiserror::Error)]
pub enum PaperQaError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("invalid paper-qa configuration: {0}")]
    InvalidRequest(String),
}

/// Answers a question from an assembled context.
#[async_trait]
pub trait Answerer: Send + Sync {
    async fn answer(&self, context: &str, question: &str) -> Result<String, OracleError>;
}

/// Completes the QA prompt up to the closing quote.
pub struct OracleAnswerer {
    oracle: Arc<dyn Oracle>,
}

impl OracleAnswerer {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Answerer for OracleAnswerer {
    async fn answer(&self, context: &str, question: &str) -> Result<String, OracleError> {
        let req = CompletionRequest::new(qa_prompt(context, question)).stop(["\""]);
        let raw = self.oracle.complete(req).await?;
        Ok(raw.trim().to_string())
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PaperQaConfig {
    #[serde(serialize_with = "display")]
    pub mode: RankMode,
    #[serde(serialize_with = "display")]
    pub comparator: ComparatorKind,
    pub budget: usize,
    pub cutoff: CutoffPolicy,
    /// Bound on in-flight calls per fan-out batch. `None` is unbounded.
    pub concurrency: Option<usize>,
}

fn display<T: std::fmt::Display, S: serde::Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

impl Default for PaperQaConfig {
    fn default() -> Self {
        Self {
            mode: RankMode::default(),
            comparator: ComparatorKind::default(),
            budget: DEFAULT_BUDGET,
            cutoff: CutoffPolicy::default(),
            concurrency: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaperQaOutcome {
    pub question: String,
    pub ranked: Vec<Passage>,
    pub context: ContextWindow,
    pub answer: String,
}

pub struct PaperQa {
    oracle: Arc<dyn Oracle>,
    counter: Arc<dyn TokenCounter>,
    answerer: Arc<dyn Answerer>,
    config: PaperQaConfig,
}

impl PaperQa {
    /// Ranks and answers with the same oracle.
    pub fn new(
        oracle: Arc<dyn Oracle>,
        counter: Arc<dyn TokenCounter>,
        config: PaperQaConfig,
    ) -> Self {
        Self {
            answerer: Arc::new(OracleAnswerer::new(oracle.clone())),
            oracle,
            counter,
            config,
        }
    }

    pub fn with_answerer(mut self, answerer: Arc<dyn Answerer>) -> Self {
        self.answerer = answerer;
        self
    }

    pub fn config(&self) -> &PaperQaConfig {
        &self.config
    }

    /// Rank the paper's non-empty passages and pack them.
    pub async fn select_context(
        &self,
        paper: &Paper,
        question: &str,
    ) -> Result<(Vec<Passage>, ContextWindow), PaperQaError> {
        if self.config.concurrency == Some(0) {
            return Err(PaperQaError::InvalidRequest(
                "concurrency must be at least 1".into(),
            ));
        }

        let passages = paper.nonempty_passages();
        let ranker = ranker_for(
            self.config.mode,
            self.config.comparator,
            self.oracle.clone(),
            self.config.concurrency,
        );
        let ranked = ranker.rank(passages, question).await?;
        let window = pack(
            ranked.clone(),
            self.config.budget,
            self.counter.as_ref(),
            self.config.cutoff,
            self.config.concurrency,
        )
        .await;
        info!(
            mode = %self.config.mode,
            ranked = ranked.len(),
            packed = window.passages.len(),
            tokens = window.total_cost(),
            "context selected"
        );
        Ok((ranked, window))
    }

    pub async fn answer(&self, paper: &Paper, question: &str) -> Result<PaperQaOutcome, PaperQaError> {
        let (ranked, context) = self.select_context(paper, question).await?;
        let answer = self.answerer.answer(&context.render(), question).await?;
        Ok(PaperQaOutcome {
            question: question.to_string(),
            ranked,
            context,
            answer,
        })
    }
}
