//! Pointwise relevance: one classification per passage, sorted descending.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::fanout::map_async;
use crate::oracle::{Oracle, OracleError};
use crate::paper::Passage;
use crate::prompts::{relevance_prompt, RELEVANCE_NO, RELEVANCE_YES};

use super::PassageRanker;

/// `score(passage, question)`: probability mass on the affirmative label.
pub struct RelevanceScorer {
    oracle: Arc<dyn Oracle>,
    choices: [String; 2],
}

impl RelevanceScorer {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            choices: [RELEVANCE_YES.to_string(), RELEVANCE_NO.to_string()],
        }
    }

    pub async fn score(&self, passage: &Passage, question: &str) -> Result<f64, OracleError> {
        let prompt = relevance_prompt(passage, question);
        let dist = self.oracle.classify(&prompt, &self.choices).await?;
        Ok(dist.prob(RELEVANCE_YES))
    }
}

pub struct PointwiseRanker {
    scorer: RelevanceScorer,
    concurrency: Option<usize>,
}

impl PointwiseRanker {
    pub fn new(scorer: RelevanceScorer) -> Self {
        Self {
            scorer,
            concurrency: None,
        }
    }

    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Scores aligned with `passages`.
    pub async fn scores(
        &self,
        passages: &[Passage],
        question: &str,
    ) -> Result<Vec<f64>, OracleError> {
        let scorer = &self.scorer;
        map_async(0..passages.len(), self.concurrency, move |i| {
            scorer.score(&passages[i], question)
        })
        .await
    }
}

#[async_trait]
impl PassageRanker for PointwiseRanker {
    async fn rank(
        &self,
        passages: Vec<Passage>,
        question: &str,
    ) -> Result<Vec<Passage>, OracleError> {
        let scores = self.scores(&passages, question).await?;
        debug!(passages = passages.len(), "scored passages for relevance");

        // A non-finite score carries no signal; rank it like "no relevance".
        let mut ranked: Vec<(f64, Passage)> = scores
            .into_iter()
            .map(|s| if s.is_finite() { s } else { 0.0 })
            .zip(passages)
            .collect();
        // Stable: equal scores keep their original order.
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(ranked.into_iter().map(|(_, p)| p).collect())
    }
}
