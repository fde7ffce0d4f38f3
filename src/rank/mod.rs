//! Passage ranking from oracle judgments.
//!
//! Two modes behind [`PassageRanker`]:
//! - Pairwise: quicksort-shaped partitioning driven only by "which of these two
//!   is more relevant" judgments ([`PairwiseRanker`])
//! - Pointwise: one independent relevance probability per passage, sorted
//!   descending ([`PointwiseRanker`])
//!
//! Judgments may be intransitive. Nothing here detects or repairs cycles; the
//! output is whatever the partitioning produces.

pub mod compare;
pub mod pairwise;
pub mod pointwise;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::oracle::{Oracle, OracleError};
use crate::paper::Passage;

pub use compare::{parse_preference, ClassificationComparator, CompletionComparator};
pub use pairwise::PairwiseRanker;
pub use pointwise::{PointwiseRanker, RelevanceScorer};

/// Outcome of one pairwise judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preference {
    /// The left item answers the question better.
    Left,
    Right,
    /// The oracle said something we could not read.
    Indeterminate,
}

impl Preference {
    /// Only an explicit left preference counts; ties and indeterminate
    /// judgments fall to the right.
    pub fn favors_left(self) -> bool {
        matches!(self, Preference::Left)
    }
}

/// `compare(a, b, question)`: is `a` more relevant than `b`?
#[async_trait]
pub trait Comparator: Send + Sync {
    async fn compare(
        &self,
        left: &Passage,
        right: &Passage,
        question: &str,
    ) -> Result<Preference, OracleError>;
}

/// Orders passages by relevance to a question. The result is always a
/// permutation of the input.
#[async_trait]
pub trait PassageRanker: Send + Sync {
    async fn rank(
        &self,
        passages: Vec<Passage>,
        question: &str,
    ) -> Result<Vec<Passage>, OracleError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankMode {
    #[default]
    Pairwise,
    Pointwise,
}

/// How a pairwise judgment is asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ComparatorKind {
    /// One-token completion parsed as "A" or "B".
    #[default]
    Completion,
    /// Classification over " A" / " B", strict `>` on the probabilities.
    Classification,
}

impl FromStr for RankMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pairwise" => Ok(Self::Pairwise),
            "pointwise" => Ok(Self::Pointwise),
            other => Err(format!("unknown rank mode `{other}` (pairwise|pointwise)")),
        }
    }
}

impl fmt::Display for RankMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pairwise => "pairwise",
            Self::Pointwise => "pointwise",
        })
    }
}

impl FromStr for ComparatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "completion" => Ok(Self::Completion),
            "classification" | "classify" => Ok(Self::Classification),
            other => Err(format!(
                "unknown comparator `{other}` (completion|classification)"
            )),
        }
    }
}

impl fmt::Display for ComparatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Completion => "completion",
            Self::Classification => "classification",
        })
    }
}

/// Build the ranker for `mode`. `concurrency` bounds each fan-out batch.
pub fn ranker_for(
    mode: RankMode,
    comparator: ComparatorKind,
    oracle: Arc<dyn Oracle>,
    concurrency: Option<usize>,
) -> Box<dyn PassageRanker> {
    match mode {
        RankMode::Pairwise => {
            let comparator: Arc<dyn Comparator> = match comparator {
                ComparatorKind::Completion => Arc::new(CompletionComparator::new(oracle)),
                ComparatorKind::Classification => {
                    Arc::new(ClassificationComparator::new(oracle))
                }
            };
            Box::new(PairwiseRanker::new(comparator).with_concurrency(concurrency))
        }
        RankMode::Pointwise => Box::new(
            PointwiseRanker::new(RelevanceScorer::new(oracle)).with_concurrency(concurrency),
        ),
    }
}
