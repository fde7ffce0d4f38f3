//! Budget packing: the longest prefix of a ranking that fits a token budget.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use tracing::debug;

use crate::fanout::map_all;
use crate::paper::Passage;
use crate::tokens::TokenCounter;

// =============================================================================
// Constants
// =============================================================================

/// Context size of the answering model.
pub const TOKEN_LIMIT: usize = 2048;
/// Tokens reserved for the QA prompt around the context.
pub const TOKEN_QA_EXISTING: usize = 250;
pub const DEFAULT_BUDGET: usize = TOKEN_LIMIT - TOKEN_QA_EXISTING;

/// Separator between packed passages.
pub const PASSAGE_SEPARATOR: &str = "\n\n";

// =============================================================================
// Cutoff
// =============================================================================

/// What to do when the whole ranking fits the budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CutoffPolicy {
    /// "First index whose running total exceeds the budget", searched as an
    /// argmax over all-false, which lands on 0: a ranking that fits entirely
    /// packs to nothing. Kept for reproducing old runs.
    Faithful,
    /// Same cutoff, except a ranking that fits entirely is kept whole.
    #[default]
    Corrected,
}

impl FromStr for CutoffPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "faithful" => Ok(Self::Faithful),
            "corrected" => Ok(Self::Corrected),
            other => Err(format!("unknown cutoff `{other}` (corrected|faithful)")),
        }
    }
}

impl fmt::Display for CutoffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Faithful => "faithful",
            Self::Corrected => "corrected",
        })
    }
}

/// Number of leading items to keep: the position of the first running total
/// above `budget`.
pub fn cutoff_index(costs: &[usize], budget: usize, policy: CutoffPolicy) -> usize {
    let mut total = 0usize;
    for (i, cost) in costs.iter().enumerate() {
        total = total.saturating_add(*cost);
        if total > budget {
            return i;
        }
    }
    match policy {
        CutoffPolicy::Faithful => 0,
        CutoffPolicy::Corrected => costs.len(),
    }
}

// =============================================================================
// Packing
// =============================================================================

/// Passages chosen for the answer context, in rank order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextWindow {
    pub passages: Vec<Passage>,
    /// Cost of each kept passage.
    pub costs: Vec<usize>,
    pub budget: usize,
}

impl ContextWindow {
    pub fn total_cost(&self) -> usize {
        self.costs.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// Passages joined by blank lines.
    pub fn render(&self) -> String {
        self.passages
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(PASSAGE_SEPARATOR)
    }
}

/// Keep the prefix of `ranked` that fits `budget`.
///
/// Every passage is costed once, concurrently, before the cutoff is taken.
/// An empty ranking, or one whose first passage alone is over budget, packs
/// to an empty window.
pub async fn pack<C>(
    ranked: Vec<Passage>,
    budget: usize,
    counter: &C,
    policy: CutoffPolicy,
    concurrency: Option<usize>,
) -> ContextWindow
where
    C: TokenCounter + ?Sized,
{
    let passages = &ranked;
    let mut costs = map_all(0..ranked.len(), concurrency, move |i| async move {
        counter.count_tokens(&passages[i].text).await
    })
    .await;

    let keep = cutoff_index(&costs, budget, policy);
    debug!(
        candidates = ranked.len(),
        kept = keep,
        budget,
        policy = %policy,
        "packed context"
    );

    let mut passages = ranked;
    passages.truncate(keep);
    costs.truncate(keep);
    ContextWindow {
        passages,
        costs,
        budget,
    }
}
