//! Pairwise comparators.
//!
//! Both variants ask the same question ("which of paragraphs A and B better
//! answers ...") and differ only in how the answer is read back.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::oracle::{CompletionRequest, Oracle, OracleError};
use crate::paper::Passage;
use crate::prompts::{comparison_prompt, COMPARISON_LEFT, COMPARISON_RIGHT};

use super::{Comparator, Preference};

/// Read a one-token completion as a preference.
///
/// Exact match on the trimmed text. Anything else is logged and becomes
/// [`Preference::Indeterminate`].
pub fn parse_preference(raw: &str) -> Preference {
    match raw.trim() {
        COMPARISON_LEFT => Preference::Left,
        COMPARISON_RIGHT => Preference::Right,
        other => {
            warn!(response = %other, "unrecognized comparison judgment; treating as indeterminate");
            Preference::Indeterminate
        }
    }
}

/// Single-token completion stopped at the first newline.
pub struct CompletionComparator {
    oracle: Arc<dyn Oracle>,
}

impl CompletionComparator {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Comparator for CompletionComparator {
    async fn compare(
        &self,
        left: &Passage,
        right: &Passage,
        question: &str,
    ) -> Result<Preference, OracleError> {
        let req = CompletionRequest::new(comparison_prompt(left, right, question))
            .stop(["\n"])
            .max_tokens(1);
        let raw = self.oracle.complete(req).await?;
        Ok(parse_preference(&raw))
    }
}

/// Classification over the two labels. Left wins only with strictly more
/// probability mass, so a tie goes right.
pub struct ClassificationComparator {
    oracle: Arc<dyn Oracle>,
    choices: [String; 2],
}

impl ClassificationComparator {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            choices: [
                format!(" {COMPARISON_LEFT}"),
                format!(" {COMPARISON_RIGHT}"),
            ],
        }
    }
}

#[async_trait]
impl Comparator for ClassificationComparator {
    async fn compare(
        &self,
        left: &Passage,
        right: &Passage,
        question: &str,
    ) -> Result<Preference, OracleError> {
        let prompt = comparison_prompt(left, right, question);
        let dist = self.oracle.classify(&prompt, &self.choices).await?;
        let [a, b] = &self.choices;
        if dist.prob(a) > dist.prob(b) {
            Ok(Preference::Left)
        } else {
            Ok(Preference::Right)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{Classification, OracleCall, ScriptedOracle};

    fn pair() -> (Passage, Passage) {
        (
            Passage::new("results", "Mortality fell by 12%."),
            Passage::new("methods", "We enrolled 120 adults."),
        )
    }

    #[test]
    fn parses_exact_letters_only() {
        assert_eq!(parse_preference(" A"), Preference::Left);
        assert_eq!(parse_preference("B\n"), Preference::Right);
        assert_eq!(parse_preference("a"), Preference::Indeterminate);
        assert_eq!(parse_preference("C"), Preference::Indeterminate);
        assert_eq!(parse_preference(""), Preference::Indeterminate);
    }

    #[tokio::test]
    async fn classification_tie_favors_right() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .on_classify(|_, _| Ok(Classification::from_pairs([(" A", 0.5), (" B", 0.5)]))),
        );
        let comparator = ClassificationComparator::new(oracle);
        let (a, b) = pair();
        assert_eq!(
            comparator.compare(&a, &b, "q").await.unwrap(),
            Preference::Right
        );
    }

    #[tokio::test]
    async fn classification_strictly_greater_favors_left() {
        let oracle = Arc::new(
            ScriptedOracle::new()
                .on_classify(|_, _| Ok(Classification::from_pairs([(" A", 0.51), (" B", 0.49)]))),
        );
        let comparator = ClassificationComparator::new(oracle);
        let (a, b) = pair();
        assert_eq!(
            comparator.compare(&a, &b, "q").await.unwrap(),
            Preference::Left
        );
    }

    #[tokio::test]
    async fn completion_comparator_asks_for_one_token() {
        let oracle = Arc::new(ScriptedOracle::new().on_complete(|_| Ok(" B".into())));
        let comparator = CompletionComparator::new(oracle.clone());
        let (a, b) = pair();
        let pref = comparator
            .compare(&a, &b, "What happened to mortality?")
            .await
            .unwrap();
        assert_eq!(pref, Preference::Right);

        match &oracle.calls()[0] {
            OracleCall::Complete(req) => {
                assert_eq!(req.stop, vec!["\n".to_string()]);
                assert_eq!(req.max_tokens, Some(1));
                assert!(req.prompt.contains("Paragraph A: Mortality fell by 12%."));
                assert!(req.prompt.contains("Paragraph B: We enrolled 120 adults."));
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_completion_is_indeterminate_not_an_error() {
        let oracle = Arc::new(ScriptedOracle::new().on_complete(|_| Ok(" Neither".into())));
        let comparator = CompletionComparator::new(oracle);
        let (a, b) = pair();
        assert_eq!(
            comparator.compare(&a, &b, "q").await.unwrap(),
            Preference::Indeterminate
        );
    }
}
