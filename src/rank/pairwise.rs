//! Comparison-only ranking by recursive partition.
//!
//! Pivot at `len / 2`. Every other item is compared against the pivot in one
//! fan-out batch; items judged more relevant go left, everything else
//! (including indeterminate judgments) goes right. Output is
//! `rank(left) ++ [pivot] ++ rank(right)`.
//!
//! Items are tracked by position, so textually identical passages stay
//! distinct. Recursion runs on an explicit work stack.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::fanout::map_async;
use crate::oracle::OracleError;
use crate::paper::Passage;

use super::{Comparator, PassageRanker};

enum Frame {
    Sort(Vec<usize>),
    Emit(usize),
}

pub struct PairwiseRanker {
    comparator: Arc<dyn Comparator>,
    concurrency: Option<usize>,
}

impl PairwiseRanker {
    pub fn new(comparator: Arc<dyn Comparator>) -> Self {
        Self {
            comparator,
            concurrency: None,
        }
    }

    /// Bound on in-flight comparisons per partition step. `None` compares
    /// everything against the pivot at once.
    pub fn with_concurrency(mut self, concurrency: Option<usize>) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Ranked order as positions into `passages`.
    pub async fn rank_indices(
        &self,
        passages: &[Passage],
        question: &str,
    ) -> Result<Vec<usize>, OracleError> {
        let comparator: &dyn Comparator = self.comparator.as_ref();
        let mut order = Vec::with_capacity(passages.len());
        let mut stack = vec![Frame::Sort((0..passages.len()).collect())];

        while let Some(frame) = stack.pop() {
            let mut ids = match frame {
                Frame::Emit(id) => {
                    order.push(id);
                    continue;
                }
                Frame::Sort(ids) if ids.len() <= 1 => {
                    order.extend(ids);
                    continue;
                }
                Frame::Sort(ids) => ids,
            };

            let pivot = ids.remove(ids.len() / 2);
            let pivot_passage = &passages[pivot];
            let prefs = map_async(ids.iter().copied(), self.concurrency, move |id| {
                comparator.compare(&passages[id], pivot_passage, question)
            })
            .await?;

            let (left, right): (Vec<(usize, _)>, Vec<(usize, _)>) = ids
                .into_iter()
                .zip(prefs)
                .partition(|(_, pref)| pref.favors_left());
            debug!(
                pivot,
                left = left.len(),
                right = right.len(),
                "partitioned around pivot"
            );

            // Popped in reverse: left subtree, then pivot, then right subtree.
            stack.push(Frame::Sort(right.into_iter().map(|(id, _)| id).collect()));
            stack.push(Frame::Emit(pivot));
            stack.push(Frame::Sort(left.into_iter().map(|(id, _)| id).collect()));
        }

        Ok(order)
    }
}

#[async_trait]
impl PassageRanker for PairwiseRanker {
    async fn rank(
        &self,
        passages: Vec<Passage>,
        question: &str,
    ) -> Result<Vec<Passage>, OracleError> {
        if passages.len() <= 1 {
            return Ok(passages);
        }
        let order = self.rank_indices(&passages, question).await?;
        let mut slots: Vec<Option<Passage>> = passages.into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|id| slots[id].take())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::Preference;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Prefers the passage whose text parses to the larger number.
    struct ByNumber {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Comparator for ByNumber {
        async fn compare(
            &self,
            left: &Passage,
            right: &Passage,
            _question: &str,
        ) -> Result<Preference, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            let l: i64 = left.text.parse().unwrap_or(i64::MIN);
            let r: i64 = right.text.parse().unwrap_or(i64::MIN);
            Ok(if l > r {
                Preference::Left
            } else if l < r {
                Preference::Right
            } else {
                Preference::Indeterminate
            })
        }
    }

    fn numbered(values: &[i64]) -> Vec<Passage> {
        values
            .iter()
            .map(|v| Passage::new("body", v.to_string()))
            .collect()
    }

    fn ranker() -> (Arc<ByNumber>, PairwiseRanker) {
        let cmp = Arc::new(ByNumber {
            calls: AtomicUsize::new(0),
        });
        (cmp.clone(), PairwiseRanker::new(cmp))
    }

    #[tokio::test]
    async fn consistent_judgments_sort_descending() {
        let (_, ranker) = ranker();
        let out = ranker
            .rank(numbered(&[3, 9, 1, 7, 5, 8, 2]), "q")
            .await
            .unwrap();
        let texts: Vec<&str> = out.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["9", "8", "7", "5", "3", "2", "1"]);
    }

    #[tokio::test]
    async fn short_inputs_skip_the_oracle() {
        let (cmp, ranker) = ranker();
        assert!(ranker.rank(Vec::new(), "q").await.unwrap().is_empty());
        let one = numbered(&[4]);
        assert_eq!(ranker.rank(one.clone(), "q").await.unwrap(), one);
        assert_eq!(cmp.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pivot_is_the_middle_item() {
        // [1, 2, 3]: pivot is "2". One batch of two comparisons, then the
        // singleton partitions need none.
        let (cmp, ranker) = ranker();
        let order = ranker.rank_indices(&numbered(&[1, 2, 3]), "q").await.unwrap();
        assert_eq!(order, vec![2, 1, 0]);
        assert_eq!(cmp.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn identical_text_stays_distinct() {
        let (_, ranker) = ranker();
        let order = ranker
            .rank_indices(&numbered(&[5, 5, 5, 5]), "q")
            .await
            .unwrap();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![0, 1, 2, 3]);
        // Everything ties, so everything lands right of each pivot.
        assert_eq!(order, vec![2, 1, 3, 0]);
    }

    #[tokio::test]
    async fn comparator_failure_aborts_ranking() {
        struct Broken;

        #[async_trait]
        impl Comparator for Broken {
            async fn compare(
                &self,
                _: &Passage,
                _: &Passage,
                _: &str,
            ) -> Result<Preference, OracleError> {
                Err(OracleError::InvalidRequest("boom".into()))
            }
        }

        let ranker = PairwiseRanker::new(Arc::new(Broken));
        assert!(ranker.rank(numbered(&[1, 2]), "q").await.is_err());
    }
}
