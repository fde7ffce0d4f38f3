use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use oracle_recipes::fanout::map_async;
use oracle_recipes::oracle::OracleError;
use oracle_recipes::paper::Passage;
use oracle_recipes::rank::{Comparator, PairwiseRanker, PassageRanker, Preference};

/// Arbitrary (possibly intransitive) judgments with random latency.
struct CoinFlip {
    rng: Mutex<StdRng>,
}

#[async_trait]
impl Comparator for CoinFlip {
    async fn compare(
        &self,
        _left: &Passage,
        _right: &Passage,
        _question: &str,
    ) -> Result<Preference, OracleError> {
        let (pref, delay) = {
            let mut rng = self.rng.lock().unwrap();
            let pref = match rng.gen_range(0..3) {
                0 => Preference::Left,
                1 => Preference::Right,
                _ => Preference::Indeterminate,
            };
            (pref, rng.gen_range(0..3u64))
        };
        tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        Ok(pref)
    }
}

fn passages(n: usize) -> Vec<Passage> {
    // Duplicate texts on purpose: identity is positional.
    (0..n)
        .map(|i| Passage::new("body", format!("paragraph {}", i % 3)))
        .collect()
}

fn counts(items: &[Passage]) -> HashMap<&str, usize> {
    let mut m = HashMap::new();
    for p in items {
        *m.entry(p.text.as_str()).or_insert(0) += 1;
    }
    m
}

#[tokio::test]
async fn rank_is_a_permutation_under_arbitrary_judgments() {
    for seed in 0..20u64 {
        let ranker = PairwiseRanker::new(Arc::new(CoinFlip {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }))
        .with_concurrency(if seed % 2 == 0 { None } else { Some(3) });

        let n = (seed as usize % 9) + 2;
        let input = passages(n);

        let order = ranker.rank_indices(&input, "q").await.unwrap();
        let mut sorted = order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..n).collect::<Vec<_>>(), "seed {seed}");

        let ranked = ranker.rank(input.clone(), "q").await.unwrap();
        assert_eq!(ranked.len(), input.len());
        assert_eq!(counts(&ranked), counts(&input));
    }
}

#[tokio::test]
async fn rank_of_short_inputs_is_identity() {
    let ranker = PairwiseRanker::new(Arc::new(CoinFlip {
        rng: Mutex::new(StdRng::seed_from_u64(7)),
    }));
    assert!(ranker.rank(Vec::new(), "q").await.unwrap().is_empty());
    let single = vec![Passage::new("abstract", "only one")];
    assert_eq!(ranker.rank(single.clone(), "q").await.unwrap(), single);
}

#[tokio::test]
async fn mapper_keeps_tags_aligned_under_random_latency() {
    let mut rng = StdRng::seed_from_u64(42);
    let delays: Vec<u64> = (0..50).map(|_| rng.gen_range(0..10)).collect();
    let tagged: Vec<(usize, u64)> = delays.into_iter().enumerate().collect();

    for limit in [None, Some(1), Some(7)] {
        let out = map_async(tagged.clone(), limit, |(tag, delay)| async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            Ok::<_, OracleError>(tag)
        })
        .await
        .unwrap();
        assert_eq!(out, (0..50).collect::<Vec<_>>());
    }
}
