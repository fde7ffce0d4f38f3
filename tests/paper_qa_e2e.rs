use std::sync::Arc;

use oracle_recipes::oracle::{Classification, OracleCall, ScriptedOracle};
use oracle_recipes::pack::CutoffPolicy;
use oracle_recipes::paper::Paper;
use oracle_recipes::paper_qa::{PaperQa, PaperQaConfig};
use oracle_recipes::rank::{ComparatorKind, RankMode};
use oracle_recipes::tokens::{BpeTokenCounter, TokenCounter};
use tempfile::tempdir;

const PAPER: &str = "# Aspirin after surgery\n\n\
## Abstract\n\n\
We tested aspirin after hip surgery.\n\n\
## Methods\n\n\
We enrolled 412 adults aged 50 to 80.\n\n\
Patients were randomized one to one.\n\n\
## Results\n\n\
Clots fell from 9% to 4% with aspirin.\n";

/// Relevance: the results paragraph, then methods, then the rest.
fn relevance(text: &str) -> f64 {
    if text.contains("Clots fell") {
        0.9
    } else if text.contains("enrolled") {
        0.6
    } else {
        0.1
    }
}

fn paragraph(prompt: &str, label: &str, next: &str) -> String {
    prompt
        .split(label)
        .nth(1)
        .and_then(|rest| rest.split(next).next())
        .unwrap_or_default()
        .to_string()
}

fn classifying_oracle() -> Arc<ScriptedOracle> {
    Arc::new(
        ScriptedOracle::new()
            .on_classify(|prompt, choices| {
                if choices[0] == " A" {
                    let a = relevance(&paragraph(prompt, "Paragraph A:", "Paragraph B:"));
                    let b = relevance(&paragraph(prompt, "Paragraph B:", "Question:"));
                    Ok(Classification::from_pairs([(" A", a), (" B", b)]))
                } else {
                    let p = relevance(prompt.split("\n\n").nth(1).unwrap_or_default());
                    Ok(Classification::from_pairs([(" Yes", p), (" No", 1.0 - p)]))
                }
            })
            .on_complete(|req| {
                if req.prompt.contains("Clots fell") {
                    Ok(" Clots fell from 9% to 4%.".into())
                } else {
                    Ok(" Unknown.".into())
                }
            }),
    )
}

fn load_paper() -> Paper {
    let dir = tempdir().unwrap();
    let path = dir.path().join("paper.md");
    std::fs::write(&path, PAPER).unwrap();
    Paper::load(&path).unwrap()
}

#[tokio::test]
async fn pointwise_and_pairwise_agree_on_a_consistent_oracle() {
    let paper = load_paper();
    assert_eq!(paper.title.as_deref(), Some("Aspirin after surgery"));
    assert_eq!(paper.paragraphs.len(), 4);

    let counter: Arc<dyn TokenCounter> = Arc::new(BpeTokenCounter::gpt2().unwrap());
    let question = "How much did aspirin reduce clots?";

    let mut firsts = Vec::new();
    for (mode, comparator) in [
        (RankMode::Pointwise, ComparatorKind::Completion),
        (RankMode::Pairwise, ComparatorKind::Classification),
    ] {
        let oracle = classifying_oracle();
        let config = PaperQaConfig {
            mode,
            comparator,
            ..Default::default()
        };
        let qa = PaperQa::new(oracle.clone(), counter.clone(), config);
        let outcome = qa.answer(&paper, question).await.unwrap();

        assert_eq!(outcome.ranked[0].section_type, "results");
        assert_eq!(outcome.ranked[1].section_type, "methods");
        assert_eq!(outcome.context.passages.len(), 4);
        assert!(outcome.context.render().starts_with("Clots fell from 9% to 4% with aspirin.\n\nWe enrolled"));
        assert_eq!(outcome.answer, "Clots fell from 9% to 4%.");
        firsts.push(outcome.ranked[0].text.clone());

        let answer_prompts: Vec<String> = oracle
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                OracleCall::Complete(req) if req.prompt.starts_with("Background text") => {
                    Some(req.prompt)
                }
                _ => None,
            })
            .collect();
        assert_eq!(answer_prompts.len(), 1);
        assert!(answer_prompts[0].ends_with(&format!("Question: \"{question}\"\nAnswer: \"")));
    }
    assert_eq!(firsts[0], firsts[1]);
}

#[tokio::test]
async fn small_budget_keeps_only_the_top_passage() {
    let paper = load_paper();
    let counter: Arc<dyn TokenCounter> = Arc::new(|text: &str| text.split_whitespace().count());
    let config = PaperQaConfig {
        mode: RankMode::Pointwise,
        budget: 10,
        cutoff: CutoffPolicy::Faithful,
        ..Default::default()
    };
    let qa = PaperQa::new(classifying_oracle(), counter, config);
    let (_, window) = qa.select_context(&paper, "q").await.unwrap();
    // 8 words, then 8 more crosses 10.
    assert_eq!(window.passages.len(), 1);
    assert_eq!(window.costs, vec![8]);
}
