//! Prompt templates for the debate and paper-QA recipes.
//!
//! Pure string rendering. Each template ends where the oracle's continuation
//! is expected to begin.

use crate::paper::Passage;

/// Choices for the pointwise relevance classifier.
pub const RELEVANCE_YES: &str = " Yes";
pub const RELEVANCE_NO: &str = " No";

/// Labels the pairwise comparator expects back.
pub const COMPARISON_LEFT: &str = "A";
pub const COMPARISON_RIGHT: &str = "B";

/// Prompt for one debate turn. `rendered_debate` is the transcript as seen by
/// `agent_name` (its own lines attributed to "You").
pub fn debate_turn_prompt(agent_name: &str, rendered_debate: &str, turns_left: u32) -> String {
    format!(
        "You are {agent_name}. There are {turns_left} turns left in the debate. \
You are trying to win the debate using reason and evidence. \
Don't repeat yourself. No more than 1-2 sentences per turn.\n\n\
{rendered_debate}\n\
You: \""
    )
}

/// Prompt asking for the victor. Ends inside the opening quote of the name,
/// so the first generated token is the name itself.
pub fn judge_prompt(rendered_debate: &str) -> String {
    format!(
        "You are judging the debate. You are trying to decide who won the debate \
using reason and evidence. Return the name of the victor, and explain why they won.\n\n\
*Debate*\n\
{rendered_debate}\n\n\
*Judgment*\n\
The name of the victor is: \""
    )
}

pub fn relevance_prompt(passage: &Passage, question: &str) -> String {
    format!(
        "The following paragraph was drawn from the {section} section of a paper. \
Answer whether the paragraph could be used to answer the question {question}.\n\n\
{passage}\n\n\
Answer (either Yes or No):",
        section = passage.section_type,
    )
}

pub fn comparison_prompt(a: &Passage, b: &Passage, question: &str) -> String {
    format!(
        "Which of paragraphs A and B better answers the question \"{question}\"?\n\n\
Paragraph A: {a}\n\n\
Paragraph B: {b}\n\n\
Question: Which of paragraphs A and B better answers the question '{question}'? \
Answer with \"Paragraph A\" or \"Paragraph B\".\n\n\
Answer: Paragraph"
    )
}

pub fn qa_prompt(context: &str, question: &str) -> String {
    format!(
        "Background text: \"{context}\"\n\n\
Answer the following question about the background text above:\n\n\
Question: \"{question}\"\n\
Answer: \""
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn judge_prompt_ends_at_victor_name() {
        let prompt = judge_prompt("Alice: \"Yes.\"");
        assert!(prompt.contains("*Debate*\nAlice: \"Yes.\"\n\n*Judgment*"));
        assert!(prompt.ends_with("The name of the victor is: \""));
    }

    #[test]
    fn turn_prompt_addresses_agent() {
        let prompt = debate_turn_prompt("Bob", "Question: \"Q\"", 3);
        assert!(prompt.starts_with("You are Bob. There are 3 turns left"));
        assert!(prompt.ends_with("Question: \"Q\"\nYou: \""));
    }

    #[test]
    fn relevance_prompt_names_section() {
        let p = Passage::new("methods", "We enrolled 120 adults.");
        let prompt = relevance_prompt(&p, "What was the study population?");
        assert!(prompt.contains("from the methods section"));
        assert!(prompt.contains("We enrolled 120 adults."));
        assert!(prompt.ends_with("Answer (either Yes or No):"));
    }

    #[test]
    fn comparison_prompt_orders_paragraphs() {
        let a = Passage::new("x", "first");
        let b = Passage::new("x", "second");
        let prompt = comparison_prompt(&a, &b, "q?");
        let pos_a = prompt.find("Paragraph A: first").unwrap();
        let pos_b = prompt.find("Paragraph B: second").unwrap();
        assert!(pos_a < pos_b);
        assert!(prompt.ends_with("Answer: Paragraph"));
    }
}
