//! Turn-taking debate between named agents, settled by a judge.
//!
//! Each turn is produced either by a single `answer` call or by best-of-N:
//! N completions of the turn prompt, each scored by the judge's probability
//! that the speaker wins once the candidate is added to the transcript. The
//! highest score is kept (earliest on ties). Every kept utterance costs one
//! turn, whatever N is.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::fanout::map_async;
use crate::oracle::{CompletionRequest, Oracle, OracleError};
use crate::prompts::{debate_turn_prompt, judge_prompt};

pub const DEFAULT_QUESTION: &str = "Should we ban guns?";
pub const DEFAULT_TURNS: u32 = 8;
pub const DEFAULT_BEST_OF: usize = 3;

/// Opening stance of agent `i` is `OPENING_STANCES[i % 2]`.
const OPENING_STANCES: [&str; 2] = ["I'm in favor.", "I'm against."];

const SELF_LABEL: &str = "You";

#[derive(Debug, thiserror::Error)]
pub enum DebateError {
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("invalid debate configuration: {0}")]
    InvalidRequest(String),
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TurnPolicy {
    /// One single-line completion per turn.
    Answer,
    /// Generate N candidates and keep the one the judge favors most.
    BestOf(usize),
}

impl Default for TurnPolicy {
    fn default() -> Self {
        TurnPolicy::BestOf(DEFAULT_BEST_OF)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DebateConfig {
    pub question: String,
    /// Speaking order. At least two distinct, non-empty names.
    pub agent_names: Vec<String>,
    pub number_of_turns: u32,
    pub policy: TurnPolicy,
    /// Bound on in-flight oracle calls within one best-of-N batch.
    pub concurrency: Option<usize>,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            question: DEFAULT_QUESTION.to_string(),
            agent_names: vec!["Alice".to_string(), "Bob".to_string()],
            number_of_turns: DEFAULT_TURNS,
            policy: TurnPolicy::default(),
            concurrency: None,
        }
    }
}

impl DebateConfig {
    pub fn validate(&self) -> Result<(), DebateError> {
        if self.agent_names.len() < 2 {
            return Err(DebateError::InvalidRequest(
                "a debate needs at least two agents".into(),
            ));
        }
        let mut seen = HashSet::new();
        for name in &self.agent_names {
            if name.trim().is_empty() {
                return Err(DebateError::InvalidRequest("agent names must be non-empty".into()));
            }
            if name == SELF_LABEL {
                return Err(DebateError::InvalidRequest(format!(
                    "`{SELF_LABEL}` is reserved for the addressed agent"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(DebateError::InvalidRequest(format!(
                    "duplicate agent name `{name}`"
                )));
            }
        }
        if self.policy == TurnPolicy::BestOf(0) {
            return Err(DebateError::InvalidRequest("best-of needs at least one candidate".into()));
        }
        if self.concurrency == Some(0) {
            return Err(DebateError::InvalidRequest("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Transcript
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebateTurn {
    pub speaker: String,
    pub text: String,
}

impl DebateTurn {
    pub fn new(speaker: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            speaker: speaker.into(),
            text: text.into(),
        }
    }
}

/// Question framing plus the append-only list of completed turns.
///
/// The framing (the question and each agent's opening stance) is rendered
/// ahead of the turns but is not one of them: `turns().len()` is the number
/// of turns taken.
#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    question: String,
    openings: Vec<DebateTurn>,
    turns: Vec<DebateTurn>,
}

impl Transcript {
    pub fn new(question: impl Into<String>, agent_names: &[String]) -> Self {
        let openings = agent_names
            .iter()
            .enumerate()
            .map(|(i, name)| DebateTurn::new(name.clone(), OPENING_STANCES[i % 2]))
            .collect();
        Self {
            question: question.into(),
            openings,
            turns: Vec::new(),
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn turns(&self) -> &[DebateTurn] {
        &self.turns
    }

    pub fn push(&mut self, turn: DebateTurn) {
        self.turns.push(turn);
    }

    /// One `speaker: "text"` line per entry. Lines spoken by `viewer` are
    /// attributed to "You".
    pub fn render(&self, viewer: Option<&str>) -> String {
        self.render_with(None, viewer)
    }

    /// Render as if `extra` had been appended.
    pub fn render_with(&self, extra: Option<&DebateTurn>, viewer: Option<&str>) -> String {
        let mut lines = vec![format!("Question: \"{}\"", self.question)];
        for turn in self.openings.iter().chain(&self.turns).chain(extra) {
            let speaker = match viewer {
                Some(v) if v == turn.speaker => SELF_LABEL,
                _ => turn.speaker.as_str(),
            };
            lines.push(format!("{speaker}: \"{}\"", turn.text));
        }
        lines.join("\n")
    }
}

/// First line of a generated utterance, without surrounding quote marks or
/// whitespace. A transcript entry is always exactly one line.
pub fn trim_utterance(raw: &str) -> String {
    raw.trim_start()
        .lines()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| c == '"' || c.is_whitespace())
        .to_string()
}

// =============================================================================
// Best-of-N
// =============================================================================

/// One generated continuation for a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Position among the N generated candidates.
    pub index: usize,
    pub text: String,
    pub score: Option<f64>,
}

/// Stable argmax over scores. Unscored or non-finite candidates count as
/// 0.0, and when every score is 0.0 the first candidate wins.
pub fn select_best(candidates: &[Candidate]) -> Option<&Candidate> {
    let mut best: Option<(&Candidate, f64)> = None;
    for candidate in candidates {
        let score = candidate.score.filter(|s| s.is_finite()).unwrap_or(0.0);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((candidate, score)),
        }
    }
    best.map(|(c, _)| c)
}

// =============================================================================
// Runner
// =============================================================================

/// Result of a finished debate.
#[derive(Debug, Clone, Serialize)]
pub struct DebateOutcome {
    pub transcript: Transcript,
    pub judgment_prompt: String,
    /// The judge's free-text reply, unparsed.
    pub verdict: String,
    /// Always 0 for a completed run.
    pub turns_left: u32,
}

impl DebateOutcome {
    /// The judgment prompt followed by the judge's reply.
    pub fn rendered(&self) -> String {
        format!("{}{}", self.judgment_prompt, self.verdict)
    }
}

pub struct Debate {
    speaker: Arc<dyn Oracle>,
    judge: Arc<dyn Oracle>,
    config: DebateConfig,
}

impl Debate {
    /// One oracle for both speaking and judging.
    pub fn new(oracle: Arc<dyn Oracle>, config: DebateConfig) -> Self {
        Self {
            speaker: oracle.clone(),
            judge: oracle,
            config,
        }
    }

    /// Separate oracle for scoring candidates and the final judgment.
    pub fn with_judge(mut self, judge: Arc<dyn Oracle>) -> Self {
        self.judge = judge;
        self
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<DebateOutcome, DebateError> {
        self.config.validate()?;
        let names = &self.config.agent_names;
        info!(
            question = %self.config.question,
            turns = self.config.number_of_turns,
            agents = names.len(),
            "debate started"
        );

        let mut transcript = Transcript::new(self.config.question.clone(), names);
        let mut turns_left = self.config.number_of_turns;

        'debate: while turns_left > 0 {
            for name in names {
                if turns_left == 0 {
                    break 'debate;
                }
                let text = self.take_turn(&transcript, name, turns_left).await?;
                debug!(turns_left, speaker = %name, text = %text, "turn taken");
                transcript.push(DebateTurn::new(name.clone(), text));
                turns_left -= 1;
            }
        }

        let judgment_prompt = judge_prompt(&transcript.render(None));
        let verdict = self.judge.answer(&judgment_prompt).await?;
        info!(turns = transcript.turns().len(), "debate judged");

        Ok(DebateOutcome {
            transcript,
            judgment_prompt,
            verdict,
            turns_left,
        })
    }

    async fn take_turn(
        &self,
        transcript: &Transcript,
        name: &str,
        turns_left: u32,
    ) -> Result<String, DebateError> {
        let prompt = debate_turn_prompt(name, &transcript.render(Some(name)), turns_left);
        let raw = match self.config.policy {
            TurnPolicy::Answer => {
                self.speaker
                    .complete(CompletionRequest::new(prompt.as_str()).stop(["\n"]))
                    .await?
            }
            TurnPolicy::BestOf(n) => {
                let candidates = self.candidates(transcript, name, &prompt, n).await?;
                select_best(&candidates)
                    .map(|c| c.text.clone())
                    .unwrap_or_default()
            }
        };
        Ok(trim_utterance(&raw))
    }

    /// Generate `n` candidates for `name`'s turn and score each one.
    pub async fn candidates(
        &self,
        transcript: &Transcript,
        name: &str,
        prompt: &str,
        n: usize,
    ) -> Result<Vec<Candidate>, DebateError> {
        let speaker = self.speaker.as_ref();
        let texts = map_async(0..n, self.config.concurrency, move |i| {
            speaker.complete(CompletionRequest::new(prompt).stop(["\n"]).cache_key(i))
        })
        .await?;

        let scores = self.win_probabilities(transcript, name, &texts).await?;
        let candidates: Vec<Candidate> = texts
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(index, (text, score))| Candidate {
                index,
                text,
                score: Some(score),
            })
            .collect();
        debug!(
            speaker = %name,
            scores = ?candidates.iter().map(|c| c.score).collect::<Vec<_>>(),
            "scored candidates"
        );
        Ok(candidates)
    }

    /// Judge's probability that `name` wins with each utterance appended.
    async fn win_probabilities(
        &self,
        transcript: &Transcript,
        name: &str,
        texts: &[String],
    ) -> Result<Vec<f64>, OracleError> {
        let judge = self.judge.as_ref();
        let choices = &self.config.agent_names;
        map_async(0..texts.len(), self.config.concurrency, move |i| async move {
            let turn = DebateTurn::new(name, trim_utterance(&texts[i]));
            let prompt = judge_prompt(&transcript.render_with(Some(&turn), None));
            let dist = judge.classify(&prompt, choices).await?;
            Ok::<_, OracleError>(dist.prob(name))
        })
        .await
    }
}
