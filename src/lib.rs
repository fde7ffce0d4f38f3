#![forbid(unsafe_code)]

//! # oracle-recipes
//!
//! Small experiments driven by a language-model judgment oracle:
//!
//! - **Debate**: named agents take turns arguing a question. Each turn can be
//!   best-of-N: several candidate utterances are sampled and the one the judge
//!   thinks most likely to win is kept. A judge then names the victor.
//! - **Paper QA**: passages of a paper are ranked by relevance to a question
//!   (pairwise quicksort over "which paragraph answers better" judgments, or
//!   pointwise yes/no relevance), the best prefix is packed into a token budget,
//!   and the question is answered from that context.
//!
//! The oracle is reached only through the [`oracle::Oracle`] trait. The network
//! backend goes through the OpenRouter [`gateway`] and an optional SQLite
//! response [`cache`].

pub mod cache;
pub mod debate;
pub mod fanout;
pub mod gateway;
pub mod oracle;
pub mod pack;
pub mod paper;
pub mod paper_qa;
pub mod prompts;
pub mod rank;
pub mod tokens;

pub use cache::{ResponseCache, ResponseCacheKey, SqliteResponseCache};
pub use debate::{Debate, DebateConfig, DebateError, DebateOutcome, TurnPolicy};
pub use fanout::{map_all, map_async};
pub use gateway::{Attribution, ChatGateway, ProviderGateway, UsageSink};
pub use oracle::{ChatOracle, ChatOracleConfig, Oracle, OracleError, ScriptedOracle};
pub use pack::{pack, ContextWindow, CutoffPolicy};
pub use paper::{Paper, Passage};
pub use paper_qa::{Answerer, OracleAnswerer, PaperQa, PaperQaConfig, PaperQaError};
pub use rank::{Comparator, PassageRanker, Preference, RankMode};
pub use tokens::{BpeTokenCounter, TokenCounter};
