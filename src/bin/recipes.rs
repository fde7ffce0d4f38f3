#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use oracle_recipes::cache::{CacheLock, ResponseCache, SqliteResponseCache};
use oracle_recipes::debate::{
    Debate, DebateConfig, TurnPolicy, DEFAULT_BEST_OF, DEFAULT_QUESTION, DEFAULT_TURNS,
};
use oracle_recipes::gateway::openrouter::OpenRouterAdapter;
use oracle_recipes::gateway::{
    ChatGateway, NoopUsageSink, ProviderGateway, StderrUsageSink,
};
use oracle_recipes::oracle::{ChatOracle, ChatOracleConfig, Oracle, DEFAULT_MODEL};
use oracle_recipes::pack::{CutoffPolicy, DEFAULT_BUDGET};
use oracle_recipes::paper::Paper;
use oracle_recipes::paper_qa::{PaperQa, PaperQaConfig};
use oracle_recipes::rank::{ComparatorKind, RankMode};
use oracle_recipes::tokens::{BpeTokenCounter, TokenCounter};

#[derive(Parser)]
#[command(name = "recipes", version, about = "Oracle-judged debate and paper QA recipes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OracleArgs {
    /// OpenRouter model id (must return logprobs for classification)
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
    /// Response cache path (default: $ORACLE_CACHE_PATH or .oracle_response_cache.sqlite)
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Call the provider for every request
    #[arg(long)]
    no_cache: bool,
    /// Hold an exclusive lock on the cache for the whole run
    #[arg(long)]
    lock_cache: bool,
    /// Write one JSON usage record per provider call to stderr
    #[arg(long)]
    usage: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a debate and print the judgment
    Debate {
        #[arg(long, default_value = DEFAULT_QUESTION)]
        question: String,
        /// Comma-separated speaking order
        #[arg(long, value_delimiter = ',', default_value = "Alice,Bob")]
        names: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_TURNS)]
        turns: u32,
        /// Candidates per turn; 1 still scores the single candidate
        #[arg(long, default_value_t = DEFAULT_BEST_OF)]
        best_of: usize,
        /// One plain answer per turn instead of best-of-N
        #[arg(long, conflicts_with = "best_of")]
        plain: bool,
        #[arg(long)]
        concurrency: Option<usize>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Answer a question from the most relevant passages of a paper
    PaperQa {
        /// Paper as JSON ({"paragraphs":[{"section_type":..,"text":..}]}) or plain text
        #[arg(long)]
        paper: PathBuf,
        #[arg(long)]
        question: String,
        /// pairwise | pointwise
        #[arg(long, default_value = "pairwise")]
        mode: RankMode,
        /// completion | classification
        #[arg(long, default_value = "completion")]
        comparator: ComparatorKind,
        /// corrected | faithful
        #[arg(long, default_value = "corrected")]
        cutoff: CutoffPolicy,
        #[arg(long, default_value_t = DEFAULT_BUDGET)]
        budget: usize,
        /// gpt2 | cl100k
        #[arg(long, default_value = "gpt2")]
        tokenizer: String,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        oracle: OracleArgs,
    },
    /// Export the response cache to JSONL
    CacheExport {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Prune the response cache (by age and/or size)
    CachePrune {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        max_age_days: Option<u64>,
        #[arg(long)]
        max_rows: Option<usize>,
    },
}

/// Everything a recipe needs to reach the oracle.
struct OracleStack {
    gateway: Arc<dyn ChatGateway>,
    cache: Option<Arc<dyn ResponseCache>>,
    run_id: Uuid,
    model: String,
    _lock: Option<CacheLock>,
}

impl OracleStack {
    fn open(args: &OracleArgs) -> Result<Self, Box<dyn std::error::Error>> {
        let openrouter = OpenRouterAdapter::from_env()?;
        let gateway: Arc<dyn ChatGateway> = if args.usage {
            Arc::new(ProviderGateway::new(openrouter, Arc::new(StderrUsageSink)))
        } else {
            Arc::new(ProviderGateway::new(openrouter, Arc::new(NoopUsageSink)))
        };

        let (cache, lock) = if args.no_cache {
            (None, None)
        } else {
            let path = args
                .cache
                .clone()
                .unwrap_or_else(SqliteResponseCache::default_path);
            let cache = SqliteResponseCache::new(&path)?;
            let lock = if args.lock_cache {
                Some(cache.lock_exclusive()?)
            } else {
                None
            };
            info!(path = %path.display(), "response cache open");
            (Some(Arc::new(cache) as Arc<dyn ResponseCache>), lock)
        };

        Ok(Self {
            gateway,
            cache,
            run_id: Uuid::new_v4(),
            model: args.model.clone(),
            _lock: lock,
        })
    }

    fn oracle(&self, config: ChatOracleConfig) -> Arc<dyn Oracle> {
        let oracle = ChatOracle::new(self.gateway.clone(), config.with_run(self.run_id));
        match &self.cache {
            Some(cache) => Arc::new(oracle.with_cache(cache.clone())),
            None => Arc::new(oracle),
        }
    }

    /// Samples at a nonzero temperature so best-of-N candidates differ.
    fn stochastic(&self) -> Arc<dyn Oracle> {
        self.oracle(ChatOracleConfig::stochastic(&self.model))
    }

    fn deterministic(&self) -> Arc<dyn Oracle> {
        self.oracle(ChatOracleConfig::deterministic(&self.model))
    }
}

fn tokenizer(name: &str) -> Result<Arc<dyn TokenCounter>, Box<dyn std::error::Error>> {
    let counter = match name {
        "gpt2" | "r50k_base" => BpeTokenCounter::gpt2()?,
        "cl100k" | "cl100k_base" => BpeTokenCounter::cl100k()?,
        other => return Err(format!("unknown tokenizer `{other}` (gpt2|cl100k)").into()),
    };
    Ok(Arc::new(counter))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Debate {
            question,
            names,
            turns,
            best_of,
            plain,
            concurrency,
            json,
            oracle,
        } => {
            let stack = OracleStack::open(&oracle)?;
            let config = DebateConfig {
                question,
                agent_names: names.into_iter().map(|n| n.trim().to_string()).collect(),
                number_of_turns: turns,
                policy: if plain {
                    TurnPolicy::Answer
                } else {
                    TurnPolicy::BestOf(best_of)
                },
                concurrency,
            };
            let outcome = Debate::new(stack.stochastic(), config)
                .with_judge(stack.deterministic())
                .run()
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.rendered());
            }
        }
        Commands::PaperQa {
            paper,
            question,
            mode,
            comparator,
            cutoff,
            budget,
            tokenizer: encoding,
            concurrency,
            json,
            oracle,
        } => {
            let stack = OracleStack::open(&oracle)?;
            let paper = Paper::load(&paper)?;
            let config = PaperQaConfig {
                mode,
                comparator,
                budget,
                cutoff,
                concurrency,
            };
            let qa = PaperQa::new(stack.deterministic(), tokenizer(&encoding)?, config);
            let outcome = qa.answer(&paper, &question).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.answer);
            }
        }
        Commands::CacheExport { db, out } => {
            let path = db.unwrap_or_else(SqliteResponseCache::default_path);
            let cache = SqliteResponseCache::new(path)?;
            let written = cache.export_jsonl(&out).await?;
            info!(rows = written, out = %out.display(), "cache exported");
        }
        Commands::CachePrune {
            db,
            max_age_days,
            max_rows,
        } => {
            if max_age_days.is_none() && max_rows.is_none() {
                return Err("cache-prune requires --max-age-days and/or --max-rows".into());
            }
            if matches!(max_rows, Some(0)) {
                return Err("--max-rows must be >= 1".into());
            }
            let path = db.unwrap_or_else(SqliteResponseCache::default_path);
            let cache = SqliteResponseCache::new(path)?;
            let _lock = cache.lock_exclusive()?;
            let stats = cache.prune(max_age_days, max_rows).await?;
            println!(
                "pruned {} rows; {} rows remain",
                stats.deleted, stats.remaining
            );
        }
    }

    Ok(())
}
