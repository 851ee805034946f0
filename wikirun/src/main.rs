//! Play a single link-navigation game from the terminal.
//!
//! The player is either a human at the keyboard or a model behind an
//! OpenAI-compatible endpoint. The full trace is printed when the game ends.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use wikirun::core::types::GameTrace;
use wikirun::decider::agent::{AgentDecider, AgentSettings};
use wikirun::decider::human::HumanDecider;
use wikirun::exit_codes;
use wikirun::game::{GameConfig, GameEngine};
use wikirun::io::completion::{DEFAULT_API_BASE, OpenAiClient, RetryPolicy, RetryingClient};
use wikirun::io::link_store::SqliteLinkStore;
use wikirun::logging;

#[derive(Parser)]
#[command(
    name = "wikirun",
    version,
    about = "Navigate between articles by following links"
)]
struct Cli {
    /// Log progress at info level (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play one game and print its trace.
    Play(PlayArgs),
    /// Print the article count and every title in the corpus.
    Articles {
        #[arg(long)]
        db: PathBuf,
    },
}

#[derive(Args)]
#[command(group(ArgGroup::new("player").required(true).args(["human", "agent"])))]
struct PlayArgs {
    /// Choose links yourself.
    #[arg(long)]
    human: bool,
    /// Let a model choose links.
    #[arg(long)]
    agent: bool,
    #[arg(long, default_value = "British Library")]
    start: String,
    #[arg(long, default_value = "Saint Lucia")]
    end: String,
    /// Path to the SQLite corpus.
    #[arg(long)]
    db: PathBuf,
    #[arg(long, default_value_t = 10)]
    max_steps: u32,
    #[arg(long, default_value = "gpt-4o")]
    model: String,
    #[arg(long, default_value = DEFAULT_API_BASE)]
    api_base: String,
    #[arg(long, default_value_t = 200)]
    max_links: usize,
    #[arg(long, default_value_t = 3)]
    max_tries: u32,
    /// Seconds before a single completion call is abandoned.
    #[arg(long, default_value_t = 120)]
    request_timeout: u64,
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    match cli.command {
        Command::Play(args) => runtime.block_on(cmd_play(args, cli.verbose)),
        Command::Articles { db } => cmd_articles(&db),
    }
}

async fn cmd_play(args: PlayArgs, verbose: bool) -> Result<i32> {
    let store = SqliteLinkStore::open(&args.db)?;
    let config = GameConfig {
        max_allowed_steps: args.max_steps,
        record_latency: true,
    };
    let engine = GameEngine::new(&args.start, &args.end, &store, config);
    println!("Starting game from {} to {}", args.start, args.end);

    let trace = if args.human {
        let mut decider = HumanDecider::stdio("Human");
        engine.run(&mut decider).await?
    } else {
        let settings = AgentSettings {
            model: args.model,
            api_base: args.api_base,
            max_links: Some(args.max_links),
            max_tries: args.max_tries,
            request_timeout_secs: args.request_timeout,
        };
        settings.validate().context("agent settings")?;
        let client = Arc::new(RetryingClient::new(
            OpenAiClient::from_env(settings.request_timeout())?,
            RetryPolicy::default(),
        ));
        let mut decider = AgentDecider::new(settings, &args.end, client)
            .with_seed(args.seed)
            .with_verbose(verbose);
        engine.run(&mut decider).await?
    };

    let mut stdout = std::io::stdout().lock();
    write_trace(&mut stdout, &trace)?;
    Ok(if trace.outcome().is_win() {
        exit_codes::OK
    } else {
        exit_codes::LOST
    })
}

fn cmd_articles(db: &std::path::Path) -> Result<i32> {
    let store = SqliteLinkStore::open(db)?;
    let titles = store.list_titles()?;
    println!("articles: {}", store.article_count());
    for title in titles {
        println!("{title}");
    }
    Ok(exit_codes::OK)
}

/// Print every step of a finished game.
fn write_trace<W: Write>(out: &mut W, trace: &GameTrace) -> Result<()> {
    writeln!(out, "Game over in {} steps ({:?})", trace.len(), trace.outcome())?;
    for (index, step) in trace.steps().iter().enumerate() {
        writeln!(out, "Step {index}: {}", step.kind.as_str())?;
        writeln!(out, "  Article: {}", step.article.as_deref().unwrap_or("-"))?;
        writeln!(out, "  Links: {:?}", step.links)?;
        let metadata = serde_json::to_string(&step.metadata).context("serialize metadata")?;
        writeln!(out, "  Metadata: {metadata}")?;
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikirun::core::types::{GameStep, StepKind, StepMetadata};
    use wikirun::test_support::TestCorpus;

    #[test]
    fn play_requires_a_player() {
        let result = Cli::try_parse_from(["wikirun", "play", "--db", "corpus.db"]);
        assert!(result.is_err());
    }

    #[test]
    fn play_rejects_both_players() {
        let result =
            Cli::try_parse_from(["wikirun", "play", "--db", "x.db", "--human", "--agent"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_agent_defaults() {
        let cli = Cli::parse_from(["wikirun", "play", "--db", "x.db", "--agent", "--seed", "7"]);
        let Command::Play(args) = cli.command else {
            panic!("expected play");
        };
        assert!(args.agent);
        assert_eq!(args.max_steps, 10);
        assert_eq!(args.max_tries, 3);
        assert_eq!(args.seed, Some(7));
        assert_eq!(args.start, "British Library");
    }

    #[test]
    fn trace_printout_lists_every_step() {
        let trace = GameTrace::from(vec![
            GameStep {
                kind: StepKind::Start,
                article: Some("A".to_string()),
                links: vec!["B".to_string()],
                metadata: StepMetadata::message("Game started"),
            },
            GameStep {
                kind: StepKind::Win,
                article: Some("B".to_string()),
                links: Vec::new(),
                metadata: StepMetadata::default(),
            },
        ]);
        let mut out = Vec::new();
        write_trace(&mut out, &trace).expect("write");
        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.starts_with("Game over in 2 steps (Won)"));
        assert!(printed.contains("Step 1: win\n  Article: B\n"));
        assert!(printed.contains(r#"Metadata: {"message":"Game started"}"#));
    }

    #[test]
    fn articles_reads_corpus() {
        let corpus = TestCorpus::new(&[("Paris", &["Rome"]), ("Rome", &[])]).expect("corpus");
        let code = cmd_articles(corpus.path()).expect("articles");
        assert_eq!(code, exit_codes::OK);
    }

    #[test]
    fn missing_corpus_fails_fast() {
        let err = cmd_articles(std::path::Path::new("/nonexistent/corpus.db")).unwrap_err();
        assert!(err.to_string().contains("corpus database not found"));
    }
}
