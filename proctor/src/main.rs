mod cli;
mod config;
mod outcome;
mod report;
mod results;
mod run;
mod schedule;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use wikirun::exit_codes;
use wikirun::logging;

use crate::config::{ProctorConfig, load_config};

#[derive(Parser)]
#[command(
    name = "proctor",
    version,
    about = "Play every pair of a pool of articles and aggregate the results"
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
    /// Run (or resume) a batch and write the consolidated report.
    Run(RunArgs),
    /// Print the summary of an existing consolidated report.
    Report {
        #[arg(long, default_value = "./proctor_tmp")]
        output_dir: PathBuf,
        #[arg(long, default_value = "proctor_1")]
        proctor_id: String,
    },
}

/// Flags override values from `--config`, which override the defaults.
#[derive(Args, Debug, Default)]
struct RunArgs {
    /// TOML file with batch settings.
    #[arg(long)]
    config: Option<PathBuf>,
    /// [default: gpt-4o]
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    api_base: Option<String>,
    /// [default: 20]
    #[arg(long)]
    workers: Option<usize>,
    /// [default: 1]
    #[arg(long)]
    trials: Option<u32>,
    /// [default: 20]
    #[arg(long)]
    max_steps: Option<u32>,
    /// [default: 200]
    #[arg(long)]
    max_links: Option<usize>,
    /// [default: 3]
    #[arg(long)]
    max_tries: Option<u32>,
    /// Seconds per completion call [default: 120]
    #[arg(long)]
    request_timeout: Option<u64>,
    /// [default: wikihop.db]
    #[arg(long)]
    db_path: Option<PathBuf>,
    /// [default: ./proctor_tmp]
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// [default: proctor_1]
    #[arg(long)]
    proctor_id: Option<String>,
    /// [default: 42]
    #[arg(long)]
    seed: Option<u64>,
    /// [default: supernodes.json]
    #[arg(long)]
    article_list: Option<PathBuf>,
}

impl RunArgs {
    fn into_config(self) -> Result<ProctorConfig> {
        let mut cfg = load_config(self.config.as_deref())?;
        if let Some(model) = self.model {
            cfg.agent.model = model;
        }
        if let Some(api_base) = self.api_base {
            cfg.agent.api_base = api_base;
        }
        if let Some(max_links) = self.max_links {
            cfg.agent.max_links = Some(max_links);
        }
        if let Some(max_tries) = self.max_tries {
            cfg.agent.max_tries = max_tries;
        }
        if let Some(request_timeout) = self.request_timeout {
            cfg.agent.request_timeout_secs = request_timeout;
        }
        if let Some(workers) = self.workers {
            cfg.num_workers = workers;
        }
        if let Some(trials) = self.trials {
            cfg.num_trials = trials;
        }
        if let Some(max_steps) = self.max_steps {
            cfg.max_steps = max_steps;
        }
        if let Some(db_path) = self.db_path {
            cfg.db_path = db_path;
        }
        if let Some(output_dir) = self.output_dir {
            cfg.output_dir = output_dir;
        }
        if let Some(proctor_id) = self.proctor_id {
            cfg.proctor_id = proctor_id;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(article_list) = self.article_list {
            cfg.article_list = article_list;
        }
        Ok(cfg)
    }
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
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    match cli.command {
        Command::Run(args) => {
            let config = args.into_config()?;
            runtime.block_on(cli::run_batch_command(config))
        }
        Command::Report {
            output_dir,
            proctor_id,
        } => runtime.block_on(cli::report_command(&output_dir, &proctor_id)),
    }
}
