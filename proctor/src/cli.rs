//! CLI command implementations.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wikirun::io::completion::{CompletionClient, OpenAiClient, RetryPolicy, RetryingClient};
use wikirun::io::link_store::{LinkStore, SqliteLinkStore};

use crate::config::{ProctorConfig, load_article_list};
use crate::outcome::{BatchOutcome, classify_batch};
use crate::report::{FinalReport, aggregate, load_report, write_report};
use crate::run::RunContext;
use crate::schedule::{RunPlan, run_batch};

/// Run a full batch against the configured corpus and completion endpoint.
///
/// Ctrl-C stops admitting runs; rerunning the same command resumes.
pub async fn run_batch_command(config: ProctorConfig) -> Result<i32> {
    config.validate().context("invalid configuration")?;
    let articles = load_article_list(&config.article_list)?;
    let store = SqliteLinkStore::open(&config.db_path)?;
    info!(
        corpus = %store.path().display(),
        corpus_articles = store.article_count(),
        pool = articles.len(),
        "inputs loaded"
    );
    let client = Arc::new(RetryingClient::new(
        OpenAiClient::from_env(config.agent.request_timeout())?,
        RetryPolicy::default(),
    ));

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, waiting for in-flight runs");
                cancel.cancel();
            }
        })
    };
    let result = run_planned(&config, articles, Arc::new(store), client, &cancel).await;
    watcher.abort();
    result
}

/// Schedule, execute and, when every run succeeded, aggregate one batch.
pub async fn run_planned(
    config: &ProctorConfig,
    articles: Vec<String>,
    store: Arc<dyn LinkStore>,
    client: Arc<dyn CompletionClient>,
    cancel: &CancellationToken,
) -> Result<i32> {
    for title in &articles {
        if store.lookup(title).await?.is_none() {
            warn!(title = %title, "article not found in corpus");
        }
    }
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .with_context(|| format!("create {}", config.output_dir.display()))?;

    let plan = RunPlan::new(
        config.proctor_id.as_str(),
        articles,
        config.num_trials,
        config.seed,
    );
    if plan.is_empty() {
        bail!("article pool yields no runs");
    }
    debug!(runs = plan.len(), "plan built");
    let ctx = Arc::new(RunContext {
        store,
        client,
        settings: config.agent.clone(),
        max_steps: config.max_steps,
        output_dir: config.output_dir.clone(),
    });
    let summary = run_batch(ctx, &plan, config.num_workers, cancel).await?;
    println!(
        "batch: proctor={} runs={} completed={} skipped={} failed={} not_started={}",
        config.proctor_id,
        plan.len(),
        summary.completed,
        summary.skipped,
        summary.failed,
        summary.not_started
    );

    let outcome = classify_batch(&summary);
    match outcome {
        BatchOutcome::Complete => {
            let report = aggregate(config, &plan).await.context("aggregate results")?;
            let path = write_report(&config.output_dir, &report).await?;
            print_report(&report);
            println!("report: written to {}", path.display());
        }
        BatchOutcome::Interrupted => {
            eprintln!("interrupted: rerun the same command to resume");
        }
        BatchOutcome::FailedRuns => {
            eprintln!(
                "{} runs failed (see run_*.failed.json in {}); rerun to retry them",
                summary.failed,
                config.output_dir.display()
            );
        }
    }
    Ok(outcome.exit_code())
}

/// Show an existing consolidated report.
pub async fn report_command(output_dir: &std::path::Path, proctor_id: &str) -> Result<i32> {
    let report = load_report(output_dir, proctor_id).await?;
    print_report(&report);
    Ok(wikirun::exit_codes::OK)
}

fn print_report(report: &FinalReport) {
    let stats = &report.stats;
    println!(
        "report: proctor={} model={} runs={}",
        report.proctor_id, report.agent_settings.model, stats.total_runs
    );
    println!(
        "report: wins={} losses={} win_rate={:.3} lose_rate={:.3}",
        stats.win_count, stats.lose_count, stats.win_rate, stats.lose_rate
    );
    match stats.average_hops {
        Some(avg) => println!("report: average_hops={:.2}", avg),
        None => println!("report: average_hops=n/a"),
    }
}
