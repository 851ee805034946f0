//! Execution of a single scheduled game.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use wikirun::core::types::Outcome;
use wikirun::decider::agent::{AgentDecider, AgentSettings};
use wikirun::game::{GameConfig, GameEngine};
use wikirun::io::completion::CompletionClient;
use wikirun::io::link_store::LinkStore;

use crate::results::{
    FailureRecord, RunArtifact, artifact_exists, clear_failure, write_artifact, write_failure,
};

const SLUG_MAX_LEN: usize = 40;

/// One (start, destination, trial) game of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub proctor_id: String,
    pub start: String,
    pub destination: String,
    pub trial: u32,
    pub seed: u64,
    id: String,
}

impl RunRecord {
    pub fn new(
        proctor_id: impl Into<String>,
        start: impl Into<String>,
        destination: impl Into<String>,
        trial: u32,
        seed: u64,
    ) -> Self {
        let proctor_id = proctor_id.into();
        let start = start.into();
        let destination = destination.into();
        let id = run_id(&proctor_id, &start, &destination, trial);
        Self {
            proctor_id,
            start,
            destination,
            trial,
            seed,
            id,
        }
    }

    /// Filesystem-safe identity, unique per (proctor id, start, destination, trial).
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// `<proctor_id>_<slug(start)>_<slug(destination)>_<trial>_<hash>`.
///
/// Slugs keep names readable; the hash over the raw fields keeps them distinct
/// when two titles slug to the same text.
pub fn run_id(proctor_id: &str, start: &str, destination: &str, trial: u32) -> String {
    let trial_text = trial.to_string();
    let mut hasher = Sha256::new();
    for field in [proctor_id, start, destination, trial_text.as_str()] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    let digest = hasher.finalize();
    format!(
        "{proctor_id}_{}_{}_{trial}_{}",
        slug(start),
        slug(destination),
        hex::encode(&digest[..8])
    )
}

/// Lowercase ASCII alphanumerics with runs of anything else collapsed to `-`.
pub fn slug(title: &str) -> String {
    let mut out = String::new();
    let mut gap = false;
    for c in title.chars() {
        if out.len() >= SLUG_MAX_LEN {
            break;
        }
        if c.is_ascii_alphanumeric() {
            if gap && !out.is_empty() {
                out.push('-');
            }
            gap = false;
            out.push(c.to_ascii_lowercase());
        } else {
            gap = true;
        }
    }
    out
}

/// Shared by every run of a batch.
pub struct RunContext {
    pub store: Arc<dyn LinkStore>,
    pub client: Arc<dyn CompletionClient>,
    pub settings: AgentSettings,
    pub max_steps: u32,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed(Outcome),
    /// Artifact already present; nothing was played.
    Skipped,
    /// Errored out; a failure record was written instead of an artifact.
    Failed,
}

/// Play `record` unless its artifact already exists, then persist the result.
#[instrument(skip_all, fields(run_id = %record.id()))]
pub async fn execute(ctx: &RunContext, record: &RunRecord) -> Result<RunStatus> {
    if artifact_exists(&ctx.output_dir, record.id()).await? {
        debug!("artifact present, skipping");
        return Ok(RunStatus::Skipped);
    }

    info!(
        proctor_id = %record.proctor_id,
        start = %record.start,
        destination = %record.destination,
        trial = record.trial,
        "run started"
    );
    let started_at = Utc::now();
    let config = GameConfig {
        max_allowed_steps: ctx.max_steps,
        record_latency: false,
    };
    let engine = GameEngine::new(
        &record.start,
        &record.destination,
        ctx.store.as_ref(),
        config,
    );
    let mut decider = AgentDecider::new(
        ctx.settings.clone(),
        &record.destination,
        Arc::clone(&ctx.client),
    )
    .with_seed(Some(record.seed));
    let trace = engine.run(&mut decider).await.context("play game")?;
    let finished_at = Utc::now();

    let outcome = trace.outcome();
    let duration = finished_at - started_at;
    let artifact = RunArtifact {
        model: ctx.settings.model.clone(),
        api_base: ctx.settings.api_base.clone(),
        max_links: ctx.settings.max_links,
        max_tries: ctx.settings.max_tries,
        max_steps: ctx.max_steps,
        start_article: record.start.clone(),
        destination_article: record.destination.clone(),
        trial: record.trial,
        seed: record.seed,
        result: outcome.result_tag().to_string(),
        outcome,
        steps: trace,
        started_at: started_at.to_rfc3339(),
        finished_at: finished_at.to_rfc3339(),
        duration_secs: duration.num_milliseconds() as f64 / 1000.0,
    };
    write_artifact(&ctx.output_dir, record.id(), &artifact)
        .await
        .context("write artifact")?;
    if let Err(err) = clear_failure(&ctx.output_dir, record.id()).await {
        warn!(error = %format!("{err:#}"), "could not remove stale failure record");
    }

    info!(outcome = ?outcome, hops = artifact.hops(), "run finished");
    Ok(RunStatus::Completed(outcome))
}

/// Like [`execute`], but a failing run is recorded on disk and reported as
/// [`RunStatus::Failed`] instead of an error.
pub async fn execute_recorded(ctx: &RunContext, record: &RunRecord) -> RunStatus {
    let err = match execute(ctx, record).await {
        Ok(status) => return status,
        Err(err) => err,
    };
    warn!(run_id = %record.id(), error = %format!("{err:#}"), "run failed");
    let failure = FailureRecord::new(record, &err, Utc::now());
    if let Err(write_err) = write_failure(&ctx.output_dir, &failure).await {
        warn!(
            run_id = %record.id(),
            error = %format!("{write_err:#}"),
            "could not write failure record"
        );
    }
    RunStatus::Failed
}
