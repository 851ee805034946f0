//! Batch scheduling.
//!
//! Every ordered pair of distinct articles is played `num_trials` times. Runs
//! are admitted through a semaphore before they are spawned, so no more than
//! `num_workers` runs exist at once.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::run::{RunContext, RunRecord, RunStatus, execute_recorded};

/// The full set of runs for one batch, enumerated lazily.
#[derive(Debug, Clone)]
pub struct RunPlan {
    proctor_id: String,
    articles: Vec<String>,
    num_trials: u32,
    seed: u64,
}

impl RunPlan {
    pub fn new(
        proctor_id: impl Into<String>,
        articles: Vec<String>,
        num_trials: u32,
        seed: u64,
    ) -> Self {
        Self {
            proctor_id: proctor_id.into(),
            articles,
            num_trials,
            seed,
        }
    }

    pub fn articles(&self) -> &[String] {
        &self.articles
    }

    pub fn len(&self) -> usize {
        let n = self.articles.len();
        n * n.saturating_sub(1) * self.num_trials as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records in start, destination, trial order.
    pub fn records(&self) -> RunRecords<'_> {
        RunRecords {
            plan: self,
            start: 0,
            destination: 0,
            trial: 0,
        }
    }
}

pub struct RunRecords<'a> {
    plan: &'a RunPlan,
    start: usize,
    destination: usize,
    trial: u32,
}

impl Iterator for RunRecords<'_> {
    type Item = RunRecord;

    fn next(&mut self) -> Option<RunRecord> {
        let articles = &self.plan.articles;
        loop {
            if self.start >= articles.len() {
                return None;
            }
            if self.destination >= articles.len() {
                self.start += 1;
                self.destination = 0;
                continue;
            }
            if self.start == self.destination || self.trial >= self.plan.num_trials {
                self.destination += 1;
                self.trial = 0;
                continue;
            }
            let trial = self.trial;
            self.trial += 1;
            return Some(RunRecord::new(
                self.plan.proctor_id.as_str(),
                articles[self.start].as_str(),
                articles[self.destination].as_str(),
                trial,
                self.plan.seed.wrapping_add(u64::from(trial)),
            ));
        }
    }
}

/// Tally of one scheduler invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Runs played to completion during this invocation.
    pub completed: usize,
    pub won: usize,
    /// Runs whose artifact already existed.
    pub skipped: usize,
    pub failed: usize,
    /// Runs never admitted because the batch was cancelled.
    pub not_started: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    fn absorb(&mut self, joined: Result<RunStatus, JoinError>) {
        match joined {
            Ok(RunStatus::Completed(outcome)) => {
                self.completed += 1;
                if outcome.is_win() {
                    self.won += 1;
                }
            }
            Ok(RunStatus::Skipped) => self.skipped += 1,
            Ok(RunStatus::Failed) => self.failed += 1,
            Err(err) => {
                warn!(error = %err, "run task aborted");
                self.failed += 1;
            }
        }
    }
}

/// Execute every run of `plan`, at most `num_workers` at a time.
///
/// After `cancel` fires no further runs are admitted; runs already in flight
/// finish and persist normally.
pub async fn run_batch(
    ctx: Arc<RunContext>,
    plan: &RunPlan,
    num_workers: usize,
    cancel: &CancellationToken,
) -> Result<BatchSummary> {
    let gate = Arc::new(Semaphore::new(num_workers));
    let mut tasks = JoinSet::new();
    let mut summary = BatchSummary::default();
    let mut admitted = 0;
    let mut interrupted = false;

    info!(runs = plan.len(), num_workers, "batch started");
    for record in plan.records() {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                interrupted = true;
                break;
            }
            permit = Arc::clone(&gate).acquire_owned() => {
                permit.context("admission gate closed")?
            }
        };
        while let Some(joined) = tasks.try_join_next() {
            summary.absorb(joined);
        }
        admitted += 1;
        let ctx = Arc::clone(&ctx);
        tasks.spawn(async move {
            let _permit = permit;
            execute_recorded(&ctx, &record).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        summary.absorb(joined);
    }
    summary.not_started = plan.len() - admitted;
    summary.cancelled = interrupted;
    info!(
        completed = summary.completed,
        skipped = summary.skipped,
        failed = summary.failed,
        not_started = summary.not_started,
        "batch finished"
    );
    Ok(summary)
}
