//! Aggregation of a finished batch into `<proctor_id>-final-results.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use wikirun::decider::agent::AgentSettings;

use crate::config::ProctorConfig;
use crate::results::{
    RunArtifact, artifact_path, read_artifact, read_failure, read_json, write_json_atomic,
};
use crate::schedule::RunPlan;

/// Consolidated report: the batch configuration, every run, and the stats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalReport {
    pub proctor_id: String,
    pub article_list: Vec<String>,
    pub num_trials: u32,
    pub num_workers: usize,
    pub max_steps: u32,
    pub agent_settings: AgentSettings,
    pub runs: Vec<RunArtifact>,
    #[serde(flatten)]
    pub stats: ReportStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportStats {
    pub total_runs: usize,
    pub win_count: usize,
    pub lose_count: usize,
    /// Hop count of every win, in run order.
    pub hops_distribution: Vec<usize>,
    /// Mean over wins only; `None` without wins.
    pub average_hops: Option<f64>,
    pub win_rate: f64,
    pub lose_rate: f64,
}

pub fn summarize(runs: &[RunArtifact]) -> ReportStats {
    let hops_distribution: Vec<usize> = runs
        .iter()
        .filter(|run| run.is_win())
        .map(RunArtifact::hops)
        .collect();
    let total_runs = runs.len();
    let win_count = hops_distribution.len();
    let lose_count = total_runs - win_count;
    let average_hops = if hops_distribution.is_empty() {
        None
    } else {
        Some(hops_distribution.iter().sum::<usize>() as f64 / win_count as f64)
    };
    let (win_rate, lose_rate) = if total_runs == 0 {
        (0.0, 0.0)
    } else {
        (
            win_count as f64 / total_runs as f64,
            lose_count as f64 / total_runs as f64,
        )
    };
    ReportStats {
        total_runs,
        win_count,
        lose_count,
        hops_distribution,
        average_hops,
        win_rate,
        lose_rate,
    }
}

pub fn report_path(output_dir: &Path, proctor_id: &str) -> PathBuf {
    output_dir.join(format!("{proctor_id}-final-results.json"))
}

/// Read back every planned run, in plan order, and build the report.
///
/// A run without an artifact fails the aggregation; the error quotes the
/// run's failure record when it left one.
pub async fn aggregate(config: &ProctorConfig, plan: &RunPlan) -> Result<FinalReport> {
    let mut runs = Vec::with_capacity(plan.len());
    for record in plan.records() {
        let path = artifact_path(&config.output_dir, record.id());
        let present = tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("stat {}", path.display()))?;
        if !present {
            if let Some(failure) = read_failure(&config.output_dir, record.id()).await? {
                bail!(
                    "run {} has no artifact; it failed at {}: {}",
                    record.id(),
                    failure.failed_at,
                    failure.error
                );
            }
            bail!("run {} has no artifact at {}", record.id(), path.display());
        }
        let artifact = read_artifact(&path)
            .await
            .with_context(|| format!("load run {}", record.id()))?;
        debug!(run_id = %record.id(), result = %artifact.result, "artifact loaded");
        runs.push(artifact);
    }

    let stats = summarize(&runs);
    info!(
        total_runs = stats.total_runs,
        win_count = stats.win_count,
        win_rate = stats.win_rate,
        "batch aggregated"
    );
    Ok(FinalReport {
        proctor_id: config.proctor_id.clone(),
        article_list: plan.articles().to_vec(),
        num_trials: config.num_trials,
        num_workers: config.num_workers,
        max_steps: config.max_steps,
        agent_settings: config.agent.clone(),
        runs,
        stats,
    })
}

pub async fn write_report(output_dir: &Path, report: &FinalReport) -> Result<PathBuf> {
    let path = report_path(output_dir, &report.proctor_id);
    write_json_atomic(&path, report).await?;
    Ok(path)
}

pub async fn load_report(output_dir: &Path, proctor_id: &str) -> Result<FinalReport> {
    let path = report_path(output_dir, proctor_id);
    if !path.exists() {
        bail!("no report at {}", path.display());
    }
    read_json(&path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{FailureRecord, write_artifact, write_failure};
    use crate::run::RunRecord;
    use tempfile::tempdir;
    use wikirun::core::types::{GameStep, GameTrace, Outcome, StepKind, StepMetadata};

    fn step(kind: StepKind, article: Option<&str>) -> GameStep {
        GameStep {
            kind,
            article: article.map(str::to_string),
            links: Vec::new(),
            metadata: StepMetadata::default(),
        }
    }

    fn artifact(record: &RunRecord, hops: usize, won: bool) -> RunArtifact {
        let mut steps = vec![step(StepKind::Start, Some(&record.start))];
        for _ in 1..hops {
            steps.push(step(StepKind::Move, Some("Hub")));
        }
        steps.push(if won {
            step(StepKind::Win, Some(&record.destination))
        } else {
            step(StepKind::Lose, None)
        });
        let steps = GameTrace::from(steps);
        let outcome = steps.outcome();
        RunArtifact {
            model: "gpt-4o".to_string(),
            api_base: "http://localhost".to_string(),
            max_links: Some(200),
            max_tries: 3,
            max_steps: 20,
            start_article: record.start.clone(),
            destination_article: record.destination.clone(),
            trial: record.trial,
            seed: record.seed,
            steps,
            result: outcome.result_tag().to_string(),
            outcome,
            started_at: "2026-01-01T00:00:00+00:00".to_string(),
            finished_at: "2026-01-01T00:00:01+00:00".to_string(),
            duration_secs: 1.0,
        }
    }

    fn config(output_dir: &Path) -> ProctorConfig {
        ProctorConfig {
            proctor_id: "p".to_string(),
            output_dir: output_dir.to_path_buf(),
            ..ProctorConfig::default()
        }
    }

    fn plan() -> RunPlan {
        RunPlan::new("p", vec!["A".to_string(), "B".to_string()], 1, 42)
    }

    #[test]
    fn stats_cover_wins_and_losses() {
        let records: Vec<_> = plan().records().collect();
        let runs = vec![
            artifact(&records[0], 2, true),
            artifact(&records[1], 1, false),
            artifact(&records[0], 4, true),
        ];
        let stats = summarize(&runs);
        assert_eq!(stats.total_runs, 3);
        assert_eq!(stats.win_count + stats.lose_count, stats.total_runs);
        assert_eq!(stats.hops_distribution, vec![2, 4]);
        assert_eq!(stats.average_hops, Some(3.0));
        assert!((stats.win_rate + stats.lose_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_wins_means_no_average() {
        let records: Vec<_> = plan().records().collect();
        let stats = summarize(&[artifact(&records[0], 1, false)]);
        assert_eq!(stats.average_hops, None);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.lose_rate, 1.0);
    }

    #[tokio::test]
    async fn aggregates_in_plan_order_and_writes_report() {
        let temp = tempdir().expect("tempdir");
        let config = config(temp.path());
        let plan = plan();
        let records: Vec<_> = plan.records().collect();
        write_artifact(temp.path(), records[1].id(), &artifact(&records[1], 1, false))
            .await
            .expect("write");
        write_artifact(temp.path(), records[0].id(), &artifact(&records[0], 3, true))
            .await
            .expect("write");

        let report = aggregate(&config, &plan).await.expect("aggregate");
        assert_eq!(report.runs[0].start_article, "A");
        assert_eq!(report.runs[1].start_article, "B");
        assert_eq!(report.runs[1].outcome, Outcome::LostInvalidMove);
        assert_eq!(report.stats.hops_distribution, vec![3]);
        assert_eq!(report.article_list, vec!["A", "B"]);

        let path = write_report(temp.path(), &report).await.expect("write report");
        assert!(path.ends_with("p-final-results.json"));
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(raw["win_rate"], 0.5);
        assert_eq!(raw["runs"][0]["result"], "win");
        assert_eq!(raw["runs"][0]["steps"][0]["type"], "start");

        let loaded = load_report(temp.path(), "p").await.expect("load");
        assert_eq!(loaded, report);
    }

    #[tokio::test]
    async fn missing_artifact_names_the_run() {
        let temp = tempdir().expect("tempdir");
        let plan = plan();
        let records: Vec<_> = plan.records().collect();
        write_artifact(temp.path(), records[0].id(), &artifact(&records[0], 1, true))
            .await
            .expect("write");

        let err = aggregate(&config(temp.path()), &plan).await.unwrap_err();
        assert!(err.to_string().contains(records[1].id()));
    }

    #[tokio::test]
    async fn missing_artifact_quotes_failure_record() {
        let temp = tempdir().expect("tempdir");
        let plan = plan();
        let records: Vec<_> = plan.records().collect();
        let cause = anyhow::anyhow!("status 503");
        write_failure(
            temp.path(),
            &FailureRecord::new(&records[0], &cause, chrono::Utc::now()),
        )
        .await
        .expect("write failure");

        let err = aggregate(&config(temp.path()), &plan).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains(records[0].id()));
        assert!(message.contains("status 503"));
    }

    #[tokio::test]
    async fn malformed_artifact_fails_loudly() {
        let temp = tempdir().expect("tempdir");
        let plan = plan();
        for record in plan.records() {
            std::fs::write(artifact_path(temp.path(), record.id()), "[]").expect("write");
        }
        let err = aggregate(&config(temp.path()), &plan).await.unwrap_err();
        assert!(format!("{err:#}").contains("parse"));
    }
}
