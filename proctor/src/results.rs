//! Per-run persistence.
//!
//! A run's artifact doubles as its completion marker, so every file here is
//! written to a temp path and renamed into place.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use wikirun::core::types::{GameTrace, Outcome};

use crate::run::RunRecord;

/// Persisted result of one finished game, `run_<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunArtifact {
    pub model: String,
    pub api_base: String,
    pub max_links: Option<usize>,
    pub max_tries: u32,
    pub max_steps: u32,
    pub start_article: String,
    pub destination_article: String,
    pub trial: u32,
    pub seed: u64,
    pub steps: GameTrace,
    /// `win` or `lose`.
    pub result: String,
    pub outcome: Outcome,
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: f64,
}

impl RunArtifact {
    pub fn is_win(&self) -> bool {
        self.outcome.is_win()
    }

    /// Moves taken, counting the final winning one.
    pub fn hops(&self) -> usize {
        self.steps.hops()
    }
}

/// Written instead of an artifact when a run errors out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub id: String,
    pub start_article: String,
    pub destination_article: String,
    pub trial: u32,
    pub seed: u64,
    /// Full error chain.
    pub error: String,
    pub failed_at: String,
}

impl FailureRecord {
    pub fn new(record: &RunRecord, error: &anyhow::Error, failed_at: DateTime<Utc>) -> Self {
        Self {
            id: record.id().to_string(),
            start_article: record.start.clone(),
            destination_article: record.destination.clone(),
            trial: record.trial,
            seed: record.seed,
            error: format!("{error:#}"),
            failed_at: failed_at.to_rfc3339(),
        }
    }
}

pub fn artifact_path(output_dir: &Path, run_id: &str) -> PathBuf {
    output_dir.join(format!("run_{run_id}.json"))
}

pub fn failure_path(output_dir: &Path, run_id: &str) -> PathBuf {
    output_dir.join(format!("run_{run_id}.failed.json"))
}

pub async fn artifact_exists(output_dir: &Path, run_id: &str) -> Result<bool> {
    let path = artifact_path(output_dir, run_id);
    tokio::fs::try_exists(&path)
        .await
        .with_context(|| format!("stat {}", path.display()))
}

pub async fn write_artifact(output_dir: &Path, run_id: &str, artifact: &RunArtifact) -> Result<()> {
    write_json_atomic(&artifact_path(output_dir, run_id), artifact).await
}

pub async fn read_artifact(path: &Path) -> Result<RunArtifact> {
    read_json(path).await
}

pub async fn write_failure(output_dir: &Path, failure: &FailureRecord) -> Result<()> {
    write_json_atomic(&failure_path(output_dir, &failure.id), failure).await
}

/// Read a run's failure record, if it left one.
pub async fn read_failure(output_dir: &Path, run_id: &str) -> Result<Option<FailureRecord>> {
    let path = failure_path(output_dir, run_id);
    if !tokio::fs::try_exists(&path)
        .await
        .with_context(|| format!("stat {}", path.display()))?
    {
        return Ok(None);
    }
    read_json(&path).await.map(Some)
}

/// Drop a stale failure record once the run has succeeded.
pub async fn clear_failure(output_dir: &Path, run_id: &str) -> Result<()> {
    let path = failure_path(output_dir, run_id);
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

/// Pretty JSON with a trailing newline, written temp-then-rename.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    tokio::fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create directory {}", parent.display()))?;
    let mut contents = serde_json::to_string_pretty(value).context("serialize json")?;
    contents.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, contents)
        .await
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}
