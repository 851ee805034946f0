//! Batch configuration.
//!
//! Settings come from an optional TOML file, then CLI flags override
//! individual fields. Everything is validated before any run is scheduled.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use wikirun::decider::agent::AgentSettings;

/// Everything a batch needs besides the corpus and the model endpoint itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProctorConfig {
    /// Prefix of every artifact name (`[A-Za-z0-9._-]`).
    pub proctor_id: String,
    /// JSON array of article titles; every ordered pair is played.
    pub article_list: PathBuf,
    pub db_path: PathBuf,
    pub output_dir: PathBuf,
    pub num_trials: u32,
    /// Runs allowed in flight at once.
    pub num_workers: usize,
    pub max_steps: u32,
    /// Seed of trial 0; trial `n` uses `seed + n`.
    pub seed: u64,
    pub agent: AgentSettings,
}

impl Default for ProctorConfig {
    fn default() -> Self {
        Self {
            proctor_id: "proctor_1".to_string(),
            article_list: PathBuf::from("supernodes.json"),
            db_path: PathBuf::from("wikihop.db"),
            output_dir: PathBuf::from("./proctor_tmp"),
            num_trials: 1,
            num_workers: 20,
            max_steps: 20,
            seed: 42,
            agent: AgentSettings::default(),
        }
    }
}

impl ProctorConfig {
    pub fn validate(&self) -> Result<()> {
        validate_proctor_id(&self.proctor_id)?;
        if self.num_trials == 0 {
            bail!("num_trials must be > 0");
        }
        if self.num_workers == 0 {
            bail!("num_workers must be > 0");
        }
        if self.max_steps == 0 {
            bail!("max_steps must be > 0");
        }
        self.agent.validate().context("agent settings")?;
        Ok(())
    }
}

/// Load config from a TOML file, or start from defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<ProctorConfig> {
    let Some(path) = path else {
        return Ok(ProctorConfig::default());
    };
    if !path.exists() {
        bail!("config file not found at {}", path.display());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Load and validate the article pool.
pub fn load_article_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        bail!("article list not found at {}", path.display());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let articles: Vec<String> = serde_json::from_str(&contents)
        .with_context(|| format!("parse article list {}", path.display()))?;
    validate_pool(&articles).with_context(|| format!("article list {}", path.display()))?;
    Ok(articles)
}

pub fn validate_pool(articles: &[String]) -> Result<()> {
    if articles.len() < 2 {
        bail!(
            "need at least 2 articles to form a pair (got {})",
            articles.len()
        );
    }
    let mut seen = HashSet::new();
    for title in articles {
        if title.trim().is_empty() {
            bail!("article titles must be non-empty");
        }
        if !seen.insert(title.as_str()) {
            bail!("duplicate article '{title}'");
        }
    }
    Ok(())
}

/// Proctor ids end up in file names.
pub fn validate_proctor_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(anyhow!("proctor_id must not be empty"));
    }
    if id
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'))
    {
        return Err(anyhow!(
            "proctor_id must be [A-Za-z0-9._-] only (got '{id}')"
        ));
    }
    Ok(())
}
