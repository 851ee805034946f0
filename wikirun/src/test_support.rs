//! Test-only collaborators: scripted completion service, fixed-choice player,
//! and in-memory or temporary SQLite corpora.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, params};
use tempfile::TempDir;

use crate::core::conversation::ChatMessage;
use crate::core::types::{GameStep, StepMetadata};
use crate::decider::{Decider, Decision};
use crate::io::completion::{CompletionClient, CompletionError, CompletionRequest};
use crate::io::link_store::MemoryLinkStore;

/// One scripted completion outcome.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Fail with the given HTTP status.
    Fail(u16),
}

impl ScriptedReply {
    pub fn text(text: &str) -> Self {
        ScriptedReply::Text(text.to_string())
    }

    pub fn fail(status: u16) -> Self {
        ScriptedReply::Fail(status)
    }
}

/// Completion client that replays a script, then an optional fixed fallback.
///
/// Once both are exhausted every call fails with a non-retryable status.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<ScriptedReply>>,
    fallback: Option<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    seeds: Mutex<Vec<Option<u64>>>,
}

impl ScriptedClient {
    pub fn new(script: Vec<ScriptedReply>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Answer every call with `text`.
    pub fn always(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Conversations as sent, one per call.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().expect("requests").clone()
    }

    pub fn seeds(&self) -> Vec<Option<u64>> {
        self.seeds.lock().expect("seeds").clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests")
            .push(request.messages.to_vec());
        self.seeds.lock().expect("seeds").push(request.seed);

        let next = self.script.lock().expect("script").pop_front();
        match next {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Fail(status)) => Err(CompletionError::Status {
                status,
                body: "scripted failure".to_string(),
            }),
            None => self.fallback.clone().ok_or(CompletionError::Status {
                status: 418,
                body: "script exhausted".to_string(),
            }),
        }
    }
}

/// Player that always picks the link at a fixed 1-based index.
#[derive(Debug)]
pub struct FixedChoiceDecider {
    choice: usize,
    calls: usize,
}

impl FixedChoiceDecider {
    pub fn new(choice: usize) -> Self {
        Self { choice, calls: 0 }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }
}

#[async_trait]
impl Decider for FixedChoiceDecider {
    async fn get_move(&mut self, history: &[GameStep]) -> Result<Decision> {
        self.calls += 1;
        let current = history.last().context("empty history")?;
        Ok(match current.links.get(self.choice - 1) {
            Some(link) => Decision::link(link.clone(), StepMetadata::default()),
            None => Decision::no_move(StepMetadata::message("choice out of range")),
        })
    }
}

/// Build an in-memory corpus from `(title, links)` pairs.
pub fn corpus(entries: &[(&str, &[&str])]) -> MemoryLinkStore {
    MemoryLinkStore::from_links(
        entries
            .iter()
            .map(|(title, links)| (title.to_string(), links.iter().map(|l| l.to_string()))),
    )
}

/// SQLite corpus in a temporary directory, removed on drop.
pub struct TestCorpus {
    _dir: TempDir,
    path: PathBuf,
}

impl TestCorpus {
    pub fn new(entries: &[(&str, &[&str])]) -> Result<Self> {
        let rows = entries
            .iter()
            .map(|(title, links)| Ok((title.to_string(), serde_json::to_string(links)?)))
            .collect::<Result<Vec<_>>>()?;
        Self::with_raw_rows(&rows)
    }

    /// Rows are `(title, links_json)` written verbatim.
    pub fn with_raw_rows(rows: &[(String, String)]) -> Result<Self> {
        let dir = tempfile::tempdir().context("create tempdir")?;
        let path = dir.path().join("corpus.db");
        let conn = Connection::open(&path).context("create corpus db")?;
        conn.execute(
            "CREATE TABLE core_articles (title TEXT PRIMARY KEY, links_json TEXT NOT NULL)",
            [],
        )
        .context("create core_articles")?;
        for (title, links_json) in rows {
            conn.execute(
                "INSERT INTO core_articles (title, links_json) VALUES (?1, ?2)",
                params![title, links_json],
            )
            .with_context(|| format!("insert {title:?}"))?;
        }
        Ok(Self { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
