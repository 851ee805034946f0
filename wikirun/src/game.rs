//! Single-game state machine.
//!
//! A game starts at one article and ends when the player reaches the target,
//! cannot produce a valid move, lands on an article without links, or runs out
//! of moves. Running out of moves appends no terminal step; see
//! [`GameTrace::outcome`].

use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::core::types::{GameStep, GameTrace, StepKind, StepMetadata};
use crate::decider::Decider;
use crate::io::link_store::LinkStore;

/// Limits for one game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameConfig {
    /// Maximum number of moves before the game stops.
    pub max_allowed_steps: u32,
    /// Record per-move decision latency in step metadata.
    pub record_latency: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_allowed_steps: 10,
            record_latency: false,
        }
    }
}

/// Plays one game from `start` towards `target`.
pub struct GameEngine<'a> {
    start: String,
    target: String,
    store: &'a dyn LinkStore,
    config: GameConfig,
    trace: GameTrace,
}

impl<'a> GameEngine<'a> {
    pub fn new(
        start: impl Into<String>,
        target: impl Into<String>,
        store: &'a dyn LinkStore,
        config: GameConfig,
    ) -> Self {
        Self {
            start: start.into(),
            target: target.into(),
            store,
            config,
            trace: GameTrace::new(),
        }
    }

    /// Play the game to completion and return its trace.
    ///
    /// Errors only on faults outside the game (completion service, corpus I/O);
    /// every in-game failure is recorded as a loss in the trace.
    #[instrument(skip_all, fields(start = %self.start, target = %self.target))]
    pub async fn run<D: Decider + ?Sized>(mut self, decider: &mut D) -> Result<GameTrace> {
        let start_links = self.links_of(&self.start).await?;
        self.trace.push(GameStep {
            kind: StepKind::Start,
            article: Some(self.start.clone()),
            links: start_links,
            metadata: StepMetadata::message("Game started"),
        });

        for step in 1..=self.config.max_allowed_steps {
            let began = Instant::now();
            let decision = decider
                .get_move(self.trace.steps())
                .await
                .with_context(|| format!("choose move {step}"))?;
            let mut metadata = decision.metadata;
            if self.config.record_latency {
                metadata.latency_ms = Some(began.elapsed().as_millis() as u64);
            }

            let Some(article) = decision.choice else {
                debug!(step, "no valid move");
                return Ok(self.finish(StepKind::Lose, None, metadata));
            };
            debug!(step, article = %article, "moved");

            if article == self.target {
                return Ok(self.finish(StepKind::Win, Some(article), metadata));
            }

            let links = self.links_of(&article).await?;
            if links.is_empty() {
                debug!(step, article = %article, "dead end");
                return Ok(self.finish(StepKind::Lose, Some(article), metadata));
            }

            self.trace.push(GameStep {
                kind: StepKind::Move,
                article: Some(article),
                links,
                metadata,
            });
        }

        debug!(
            max_allowed_steps = self.config.max_allowed_steps,
            "step limit reached"
        );
        Ok(self.trace)
    }

    fn finish(
        mut self,
        kind: StepKind,
        article: Option<String>,
        metadata: StepMetadata,
    ) -> GameTrace {
        self.trace.push(GameStep {
            kind,
            article,
            links: Vec::new(),
            metadata,
        });
        self.trace
    }

    /// Links of `title`; a title missing from the corpus has none.
    async fn links_of(&self, title: &str) -> Result<Vec<String>> {
        let article = self
            .store
            .lookup(title)
            .await
            .with_context(|| format!("look up {title:?}"))?;
        Ok(article.map(|article| article.links.clone()).unwrap_or_default())
    }
}
