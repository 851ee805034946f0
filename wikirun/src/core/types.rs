//! Shared deterministic types for game traces.
//!
//! These types define the stable on-disk contract for traces. They must not
//! depend on external state or I/O and must serialize identically across runs.

use serde::{Deserialize, Serialize};

use crate::core::conversation::ChatMessage;

/// Kind of a recorded game step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Start,
    Move,
    Win,
    Lose,
}

impl StepKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, StepKind::Win | StepKind::Lose)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Start => "start",
            StepKind::Move => "move",
            StepKind::Win => "win",
            StepKind::Lose => "lose",
        }
    }
}

/// Decision bookkeeping attached to a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Completion attempts spent on this decision (1-based).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tries: Option<u32>,
    /// Wall-clock decision latency. Only recorded when the engine asks for it,
    /// since it breaks byte-for-byte reproducibility.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conversation: Vec<ChatMessage>,
}

impl StepMetadata {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

/// One entry of a game trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStep {
    #[serde(rename = "type")]
    pub kind: StepKind,
    /// Article reached. `None` only for a loss caused by no valid move.
    pub article: Option<String>,
    /// Links visible from `article`. Always empty for win/lose steps.
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub metadata: StepMetadata,
}

/// Terminal classification of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Won,
    LostInvalidMove,
    LostDeadEnd,
    LostStepLimit,
}

impl Outcome {
    pub fn is_win(self) -> bool {
        self == Outcome::Won
    }

    /// Coarse `win`/`lose` tag stored next to the trace.
    pub fn result_tag(self) -> &'static str {
        if self.is_win() { "win" } else { "lose" }
    }
}

/// Ordered, append-only record of one game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameTrace {
    steps: Vec<GameStep>,
}

impl GameTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: GameStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[GameStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&GameStep> {
        self.steps.last()
    }

    /// Articles visited so far, in order. The sentinel lose step is skipped.
    pub fn path(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter_map(|step| step.article.as_deref())
            .collect()
    }

    /// Classify the trace. A trace that ends without a win/lose step ran out
    /// of moves and counts as a step-limit loss.
    pub fn outcome(&self) -> Outcome {
        match self.steps.last() {
            Some(GameStep {
                kind: StepKind::Win,
                ..
            }) => Outcome::Won,
            Some(GameStep {
                kind: StepKind::Lose,
                article: None,
                ..
            }) => Outcome::LostInvalidMove,
            Some(GameStep {
                kind: StepKind::Lose,
                ..
            }) => Outcome::LostDeadEnd,
            _ => Outcome::LostStepLimit,
        }
    }

    /// Number of moves made (steps excluding the start step).
    pub fn hops(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    /// Structural problems with this trace; empty when well-formed.
    pub fn validate(&self, max_allowed_steps: u32) -> Vec<String> {
        crate::core::invariants::validate_trace(self, max_allowed_steps)
    }
}

impl From<Vec<GameStep>> for GameTrace {
    fn from(steps: Vec<GameStep>) -> Self {
        Self { steps }
    }
}
