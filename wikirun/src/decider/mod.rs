//! Move selection capability.
//!
//! The game engine only depends on [`Decider`]; the automated and interactive
//! players are interchangeable behind it.

use anyhow::Result;
use async_trait::async_trait;

use crate::core::types::{GameStep, StepMetadata};

pub mod agent;
pub mod human;

/// A chosen link, or `None` when the player could not produce a valid move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub choice: Option<String>,
    pub metadata: StepMetadata,
}

impl Decision {
    pub fn link(link: impl Into<String>, metadata: StepMetadata) -> Self {
        Self {
            choice: Some(link.into()),
            metadata,
        }
    }

    pub fn no_move(metadata: StepMetadata) -> Self {
        Self {
            choice: None,
            metadata,
        }
    }
}

#[async_trait]
pub trait Decider: Send {
    /// Choose the next link given the full step history (last step is the
    /// current article). `Err` is reserved for faults outside the game, such
    /// as an unreachable completion service.
    async fn get_move(&mut self, history: &[GameStep]) -> Result<Decision>;
}
