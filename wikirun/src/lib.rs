//! Link-navigation game played by a language model.
//!
//! A game starts on one article and the player follows links until it reaches
//! the target article. The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (answer extraction, prompts, trace
//!   types and invariants). No I/O, fully testable in isolation.
//! - **[`io`]**: Collaborators with side effects (the link corpus and the
//!   completion service), behind traits so tests can script them.
//!
//! [`decider`] implements the players and [`game`] drives one game.

pub mod core;
pub mod decider;
pub mod exit_codes;
pub mod game;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
