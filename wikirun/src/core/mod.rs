//! Deterministic, pure logic shared by the game engine and deciders.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod conversation;
pub mod extract;
pub mod invariants;
pub mod prompt;
pub mod types;
