//! Stable exit codes for the `wikirun` and `proctor` binaries.

/// Command succeeded (or the game was won).
pub const OK: i32 = 0;
/// Invalid configuration, missing inputs, or an unexpected error.
pub const INVALID: i32 = 1;
/// `wikirun play` finished with a loss.
pub const LOST: i32 = 2;
/// `proctor run` was cancelled before every run finished.
pub const INTERRUPTED: i32 = 3;
/// `proctor run` finished but some runs errored.
pub const FAILED_RUNS: i32 = 4;
