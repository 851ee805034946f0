use wikirun::exit_codes;

use crate::schedule::BatchSummary;

/// How a scheduler invocation ended, as far as the caller is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every run has an artifact; the report can be built.
    Complete,
    /// Cancelled before all runs were admitted or finished.
    Interrupted,
    /// At least one run errored and left a failure record.
    FailedRuns,
}

impl BatchOutcome {
    pub fn exit_code(self) -> i32 {
        match self {
            BatchOutcome::Complete => exit_codes::OK,
            BatchOutcome::Interrupted => exit_codes::INTERRUPTED,
            BatchOutcome::FailedRuns => exit_codes::FAILED_RUNS,
        }
    }
}

pub fn classify_batch(summary: &BatchSummary) -> BatchOutcome {
    if summary.cancelled {
        BatchOutcome::Interrupted
    } else if summary.failed > 0 {
        BatchOutcome::FailedRuns
    } else {
        BatchOutcome::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_when_nothing_failed() {
        let summary = BatchSummary {
            completed: 3,
            skipped: 2,
            ..BatchSummary::default()
        };
        assert_eq!(classify_batch(&summary), BatchOutcome::Complete);
        assert_eq!(BatchOutcome::Complete.exit_code(), 0);
    }

    #[test]
    fn failures_block_the_report() {
        let summary = BatchSummary {
            completed: 3,
            failed: 1,
            ..BatchSummary::default()
        };
        assert_eq!(classify_batch(&summary), BatchOutcome::FailedRuns);
        assert_eq!(BatchOutcome::FailedRuns.exit_code(), exit_codes::FAILED_RUNS);
    }

    #[test]
    fn cancellation_wins_over_failures() {
        let summary = BatchSummary {
            failed: 2,
            not_started: 5,
            cancelled: true,
            ..BatchSummary::default()
        };
        assert_eq!(classify_batch(&summary), BatchOutcome::Interrupted);
        assert_eq!(BatchOutcome::Interrupted.exit_code(), exit_codes::INTERRUPTED);
    }
}
