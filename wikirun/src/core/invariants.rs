//! Structural invariants of a finished game trace.

use crate::core::types::{GameTrace, StepKind};

/// Check structural invariants of a trace:
/// - First step is `start`
/// - Length is at most `max_allowed_steps + 1`
/// - At most one terminal (win/lose) step, and only in last position
/// - Terminal steps carry no links
/// - Only a `lose` step may lack an article
pub fn validate_trace(trace: &GameTrace, max_allowed_steps: u32) -> Vec<String> {
    let mut errors = Vec::new();
    let steps = trace.steps();

    match steps.first() {
        None => {
            errors.push("trace is empty".to_string());
            return errors;
        }
        Some(first) if first.kind != StepKind::Start => {
            errors.push(format!("step 0: expected start, got {}", first.kind.as_str()));
        }
        Some(_) => {}
    }

    let limit = max_allowed_steps as usize + 1;
    if steps.len() > limit {
        errors.push(format!(
            "trace has {} steps, limit is {}",
            steps.len(),
            limit
        ));
    }

    for (index, step) in steps.iter().enumerate() {
        if index > 0 && step.kind == StepKind::Start {
            errors.push(format!("step {index}: start after step 0"));
        }
        if step.kind.is_terminal() {
            if index + 1 != steps.len() {
                errors.push(format!(
                    "step {index}: terminal {} is not last",
                    step.kind.as_str()
                ));
            }
            if !step.links.is_empty() {
                errors.push(format!("step {index}: terminal step carries links"));
            }
        }
        if step.article.is_none() && step.kind != StepKind::Lose {
            errors.push(format!(
                "step {index}: {} step missing article",
                step.kind.as_str()
            ));
        }
    }

    errors
}
