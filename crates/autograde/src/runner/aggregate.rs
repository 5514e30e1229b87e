//! Folding task outcomes into a problem result

use crate::types::{BuildVerdict, ProblemResult, TaskOutcome};

/// Combine the outcomes of one problem's tasks
///
/// A problem that was not built, or any task whose artifact could not be
/// launched, yields score 0 with the single reason `CE` regardless of the
/// other outcomes. Otherwise passed tasks add their points and every other
/// task contributes one reason token, in task order.
pub fn aggregate(build: &BuildVerdict, outcomes: &[TaskOutcome]) -> ProblemResult {
    if !matches!(build, BuildVerdict::Built(_)) {
        return ProblemResult::compile_error();
    }
    if outcomes.iter().any(|task| task.outcome.is_build_failure()) {
        return ProblemResult::compile_error();
    }

    let mut result = ProblemResult::default();
    for task in outcomes {
        match task.outcome.reason_token(&task.task) {
            None => result.score += task.points,
            Some(token) => result.reasons.push(token),
        }
    }
    result
}
