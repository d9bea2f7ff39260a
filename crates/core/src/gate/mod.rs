//! Quality gate: decides whether a joined run commits or compensates.

use chrono::Utc;

use crate::run::{GateDecision, GateVerdict, JoinResult, TaskState};

/// Per-run gate policy, built from the run's pinned configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatePolicy {
    /// Minimum `succeeded / total`. Reaching it exactly passes.
    pub min_success_ratio: f64,
}

/// All groups must succeed.
impl Default for GatePolicy {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl GatePolicy {
    pub fn new(min_success_ratio: f64) -> Self {
        Self { min_success_ratio }
    }

    /// Commits only if the ratio meets the threshold and every required group succeeded.
    ///
    /// Required flags are read from the joined tasks themselves.
    pub fn evaluate(&self, join: &JoinResult) -> GateDecision {
        let score = join.success_ratio();
        let missing_required: Vec<String> = join
            .tasks
            .iter()
            .filter(|t| t.required && t.state != TaskState::Succeeded)
            .map(|t| t.group_id.clone())
            .collect();

        let verdict = if score >= self.min_success_ratio && missing_required.is_empty() {
            GateVerdict::Commit
        } else {
            GateVerdict::Compensate
        };

        GateDecision {
            verdict,
            score,
            threshold: self.min_success_ratio,
            missing_required,
            decided_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::GroupDescriptor;
    use crate::run::GroupTask;
    use serde_json::Value;

    fn task(id: &str, required: bool, state: TaskState) -> GroupTask {
        let descriptor = GroupDescriptor::new(id).required(required);
        let mut task = GroupTask::new("run-1", &descriptor, Value::Null);
        task.mark_running();
        match state {
            TaskState::Succeeded => {
                task.succeed(Value::Null);
            }
            TaskState::Failed => {
                task.fail("boom");
            }
            TaskState::TimedOut => {
                task.time_out("late");
            }
            _ => {}
        }
        task
    }

    fn join(tasks: Vec<GroupTask>) -> JoinResult {
        JoinResult::from_tasks(tasks, false, false)
    }

    #[test]
    fn test_default_policy_requires_every_group() {
        let policy = GatePolicy::default();
        let all_ok = join((0..7).map(|i| task(&format!("g{}", i), false, TaskState::Succeeded)).collect());
        assert_eq!(policy.evaluate(&all_ok).verdict, GateVerdict::Commit);

        let mut tasks: Vec<_> = (0..6).map(|i| task(&format!("g{}", i), false, TaskState::Succeeded)).collect();
        tasks.push(task("g6", false, TaskState::Failed));
        let decision = policy.evaluate(&join(tasks));
        assert_eq!(decision.verdict, GateVerdict::Compensate);
        assert!((decision.score - 6.0 / 7.0).abs() < f64::EPSILON);
        assert_eq!(decision.threshold, 1.0);
    }

    #[test]
    fn test_ratio_exactly_at_threshold_commits() {
        let policy = GatePolicy::new(0.5);
        let decision = policy.evaluate(&join(vec![
            task("a", false, TaskState::Succeeded),
            task("b", false, TaskState::Failed),
        ]));
        assert_eq!(decision.score, 0.5);
        assert_eq!(decision.verdict, GateVerdict::Commit);
    }

    #[test]
    fn test_timeouts_count_as_failures() {
        let policy = GatePolicy::new(0.75);
        let decision = policy.evaluate(&join(vec![
            task("a", false, TaskState::Succeeded),
            task("b", false, TaskState::Succeeded),
            task("c", false, TaskState::TimedOut),
        ]));
        assert_eq!(decision.verdict, GateVerdict::Compensate);
    }

    #[test]
    fn test_required_group_failure_blocks_commit() {
        let policy = GatePolicy::new(0.5);
        let decision = policy.evaluate(&join(vec![
            task("compliance", true, TaskState::TimedOut),
            task("b", false, TaskState::Succeeded),
            task("c", false, TaskState::Succeeded),
        ]));
        assert!(decision.score >= policy.min_success_ratio);
        assert_eq!(decision.verdict, GateVerdict::Compensate);
        assert_eq!(decision.missing_required, vec!["compliance".to_string()]);
    }

    #[test]
    fn test_empty_join_compensates_unless_threshold_zero() {
        let empty = join(vec![]);
        assert_eq!(GatePolicy::default().evaluate(&empty).verdict, GateVerdict::Compensate);
        assert_eq!(GatePolicy::new(0.0).evaluate(&empty).verdict, GateVerdict::Commit);
    }
}
