use crate::errors::{AgentError, AgentResult};
use crate::lifecycle::state::{Action, ActionStatus};

/// Caps how many explicit retries a single action may consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Only a `Failed` action with budget left may go back to `Pending`.
    pub fn check(&self, action: &Action) -> AgentResult<()> {
        if action.status != ActionStatus::Failed {
            return Err(AgentError::InvalidTransition(format!(
                "action {} is {}; only failed actions can be retried",
                action.id, action.status
            )));
        }
        if action.retry_count >= self.max_retries {
            return Err(AgentError::InvalidTransition(format!(
                "action {} has used {} of {} retries",
                action.id, action.retry_count, self.max_retries
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state::{ActionKind, ActionTemplate};
    use uuid::Uuid;

    fn failed(retries: u32) -> Action {
        let mut action = ActionTemplate {
            action_type: ActionKind::Click,
            target: None,
            text: None,
            parameters: None,
        }
        .bind(Uuid::new_v4(), 1);
        action.status = ActionStatus::Failed;
        action.retry_count = retries;
        action
    }

    #[test]
    fn budget_is_enforced() {
        let policy = RetryPolicy::new(2);
        assert!(policy.check(&failed(0)).is_ok());
        assert!(policy.check(&failed(1)).is_ok());
        assert!(matches!(policy.check(&failed(2)), Err(AgentError::InvalidTransition(_))));
    }

    #[test]
    fn zero_disables_retry() {
        assert!(RetryPolicy::new(0).check(&failed(0)).is_err());
    }

    #[test]
    fn pending_and_success_are_not_retryable() {
        let policy = RetryPolicy::new(3);
        for status in [ActionStatus::Pending, ActionStatus::Success] {
            let mut action = failed(0);
            action.status = status;
            assert!(matches!(policy.check(&action), Err(AgentError::InvalidTransition(_))));
        }
    }
}
