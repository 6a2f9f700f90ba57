// Session and action lifecycle: every state change goes through here.
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::LifecycleConfig;
use crate::errors::{AgentError, AgentResult};
use crate::executor::ActionExecutor;
use crate::lifecycle::locks::EntityLocks;
use crate::lifecycle::retry::RetryPolicy;
use crate::lifecycle::route::{PlannedStep, RouteRecorder};
use crate::lifecycle::state::{
    Action, ActionStatus, ActionTemplate, Route, Session, SessionStatus, User,
};
use crate::store::Store;

pub const REJECTED_MESSAGE: &str = "action not confirmed: rejected by caller";

pub struct Lifecycle {
    store: Arc<dyn Store>,
    executor: Arc<ActionExecutor>,
    retry: RetryPolicy,
    strict_cancel: bool,
    routes: RouteRecorder,
    session_locks: EntityLocks,
    action_locks: EntityLocks,
    user_locks: EntityLocks,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn Store>, executor: Arc<ActionExecutor>, config: &LifecycleConfig) -> Self {
        Self {
            routes: RouteRecorder::new(Arc::clone(&store)),
            store,
            executor,
            retry: RetryPolicy::new(config.max_retries),
            strict_cancel: config.strict_cancel,
            session_locks: EntityLocks::new(),
            action_locks: EntityLocks::new(),
            user_locks: EntityLocks::new(),
        }
    }

    // ---- Users ----

    /// Creates the user on first call, afterwards only flips consent.
    pub async fn record_consent(&self, user_id: Uuid, consent_given: bool) -> AgentResult<User> {
        let _guard = self.user_locks.lock(user_id).await;
        match self.store.get_user(user_id).await? {
            Some(mut user) => {
                user.consent_given = consent_given;
                user.consent_timestamp = Some(Utc::now());
                self.store.update_user(&user).await?;
                tracing::info!(user_id = %user_id, consent_given, "consent updated");
                Ok(user)
            }
            None => {
                let user = User::with_consent(user_id, consent_given);
                self.store.create_user(&user).await?;
                tracing::info!(user_id = %user_id, consent_given, "user created");
                Ok(user)
            }
        }
    }

    pub async fn get_user(&self, user_id: Uuid) -> AgentResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AgentError::not_found("user", user_id))
    }

    // ---- Sessions ----

    pub async fn create_session(
        &self,
        user_id: Uuid,
        app_name: &str,
        task_description: &str,
    ) -> AgentResult<Session> {
        let session = Session::new(user_id, app_name, task_description);
        self.store.create_session(&session).await?;
        tracing::info!(
            session_id = %session.id,
            user_id = %user_id,
            app = %session.app_name,
            "session started"
        );
        Ok(session)
    }

    pub async fn get_session(&self, session_id: Uuid) -> AgentResult<Session> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| AgentError::not_found("session", session_id))
    }

    pub async fn list_sessions(&self, user_id: Option<Uuid>, limit: usize) -> AgentResult<Vec<Session>> {
        self.store.list_sessions(user_id, limit).await
    }

    /// Drops the session, its actions and its route in one step.
    pub async fn delete_session(&self, session_id: Uuid) -> AgentResult<()> {
        let _guard = self.session_locks.lock(session_id).await;
        if !self.store.delete_session(session_id).await? {
            return Err(AgentError::not_found("session", session_id));
        }
        tracing::info!(session_id = %session_id, "session deleted");
        Ok(())
    }

    pub async fn pause(&self, session_id: Uuid) -> AgentResult<Session> {
        self.transition(session_id, SessionStatus::Paused).await
    }

    pub async fn resume(&self, session_id: Uuid) -> AgentResult<Session> {
        self.transition(session_id, SessionStatus::Running).await
    }

    pub async fn complete(&self, session_id: Uuid) -> AgentResult<Session> {
        self.transition(session_id, SessionStatus::Completed).await
    }

    pub async fn fail(&self, session_id: Uuid) -> AgentResult<Session> {
        self.transition(session_id, SessionStatus::Failed).await
    }

    /// Cancelling an already-cancelled session refreshes its end time unless
    /// `strict_cancel` is configured.
    pub async fn cancel(&self, session_id: Uuid) -> AgentResult<Session> {
        let _guard = self.session_locks.lock(session_id).await;
        let mut session = self.get_session(session_id).await?;
        if session.status == SessionStatus::Cancelled && !self.strict_cancel {
            session.ended_at = Some(Utc::now());
        } else {
            session.transition(SessionStatus::Cancelled)?;
        }
        self.store.update_session(&session).await?;
        tracing::info!(session_id = %session_id, "session cancelled");
        Ok(session)
    }

    async fn transition(&self, session_id: Uuid, next: SessionStatus) -> AgentResult<Session> {
        let _guard = self.session_locks.lock(session_id).await;
        let mut session = self.get_session(session_id).await?;
        let from = session.status;
        session.transition(next)?;
        self.store.update_session(&session).await?;
        tracing::info!(session_id = %session_id, from = %from, to = %next, "session transition");
        Ok(session)
    }

    // ---- Actions ----

    /// Binds a recommendation (or caller-built template) to a live session.
    /// Steps must strictly increase within a session.
    pub async fn create_action(
        &self,
        session_id: Uuid,
        step_number: u32,
        template: ActionTemplate,
    ) -> AgentResult<Action> {
        if let Some(target) = &template.target {
            target.validate()?;
        }

        let _guard = self.session_locks.lock(session_id).await;
        let mut session = self.get_session(session_id).await?;
        if session.status.is_terminal() {
            return Err(AgentError::InvalidTransition(format!(
                "session {session_id} is {} and accepts no new actions",
                session.status
            )));
        }
        if step_number <= session.current_step {
            return Err(AgentError::Validation(format!(
                "step {step_number} must be greater than the session's last step {}",
                session.current_step
            )));
        }

        let action = template.bind(session_id, step_number);
        self.store.create_action(&action).await?;
        session.current_step = step_number;
        self.store.update_session(&session).await?;
        tracing::info!(
            session_id = %session_id,
            action_id = %action.id,
            step = step_number,
            kind = %action.action_type,
            "action created"
        );
        Ok(action)
    }

    pub async fn get_action(&self, action_id: Uuid) -> AgentResult<Action> {
        self.store
            .get_action(action_id)
            .await?
            .ok_or_else(|| AgentError::not_found("action", action_id))
    }

    pub async fn list_actions(&self, session_id: Uuid, limit: usize) -> AgentResult<Vec<Action>> {
        self.get_session(session_id).await?;
        self.store.list_actions(session_id, limit).await
    }

    /// Rejection marks the action failed without touching the input device;
    /// confirmation executes it and adopts the executor's outcome.
    pub async fn confirm_or_reject(&self, action_id: Uuid, confirmed: bool) -> AgentResult<Action> {
        let _guard = self.action_locks.lock(action_id).await;
        let session_id = self.get_action(action_id).await?.session_id;
        let _session_guard = self.session_locks.lock(session_id).await;
        // Re-read under the session lock so a concurrent delete wins before any input.
        let mut action = self.get_action(action_id).await?;
        if action.status != ActionStatus::Pending {
            return Err(AgentError::InvalidTransition(format!(
                "action {action_id} is {}; only pending actions can be confirmed",
                action.status
            )));
        }

        let action = if confirmed {
            self.executor.execute(&action).await
        } else {
            action.status = ActionStatus::Failed;
            action.error_message = Some(REJECTED_MESSAGE.to_string());
            tracing::info!(action_id = %action_id, "action rejected by caller");
            action
        };
        self.store.update_action(&action).await?;
        self.record_route(&action).await;
        Ok(action)
    }

    /// `Failed -> Pending -> executor`, within the configured retry budget.
    pub async fn retry(&self, action_id: Uuid) -> AgentResult<Action> {
        let _guard = self.action_locks.lock(action_id).await;
        let session_id = self.get_action(action_id).await?.session_id;
        let _session_guard = self.session_locks.lock(session_id).await;
        let mut action = self.get_action(action_id).await?;
        self.retry.check(&action)?;

        action.status = ActionStatus::Pending;
        action.error_message = None;
        action.retry_count += 1;
        self.store.update_action(&action).await?;
        tracing::info!(
            action_id = %action_id,
            attempt = action.retry_count,
            max = self.retry.max_retries(),
            "retrying action"
        );

        let action = self.executor.execute(&action).await;
        self.store.update_action(&action).await?;
        self.record_route(&action).await;
        Ok(action)
    }

    // ---- Routes ----

    pub async fn get_route(&self, session_id: Uuid) -> AgentResult<Route> {
        self.store
            .get_route_by_session(session_id)
            .await?
            .ok_or_else(|| AgentError::not_found("route", session_id))
    }

    pub async fn plan_route(&self, session_id: Uuid, steps: Vec<PlannedStep>) -> AgentResult<Route> {
        let _guard = self.session_locks.lock(session_id).await;
        self.get_session(session_id).await?;
        self.routes.set_plan(session_id, steps).await
    }

    /// The action already ran; a broken audit trail must not undo that.
    /// Callers hold the session lock.
    async fn record_route(&self, action: &Action) {
        if let Err(e) = self.routes.record_outcome(action).await {
            tracing::warn!(
                session_id = %action.session_id,
                action_id = %action.id,
                error = %e,
                "failed to record route step"
            );
        }
    }
}
