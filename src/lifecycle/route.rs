use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AgentResult;
use crate::lifecycle::state::{Action, ActionKind, Route, RouteStep};
use crate::store::Store;

/// A step the caller intends to take, before anything ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    pub step_number: u32,
    pub action_type: ActionKind,
    #[serde(default)]
    pub element: Option<String>,
}

impl From<PlannedStep> for RouteStep {
    fn from(step: PlannedStep) -> Self {
        Self {
            step_number: step.step_number,
            action_type: step.action_type,
            element: step.element,
            status: None,
            execution_time_ms: None,
            recorded_at: Utc::now(),
        }
    }
}

/// Keeps each session's audit trail. Callers serialize per session.
pub struct RouteRecorder {
    store: Arc<dyn Store>,
}

impl RouteRecorder {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Appends the action's outcome to `actual_route`.
    pub async fn record_outcome(&self, action: &Action) -> AgentResult<Route> {
        self.modify(action.session_id, |route| {
            route.actual_route.push(RouteStep::from(action));
        })
        .await
    }

    /// Replaces `planned_route`; the actual trail is left alone.
    pub async fn set_plan(&self, session_id: Uuid, steps: Vec<PlannedStep>) -> AgentResult<Route> {
        self.modify(session_id, |route| {
            route.planned_route = steps.into_iter().map(RouteStep::from).collect();
        })
        .await
    }

    async fn modify<F>(&self, session_id: Uuid, change: F) -> AgentResult<Route>
    where
        F: FnOnce(&mut Route) + Send,
    {
        match self.store.get_route_by_session(session_id).await? {
            Some(mut route) => {
                change(&mut route);
                self.store.update_route(&route).await?;
                Ok(route)
            }
            None => {
                let mut route = Route::new(session_id);
                change(&mut route);
                self.store.create_route(&route).await?;
                tracing::debug!(session_id = %session_id, route_id = %route.id, "route created");
                Ok(route)
            }
        }
    }
}
