use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AgentError, AgentResult};

/// Lifecycle states of an automation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    /// Legal edges: Running → {Paused, Completed, Failed, Cancelled}, Paused → {Running, Cancelled}.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Running, Paused | Completed | Failed | Cancelled) | (Paused, Running | Cancelled)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = AgentError;

    fn from_str(value: &str) -> AgentResult<Self> {
        match value {
            "running" => Ok(SessionStatus::Running),
            "paused" => Ok(SessionStatus::Paused),
            "completed" => Ok(SessionStatus::Completed),
            "failed" => Ok(SessionStatus::Failed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(AgentError::Store(format!("unknown session status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Success,
    Failed,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Success => "success",
            ActionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = AgentError;

    fn from_str(value: &str) -> AgentResult<Self> {
        match value {
            "pending" => Ok(ActionStatus::Pending),
            "success" => Ok(ActionStatus::Success),
            "failed" => Ok(ActionStatus::Failed),
            other => Err(AgentError::Store(format!("unknown action status '{other}'"))),
        }
    }
}

/// The six primitive UI operations an action can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Click,
    DoubleClick,
    RightClick,
    Type,
    Scroll,
    Wait,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::Click,
        ActionKind::DoubleClick,
        ActionKind::RightClick,
        ActionKind::Type,
        ActionKind::Scroll,
        ActionKind::Wait,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::RightClick => "right_click",
            ActionKind::Type => "type",
            ActionKind::Scroll => "scroll",
            ActionKind::Wait => "wait",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the canonical snake_case names, case-insensitively, with `-` as an
/// alternative separator ("double-click").
impl FromStr for ActionKind {
    type Err = AgentError;

    fn from_str(value: &str) -> AgentResult<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        ActionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| AgentError::UnknownActionKind(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: i32,
    pub y: i32,
}

impl Coordinates {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A UI element the model identified, in screenshot pixel space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTarget {
    pub element: String,
    pub coordinates: Option<Coordinates>,
    /// Always within [0, 1].
    pub confidence: f64,
}

impl ActionTarget {
    pub fn validate(&self) -> AgentResult<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(AgentError::Validation(format!(
                "target confidence {} is outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Scalar values allowed in an action's parameter bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

pub type Parameters = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub session_id: Uuid,
    pub step_number: u32,
    pub action_type: ActionKind,
    pub target: Option<ActionTarget>,
    /// Required for `type`.
    pub text: Option<String>,
    /// `amount` for `scroll`, `duration` (seconds) for `wait`. `None` and an
    /// empty map are distinct and both survive storage.
    pub parameters: Option<Parameters>,
    pub status: ActionStatus,
    pub execution_time_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub error_message: Option<String>,
    /// Number of explicit retries already consumed.
    #[serde(default)]
    pub retry_count: u32,
}

impl Action {
    pub fn coordinates(&self) -> Option<Coordinates> {
        self.target.as_ref().and_then(|t| t.coordinates)
    }

    pub fn number_param(&self, key: &str) -> Option<f64> {
        self.parameters
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(ParamValue::as_f64)
    }
}

/// An action the model recommended, not yet bound to a session or step.
/// It cannot be persisted or executed until [`ActionTemplate::bind`] is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub action_type: ActionKind,
    pub target: Option<ActionTarget>,
    pub text: Option<String>,
    #[serde(default)]
    pub parameters: Option<Parameters>,
}

impl ActionTemplate {
    pub fn bind(self, session_id: Uuid, step_number: u32) -> Action {
        Action {
            id: Uuid::new_v4(),
            session_id,
            step_number,
            action_type: self.action_type,
            target: self.target,
            text: self.text,
            parameters: self.parameters,
            status: ActionStatus::Pending,
            execution_time_ms: None,
            timestamp: Utc::now(),
            error_message: None,
            retry_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub app_name: String,
    pub task_description: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub current_step: u32,
}

impl Session {
    pub fn new(user_id: Uuid, app_name: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            app_name: app_name.into(),
            task_description: task.into(),
            status: SessionStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
            current_step: 0,
        }
    }

    /// Moves to `next` if the edge is legal; touches nothing else.
    pub fn transition(&mut self, next: SessionStatus) -> AgentResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AgentError::InvalidTransition(format!(
                "session {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub consent_given: bool,
    pub consent_timestamp: Option<DateTime<Utc>>,
}

impl User {
    pub fn with_consent(id: Uuid, consent_given: bool) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            consent_given,
            consent_timestamp: Some(now),
        }
    }
}

/// One entry in a planned or actual route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub step_number: u32,
    pub action_type: ActionKind,
    #[serde(default)]
    pub element: Option<String>,
    /// Absent for planned steps.
    #[serde(default)]
    pub status: Option<ActionStatus>,
    #[serde(default)]
    pub execution_time_ms: Option<u64>,
    pub recorded_at: DateTime<Utc>,
}

impl From<&Action> for RouteStep {
    fn from(action: &Action) -> Self {
        Self {
            step_number: action.step_number,
            action_type: action.action_type,
            element: action.target.as_ref().map(|t| t.element.clone()),
            status: Some(action.status),
            execution_time_ms: action.execution_time_ms,
            recorded_at: Utc::now(),
        }
    }
}

/// Planned versus actual steps of a session, kept for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub session_id: Uuid,
    pub planned_route: Vec<RouteStep>,
    pub actual_route: Vec<RouteStep>,
    pub created_at: DateTime<Utc>,
}

impl Route {
    pub fn new(session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            planned_route: Vec::new(),
            actual_route: Vec::new(),
            created_at: Utc::now(),
        }
    }
}
