use async_trait::async_trait;
use rusqlite::{params, Row};
use uuid::Uuid;

use super::{parse_datetime, parse_optional_datetime, parse_uuid, to_i64, to_u32, to_u64, SqliteStore};
use crate::errors::{AgentError, AgentResult};
use crate::lifecycle::state::{Action, ActionTarget, Parameters, Route, RouteStep, Session, User};
use crate::store::Store;

const SESSION_COLUMNS: &str =
    "id, user_id, app_name, task_description, status, started_at, ended_at, current_step";
const ACTION_COLUMNS: &str = "id, session_id, step_number, action_type, target, text, parameters, \
     status, execution_time_ms, timestamp, error_message, retry_count";
const ROUTE_COLUMNS: &str = "id, session_id, planned_route, actual_route, created_at";

fn row_to_user(row: &Row) -> AgentResult<User> {
    let id: String = row.get("id")?;
    let created_at: String = row.get("created_at")?;
    Ok(User {
        id: parse_uuid(&id, "users.id")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        consent_given: row.get("consent_given")?,
        consent_timestamp: parse_optional_datetime(row.get("consent_timestamp")?, "consent_timestamp")?,
    })
}

fn row_to_session(row: &Row) -> AgentResult<Session> {
    let id: String = row.get("id")?;
    let user_id: String = row.get("user_id")?;
    let status: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    Ok(Session {
        id: parse_uuid(&id, "sessions.id")?,
        user_id: parse_uuid(&user_id, "user_id")?,
        app_name: row.get("app_name")?,
        task_description: row.get("task_description")?,
        status: status.parse()?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(row.get("ended_at")?, "ended_at")?,
        current_step: to_u32(row.get("current_step")?, "current_step")?,
    })
}

fn row_to_action(row: &Row) -> AgentResult<Action> {
    let id: String = row.get("id")?;
    let session_id: String = row.get("session_id")?;
    let action_type: String = row.get("action_type")?;
    let target: Option<String> = row.get("target")?;
    let parameters: Option<String> = row.get("parameters")?;
    let status: String = row.get("status")?;
    let execution_time_ms: Option<i64> = row.get("execution_time_ms")?;
    let timestamp: String = row.get("timestamp")?;
    Ok(Action {
        id: parse_uuid(&id, "actions.id")?,
        session_id: parse_uuid(&session_id, "session_id")?,
        step_number: to_u32(row.get("step_number")?, "step_number")?,
        action_type: action_type.parse()?,
        target: target
            .map(|t| serde_json::from_str::<ActionTarget>(&t))
            .transpose()?,
        text: row.get("text")?,
        parameters: parameters
            .map(|p| serde_json::from_str::<Parameters>(&p))
            .transpose()?,
        status: status.parse()?,
        execution_time_ms: execution_time_ms
            .map(|ms| to_u64(ms, "execution_time_ms"))
            .transpose()?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        error_message: row.get("error_message")?,
        retry_count: to_u32(row.get("retry_count")?, "retry_count")?,
    })
}

fn row_to_route(row: &Row) -> AgentResult<Route> {
    let id: String = row.get("id")?;
    let session_id: String = row.get("session_id")?;
    let planned: String = row.get("planned_route")?;
    let actual: String = row.get("actual_route")?;
    let created_at: String = row.get("created_at")?;
    Ok(Route {
        id: parse_uuid(&id, "routes.id")?,
        session_id: parse_uuid(&session_id, "session_id")?,
        planned_route: serde_json::from_str::<Vec<RouteStep>>(&planned)?,
        actual_route: serde_json::from_str::<Vec<RouteStep>>(&actual)?,
        created_at: parse_datetime(&created_at, "created_at")?,
    })
}

fn ensure_updated(changed: usize, entity: &'static str, id: Uuid) -> AgentResult<()> {
    if changed == 0 {
        Err(AgentError::not_found(entity, id))
    } else {
        Ok(())
    }
}

/// Column values for an action row, in `ACTION_COLUMNS` order minus `id`.
struct ActionRow {
    session_id: String,
    step_number: u32,
    action_type: &'static str,
    target: Option<String>,
    text: Option<String>,
    parameters: Option<String>,
    status: &'static str,
    execution_time_ms: Option<i64>,
    timestamp: String,
    error_message: Option<String>,
    retry_count: u32,
}

impl ActionRow {
    fn from_action(action: &Action) -> AgentResult<Self> {
        Ok(Self {
            session_id: action.session_id.to_string(),
            step_number: action.step_number,
            action_type: action.action_type.as_str(),
            target: action.target.as_ref().map(serde_json::to_string).transpose()?,
            text: action.text.clone(),
            parameters: action.parameters.as_ref().map(serde_json::to_string).transpose()?,
            status: action.status.as_str(),
            execution_time_ms: action.execution_time_ms.map(to_i64).transpose()?,
            timestamp: action.timestamp.to_rfc3339(),
            error_message: action.error_message.clone(),
            retry_count: action.retry_count,
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&self, user: &User) -> AgentResult<()> {
        let record = user.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO users (id, created_at, consent_given, consent_timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.id.to_string(),
                    record.created_at.to_rfc3339(),
                    record.consent_given,
                    record.consent_timestamp.map(|dt| dt.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_user(&self, id: Uuid) -> AgentResult<Option<User>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, created_at, consent_given, consent_timestamp FROM users WHERE id = ?1",
            )?;
            let mut rows = stmt.query(params![id.to_string()])?;
            let found = rows.next()?.map(row_to_user).transpose()?;
            Ok(found)
        })
        .await
    }

    async fn update_user(&self, user: &User) -> AgentResult<()> {
        let record = user.clone();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE users SET consent_given = ?1, consent_timestamp = ?2 WHERE id = ?3",
                params![
                    record.consent_given,
                    record.consent_timestamp.map(|dt| dt.to_rfc3339()),
                    record.id.to_string(),
                ],
            )?;
            ensure_updated(changed, "user", record.id)
        })
        .await
    }

    async fn create_session(&self, session: &Session) -> AgentResult<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                &format!("INSERT INTO sessions ({SESSION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                params![
                    record.id.to_string(),
                    record.user_id.to_string(),
                    record.app_name,
                    record.task_description,
                    record.status.as_str(),
                    record.started_at.to_rfc3339(),
                    record.ended_at.map(|dt| dt.to_rfc3339()),
                    record.current_step,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_session(&self, id: Uuid) -> AgentResult<Option<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"))?;
            let mut rows = stmt.query(params![id.to_string()])?;
            let found = rows.next()?.map(row_to_session).transpose()?;
            Ok(found)
        })
        .await
    }

    async fn update_session(&self, session: &Session) -> AgentResult<()> {
        let record = session.clone();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET app_name = ?1,
                     task_description = ?2,
                     status = ?3,
                     ended_at = ?4,
                     current_step = ?5
                 WHERE id = ?6",
                params![
                    record.app_name,
                    record.task_description,
                    record.status.as_str(),
                    record.ended_at.map(|dt| dt.to_rfc3339()),
                    record.current_step,
                    record.id.to_string(),
                ],
            )?;
            ensure_updated(changed, "session", record.id)
        })
        .await
    }

    async fn list_sessions(&self, user_id: Option<Uuid>, limit: usize) -> AgentResult<Vec<Session>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE ?1 IS NULL OR user_id = ?1
                 ORDER BY started_at DESC
                 LIMIT ?2"
            ))?;
            let mut rows = stmt.query(params![user_id.map(|u| u.to_string()), limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    async fn delete_session(&self, id: Uuid) -> AgentResult<bool> {
        self.execute(move |conn| {
            let id = id.to_string();
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM actions WHERE session_id = ?1", params![id])?;
            tx.execute("DELETE FROM routes WHERE session_id = ?1", params![id])?;
            let removed = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn create_action(&self, action: &Action) -> AgentResult<()> {
        let id = action.id.to_string();
        let row = ActionRow::from_action(action)?;
        self.execute(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO actions ({ACTION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    id,
                    row.session_id,
                    row.step_number,
                    row.action_type,
                    row.target,
                    row.text,
                    row.parameters,
                    row.status,
                    row.execution_time_ms,
                    row.timestamp,
                    row.error_message,
                    row.retry_count,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_action(&self, id: Uuid) -> AgentResult<Option<Action>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {ACTION_COLUMNS} FROM actions WHERE id = ?1"))?;
            let mut rows = stmt.query(params![id.to_string()])?;
            let found = rows.next()?.map(row_to_action).transpose()?;
            Ok(found)
        })
        .await
    }

    async fn update_action(&self, action: &Action) -> AgentResult<()> {
        let id = action.id;
        let row = ActionRow::from_action(action)?;
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE actions
                 SET step_number = ?1,
                     action_type = ?2,
                     target = ?3,
                     text = ?4,
                     parameters = ?5,
                     status = ?6,
                     execution_time_ms = ?7,
                     timestamp = ?8,
                     error_message = ?9,
                     retry_count = ?10
                 WHERE id = ?11",
                params![
                    row.step_number,
                    row.action_type,
                    row.target,
                    row.text,
                    row.parameters,
                    row.status,
                    row.execution_time_ms,
                    row.timestamp,
                    row.error_message,
                    row.retry_count,
                    id.to_string(),
                ],
            )?;
            ensure_updated(changed, "action", id)
        })
        .await
    }

    async fn list_actions(&self, session_id: Uuid, limit: usize) -> AgentResult<Vec<Action>> {
        let limit = to_i64(limit as u64)?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ACTION_COLUMNS} FROM actions
                 WHERE session_id = ?1
                 ORDER BY step_number ASC
                 LIMIT ?2"
            ))?;
            let mut rows = stmt.query(params![session_id.to_string(), limit])?;
            let mut actions = Vec::new();
            while let Some(row) = rows.next()? {
                actions.push(row_to_action(row)?);
            }
            Ok(actions)
        })
        .await
    }

    async fn create_route(&self, route: &Route) -> AgentResult<()> {
        let record = route.clone();
        let planned = serde_json::to_string(&record.planned_route)?;
        let actual = serde_json::to_string(&record.actual_route)?;
        self.execute(move |conn| {
            conn.execute(
                &format!("INSERT INTO routes ({ROUTE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    record.id.to_string(),
                    record.session_id.to_string(),
                    planned,
                    actual,
                    record.created_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_route(&self, id: Uuid) -> AgentResult<Option<Route>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE id = ?1"))?;
            let mut rows = stmt.query(params![id.to_string()])?;
            let found = rows.next()?.map(row_to_route).transpose()?;
            Ok(found)
        })
        .await
    }

    async fn get_route_by_session(&self, session_id: Uuid) -> AgentResult<Option<Route>> {
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {ROUTE_COLUMNS} FROM routes WHERE session_id = ?1"))?;
            let mut rows = stmt.query(params![session_id.to_string()])?;
            let found = rows.next()?.map(row_to_route).transpose()?;
            Ok(found)
        })
        .await
    }

    async fn update_route(&self, route: &Route) -> AgentResult<()> {
        let id = route.id;
        let planned = serde_json::to_string(&route.planned_route)?;
        let actual = serde_json::to_string(&route.actual_route)?;
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE routes SET planned_route = ?1, actual_route = ?2 WHERE id = ?3",
                params![planned, actual, id.to_string()],
            )?;
            ensure_updated(changed, "route", id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state::{
        ActionKind, ActionStatus, ActionTemplate, Coordinates, ParamValue, SessionStatus,
    };

    async fn store_with_session() -> (SqliteStore, Session) {
        let store = SqliteStore::open_in_memory().unwrap();
        let session = Session::new(Uuid::new_v4(), "Notes", "write a note");
        store.create_session(&session).await.unwrap();
        (store, session)
    }

    fn action(session_id: Uuid, step: u32, parameters: Option<Parameters>) -> Action {
        ActionTemplate {
            action_type: ActionKind::Type,
            target: Some(ActionTarget {
                element: "Body".into(),
                coordinates: Some(Coordinates::new(120, 340)),
                confidence: 0.75,
            }),
            text: Some("hello".into()),
            parameters,
        }
        .bind(session_id, step)
    }

    #[tokio::test]
    async fn action_round_trip_keeps_every_field() {
        let (store, session) = store_with_session().await;
        let mut full = action(
            session.id,
            1,
            Some(Parameters::from([
                ("amount".to_string(), ParamValue::Number(-3.0)),
                ("smooth".to_string(), ParamValue::Bool(true)),
                ("unit".to_string(), ParamValue::Text("lines".into())),
            ])),
        );
        full.status = ActionStatus::Failed;
        full.execution_time_ms = Some(42);
        full.error_message = Some("boom".into());
        full.retry_count = 2;
        let empty = action(session.id, 2, Some(Parameters::new()));
        let absent = action(session.id, 3, None);

        for a in [&full, &empty, &absent] {
            store.create_action(a).await.unwrap();
            assert_eq!(&store.get_action(a.id).await.unwrap().unwrap(), a);
        }
    }

    #[tokio::test]
    async fn session_update_and_listing() {
        let (store, mut session) = store_with_session().await;
        session.transition(SessionStatus::Cancelled).unwrap();
        session.current_step = 4;
        store.update_session(&session).await.unwrap();
        assert_eq!(store.get_session(session.id).await.unwrap().unwrap(), session);

        let listed = store.list_sessions(Some(session.user_id), 10).await.unwrap();
        assert_eq!(listed, vec![session.clone()]);
        assert!(store.list_sessions(Some(Uuid::new_v4()), 10).await.unwrap().is_empty());
        assert_eq!(store.list_sessions(None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_session_is_transactional_cascade() {
        let (store, session) = store_with_session().await;
        for step in [2, 1] {
            store.create_action(&action(session.id, step, None)).await.unwrap();
        }
        let steps: Vec<u32> = store
            .list_actions(session.id, 10)
            .await
            .unwrap()
            .iter()
            .map(|a| a.step_number)
            .collect();
        assert_eq!(steps, vec![1, 2]);
        store.create_route(&Route::new(session.id)).await.unwrap();

        assert!(store.delete_session(session.id).await.unwrap());
        assert!(store.get_session(session.id).await.unwrap().is_none());
        assert!(store.list_actions(session.id, 10).await.unwrap().is_empty());
        assert!(store.get_route_by_session(session.id).await.unwrap().is_none());
        assert!(!store.delete_session(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn updates_of_missing_rows_are_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let user = User::with_consent(Uuid::new_v4(), true);
        assert!(matches!(
            store.update_user(&user).await,
            Err(AgentError::NotFound { entity: "user", .. })
        ));
        let session = Session::new(user.id, "Mail", "x");
        assert!(matches!(
            store.update_session(&session).await,
            Err(AgentError::NotFound { entity: "session", .. })
        ));
        assert!(store.get_user(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_and_route_round_trip() {
        let (store, session) = store_with_session().await;
        let mut user = User::with_consent(session.user_id, false);
        store.create_user(&user).await.unwrap();
        user.consent_given = true;
        user.consent_timestamp = Some(chrono::Utc::now());
        store.update_user(&user).await.unwrap();
        assert_eq!(store.get_user(user.id).await.unwrap().unwrap(), user);

        let mut route = Route::new(session.id);
        store.create_route(&route).await.unwrap();
        let mut done = action(session.id, 1, None);
        done.status = ActionStatus::Success;
        route.actual_route.push(RouteStep::from(&done));
        store.update_route(&route).await.unwrap();
        assert_eq!(store.get_route(route.id).await.unwrap().unwrap(), route);
        assert_eq!(store.get_route_by_session(session.id).await.unwrap().unwrap(), route);
    }

    #[tokio::test]
    async fn file_backed_store_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("macagent.db");
        let session = Session::new(Uuid::new_v4(), "Finder", "tidy up");
        {
            let store = SqliteStore::open(path.clone()).unwrap();
            store.create_session(&session).await.unwrap();
        }
        let reopened = SqliteStore::open(path).unwrap();
        assert_eq!(reopened.get_session(session.id).await.unwrap().unwrap(), session);
    }
}
