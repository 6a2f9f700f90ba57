use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{AgentError, AgentResult};
use crate::lifecycle::state::{Action, Route, Session, User};
use crate::store::Store;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    sessions: HashMap<Uuid, Session>,
    actions: HashMap<Uuid, Action>,
    routes: HashMap<Uuid, Route>,
}

/// Process-local store. All tables sit behind one lock so a session and its
/// actions always disappear together.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert_new<T: Clone>(table: &mut HashMap<Uuid, T>, id: Uuid, row: &T, entity: &str) -> AgentResult<()> {
    if table.contains_key(&id) {
        return Err(AgentError::Store(format!("{entity} {id} already exists")));
    }
    table.insert(id, row.clone());
    Ok(())
}

fn replace<T: Clone>(table: &mut HashMap<Uuid, T>, id: Uuid, row: &T, entity: &'static str) -> AgentResult<()> {
    match table.get_mut(&id) {
        Some(slot) => {
            *slot = row.clone();
            Ok(())
        }
        None => Err(AgentError::not_found(entity, id)),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: &User) -> AgentResult<()> {
        insert_new(&mut self.tables.write().await.users, user.id, user, "user")
    }

    async fn get_user(&self, id: Uuid) -> AgentResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn update_user(&self, user: &User) -> AgentResult<()> {
        replace(&mut self.tables.write().await.users, user.id, user, "user")
    }

    async fn create_session(&self, session: &Session) -> AgentResult<()> {
        insert_new(&mut self.tables.write().await.sessions, session.id, session, "session")
    }

    async fn get_session(&self, id: Uuid) -> AgentResult<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(&id).cloned())
    }

    async fn update_session(&self, session: &Session) -> AgentResult<()> {
        replace(&mut self.tables.write().await.sessions, session.id, session, "session")
    }

    async fn list_sessions(&self, user_id: Option<Uuid>, limit: usize) -> AgentResult<Vec<Session>> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| user_id.map_or(true, |uid| s.user_id == uid))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn delete_session(&self, id: Uuid) -> AgentResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.sessions.remove(&id).is_none() {
            return Ok(false);
        }
        tables.actions.retain(|_, a| a.session_id != id);
        tables.routes.retain(|_, r| r.session_id != id);
        Ok(true)
    }

    async fn create_action(&self, action: &Action) -> AgentResult<()> {
        insert_new(&mut self.tables.write().await.actions, action.id, action, "action")
    }

    async fn get_action(&self, id: Uuid) -> AgentResult<Option<Action>> {
        Ok(self.tables.read().await.actions.get(&id).cloned())
    }

    async fn update_action(&self, action: &Action) -> AgentResult<()> {
        replace(&mut self.tables.write().await.actions, action.id, action, "action")
    }

    async fn list_actions(&self, session_id: Uuid, limit: usize) -> AgentResult<Vec<Action>> {
        let tables = self.tables.read().await;
        let mut actions: Vec<Action> = tables
            .actions
            .values()
            .filter(|a| a.session_id == session_id)
            .cloned()
            .collect();
        actions.sort_by_key(|a| a.step_number);
        actions.truncate(limit);
        Ok(actions)
    }

    async fn create_route(&self, route: &Route) -> AgentResult<()> {
        let mut tables = self.tables.write().await;
        if tables.routes.values().any(|r| r.session_id == route.session_id) {
            return Err(AgentError::Store(format!(
                "session {} already has a route",
                route.session_id
            )));
        }
        insert_new(&mut tables.routes, route.id, route, "route")
    }

    async fn get_route(&self, id: Uuid) -> AgentResult<Option<Route>> {
        Ok(self.tables.read().await.routes.get(&id).cloned())
    }

    async fn get_route_by_session(&self, session_id: Uuid) -> AgentResult<Option<Route>> {
        Ok(self
            .tables
            .read()
            .await
            .routes
            .values()
            .find(|r| r.session_id == session_id)
            .cloned())
    }

    async fn update_route(&self, route: &Route) -> AgentResult<()> {
        replace(&mut self.tables.write().await.routes, route.id, route, "route")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::state::{ActionKind, ActionTemplate, ParamValue, Parameters};
    use chrono::Duration;

    fn template(kind: ActionKind) -> ActionTemplate {
        ActionTemplate {
            action_type: kind,
            target: None,
            text: None,
            parameters: None,
        }
    }

    #[tokio::test]
    async fn delete_session_takes_actions_and_route() {
        let store = MemoryStore::new();
        let session = Session::new(Uuid::new_v4(), "Safari", "search");
        store.create_session(&session).await.unwrap();
        for step in 1..=3 {
            store
                .create_action(&template(ActionKind::Click).bind(session.id, step))
                .await
                .unwrap();
        }
        store.create_route(&Route::new(session.id)).await.unwrap();

        assert!(store.delete_session(session.id).await.unwrap());
        assert!(store.get_session(session.id).await.unwrap().is_none());
        assert!(store.list_actions(session.id, 100).await.unwrap().is_empty());
        assert!(store.get_route_by_session(session.id).await.unwrap().is_none());
        assert!(!store.delete_session(session.id).await.unwrap());
    }

    #[tokio::test]
    async fn actions_list_in_step_order() {
        let store = MemoryStore::new();
        let session_id = Uuid::new_v4();
        for step in [3, 1, 2] {
            store
                .create_action(&template(ActionKind::Wait).bind(session_id, step))
                .await
                .unwrap();
        }
        let steps: Vec<u32> = store
            .list_actions(session_id, 100)
            .await
            .unwrap()
            .iter()
            .map(|a| a.step_number)
            .collect();
        assert_eq!(steps, vec![1, 2, 3]);
        assert_eq!(store.list_actions(session_id, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn sessions_list_newest_first_per_user() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut older = Session::new(user, "Mail", "a");
        older.started_at = older.started_at - Duration::minutes(5);
        let newer = Session::new(user, "Mail", "b");
        let other = Session::new(Uuid::new_v4(), "Mail", "c");
        for s in [&older, &newer, &other] {
            store.create_session(s).await.unwrap();
        }

        let listed = store.list_sessions(Some(user), 10).await.unwrap();
        assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![newer.id, older.id]);
        assert_eq!(store.list_sessions(None, 10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn update_of_missing_entity_is_not_found() {
        let store = MemoryStore::new();
        let action = template(ActionKind::Click).bind(Uuid::new_v4(), 1);
        assert!(matches!(
            store.update_action(&action).await,
            Err(AgentError::NotFound { entity: "action", .. })
        ));
        assert!(store.get_action(action.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_and_absent_parameters_survive() {
        let store = MemoryStore::new();
        let mut with_empty = template(ActionKind::Scroll).bind(Uuid::new_v4(), 1);
        with_empty.parameters = Some(Parameters::new());
        let absent = template(ActionKind::Scroll).bind(Uuid::new_v4(), 1);
        let mut full = template(ActionKind::Scroll).bind(Uuid::new_v4(), 1);
        full.parameters = Some(Parameters::from([("amount".to_string(), ParamValue::Number(-2.0))]));

        for a in [&with_empty, &absent, &full] {
            store.create_action(a).await.unwrap();
            assert_eq!(&store.get_action(a.id).await.unwrap().unwrap(), a);
        }
    }
}
