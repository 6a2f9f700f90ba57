//! Keyed storage for users, sessions, actions and routes.
//!
//! Lookups return `Ok(None)` for absent rows; only updates of a missing
//! entity fail, with `AgentError::NotFound`.
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{StoreBackend, StoreConfig};
use crate::errors::AgentResult;
use crate::lifecycle::state::{Action, Route, Session, User};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: &User) -> AgentResult<()>;
    async fn get_user(&self, id: Uuid) -> AgentResult<Option<User>>;
    async fn update_user(&self, user: &User) -> AgentResult<()>;

    async fn create_session(&self, session: &Session) -> AgentResult<()>;
    async fn get_session(&self, id: Uuid) -> AgentResult<Option<Session>>;
    async fn update_session(&self, session: &Session) -> AgentResult<()>;
    /// Newest first.
    async fn list_sessions(&self, user_id: Option<Uuid>, limit: usize) -> AgentResult<Vec<Session>>;
    /// Removes the session together with its actions and route. Returns
    /// `false` when there was no such session.
    async fn delete_session(&self, id: Uuid) -> AgentResult<bool>;

    async fn create_action(&self, action: &Action) -> AgentResult<()>;
    async fn get_action(&self, id: Uuid) -> AgentResult<Option<Action>>;
    async fn update_action(&self, action: &Action) -> AgentResult<()>;
    /// Ordered by step number, ascending.
    async fn list_actions(&self, session_id: Uuid, limit: usize) -> AgentResult<Vec<Action>>;

    async fn create_route(&self, route: &Route) -> AgentResult<()>;
    async fn get_route(&self, id: Uuid) -> AgentResult<Option<Route>>;
    async fn get_route_by_session(&self, session_id: Uuid) -> AgentResult<Option<Route>>;
    async fn update_route(&self, route: &Route) -> AgentResult<()>;
}

/// Opens the backend selected in `[store]`.
pub fn open(config: &StoreConfig) -> AgentResult<Arc<dyn Store>> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = config.resolved_path();
            Ok(Arc::new(SqliteStore::open(path)?))
        }
    }
}
