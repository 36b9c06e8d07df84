//! Backend session persistence.

use std::sync::Arc;

use tracing::info;

use tether_core::defaults::KEY_AUTH_SESSION;
use tether_core::{KeyValueStore, Result, Session};

/// Session token storage on top of the secure store.
#[derive(Clone)]
pub struct SessionStore {
    secure: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(secure: Arc<dyn KeyValueStore>) -> Self {
        Self { secure }
    }

    /// Current session, or `None` when signed out.
    pub async fn load(&self) -> Result<Option<Session>> {
        match self.secure.get(KEY_AUTH_SESSION).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        self.secure
            .set(KEY_AUTH_SESSION, &serde_json::to_string(session)?)
            .await?;
        info!(user_id = %session.user_id, "Session saved");
        Ok(())
    }

    /// Forget the session (sign-out or 401 from the backend).
    pub async fn clear(&self) -> Result<()> {
        self.secure.remove(KEY_AUTH_SESSION).await
    }
}
