use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Role, Session};

struct UserInfo {
    username: &'static str,
    password: &'static str,
    role: Role,
    display_name: &'static str,
}

/// Demo accounts; credentials are plain text on purpose.
const USERS: &[UserInfo] = &[
    UserInfo {
        username: "enterprise",
        password: "enterprise123",
        role: Role::Enterprise,
        display_name: "Enterprise User",
    },
    UserInfo {
        username: "admin",
        password: "admin123",
        role: Role::Admin,
        display_name: "Administrator",
    },
];

/// In-memory login service. Tokens live until the process exits.
#[derive(Clone, Default)]
pub struct AuthService {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl AuthService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn login(&self, username: &str, password: &str) -> Option<Session> {
        let Some(user) = USERS.iter().find(|u| u.username == username) else {
            warn!(username, "Login attempt for unknown user");
            return None;
        };
        if user.password != password {
            warn!(username, "Login attempt with wrong password");
            return None;
        }

        let session = Session {
            token: Uuid::new_v4().to_string(),
            username: user.username.to_string(),
            role: user.role,
            display_name: user.display_name.to_string(),
            created_at: Utc::now(),
        };
        self.sessions.write().await.insert(session.token.clone(), session.clone());
        info!(username, role = %user.role, "User logged in");
        Some(session)
    }

    pub async fn validate(&self, token: Option<&str>) -> Option<Session> {
        let token = token?;
        self.sessions.read().await.get(token).cloned()
    }

    /// Validates `token` and checks the session carries `role`.
    pub async fn require_role(
        &self,
        token: Option<&str>,
        role: Role,
        message: &str,
    ) -> Result<Session, AppError> {
        match self.validate(token).await {
            Some(session) if session.role == role => Ok(session),
            _ => Err(AppError::unauthorized(message)),
        }
    }
}
