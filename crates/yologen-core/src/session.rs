//! Session store: the authenticated user, their permissions and the bearer token.
//!
//! The store is an explicit service. It is created once, resolved with
//! [`SessionStore::init`], and torn down with [`SessionStore::logout`].
//! Every state change is published on a `watch` channel so route guards
//! re-evaluate while their subtree stays mounted.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{AuthResponse, User};
use crate::rbac::{Capability, Role};

/// Matches the backend's access token lifetime.
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

/// External auth provider (the backend's `/api/auth/*` routes).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<AuthResponse>;
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse>;
    /// Resolve a bearer token to its user.
    async fn current_user(&self, token: &str) -> Result<User>;
}

/// Body of `POST /api/auth/register`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Bearer token shared between the session store (writer) and the HTTP adapter (reader).
#[derive(Debug, Clone, Default)]
pub struct Credentials(Arc<RwLock<Option<String>>>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bearer(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = token;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Unknown,
    Loading,
    Resolved,
}

/// What observers see: resolution progress and the user, if any.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionState {
    pub load: LoadState,
    pub user: Option<User>,
}

impl SessionState {
    pub fn is_loading(&self) -> bool {
        self.load != LoadState::Resolved
    }
}

/// Persistable session, the equivalent of a browser's stored token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub user: Option<User>,
}

impl StoredSession {
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.issued_at + ttl <= now
    }
}

pub struct SessionStore {
    provider: Arc<dyn AuthProvider>,
    credentials: Credentials,
    stored: RwLock<Option<StoredSession>>,
    state: watch::Sender<SessionState>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn AuthProvider>, credentials: Credentials) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            provider,
            credentials,
            stored: RwLock::new(None),
            state,
            ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Seed the store with a previously persisted session. Takes effect on `init`.
    pub fn restore(&self, session: Option<StoredSession>) {
        *self.stored.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    /// Resolve the session: `loading` until the stored token (if any) has been
    /// checked with the auth provider, then `resolved` with a user or none.
    pub async fn init(&self) -> Option<User> {
        self.publish(LoadState::Loading, self.snapshot().user);

        let Some(session) = self.live_session() else {
            debug!("No stored session");
            self.clear();
            return None;
        };

        self.credentials.set(Some(session.token.clone()));
        match self.provider.current_user(&session.token).await {
            Ok(user) => {
                info!(user = %user.username, role = %user.role, "Session resolved");
                self.store(StoredSession {
                    user: Some(user.clone()),
                    ..session
                });
                Some(user)
            }
            Err(e) => {
                warn!(error = %e, "Stored session rejected");
                self.clear();
                None
            }
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let previous = self.snapshot();
        self.publish(LoadState::Loading, previous.user.clone());
        match self.provider.login(username, password).await {
            Ok(auth) => Ok(self.accept(auth)),
            Err(e) => {
                warn!(username, error = %e, "Login failed");
                self.publish(LoadState::Resolved, previous.user);
                Err(e)
            }
        }
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<User> {
        let previous = self.snapshot();
        self.publish(LoadState::Loading, previous.user.clone());
        match self.provider.register(request).await {
            Ok(auth) => Ok(self.accept(auth)),
            Err(e) => {
                warn!(username = %request.username, error = %e, "Registration failed");
                self.publish(LoadState::Resolved, previous.user);
                Err(e)
            }
        }
    }

    pub fn logout(&self) {
        if let Some(user) = self.snapshot().user {
            info!(user = %user.username, "Logged out");
        }
        self.clear();
    }

    /// The current user, or none once the token has expired.
    pub fn current_user(&self) -> Option<User> {
        self.expire_if_stale();
        self.state.borrow().user.clone()
    }

    pub fn load_state(&self) -> LoadState {
        self.state.borrow().load
    }

    pub fn snapshot(&self) -> SessionState {
        self.expire_if_stale();
        self.state.borrow().clone()
    }

    pub fn has_permission(&self, capability: impl Into<Capability>) -> bool {
        let capability = capability.into();
        self.current_user()
            .is_some_and(|u| capability.allows(u.role))
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The session to persist between runs, if still valid.
    pub fn stored(&self) -> Option<StoredSession> {
        self.live_session()
    }

    pub fn token(&self) -> Option<String> {
        self.live_session().map(|s| s.token)
    }

    fn accept(&self, auth: AuthResponse) -> User {
        info!(user = %auth.user.username, role = %auth.user.role, "Logged in");
        self.credentials.set(Some(auth.access_token.clone()));
        self.store(StoredSession {
            token: auth.access_token,
            issued_at: Utc::now(),
            user: Some(auth.user.clone()),
        });
        auth.user
    }

    fn store(&self, session: StoredSession) {
        let user = session.user.clone();
        *self.stored.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.publish(LoadState::Resolved, user);
    }

    fn clear(&self) {
        self.credentials.set(None);
        *self.stored.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.publish(LoadState::Resolved, None);
    }

    fn live_session(&self) -> Option<StoredSession> {
        self.stored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|s| !s.is_expired(self.ttl, Utc::now()))
    }

    fn expire_if_stale(&self) {
        let expired = self
            .stored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|s| s.is_expired(self.ttl, Utc::now()));
        if expired {
            info!("Session token expired");
            self.clear();
        }
    }

    fn publish(&self, load: LoadState, user: Option<User>) {
        let next = SessionState { load, user };
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::rbac::Permission;

    #[tokio::test]
    async fn init_without_token_resolves_to_no_user() {
        let (store, _) = store();
        assert_eq!(store.load_state(), LoadState::Unknown);
        assert!(store.init().await.is_none());
        assert_eq!(store.load_state(), LoadState::Resolved);
        assert!(store.current_user().is_none());
    }

    #[tokio::test]
    async fn login_sets_user_token_and_permissions() {
        let (store, credentials) = store();
        store.init().await;
        let user = store.login("user", "secret").await.unwrap();
        assert_eq!(user.role, Role::User);
        assert_eq!(credentials.bearer().as_deref(), Some("token-user"));
        assert!(store.has_permission(Permission::StartTraining));
        assert!(!store.has_permission(Permission::ManageUsers));
        assert!(!store.has_permission(Role::Admin));
    }

    #[tokio::test]
    async fn failed_login_keeps_previous_state() {
        let (store, _) = store();
        store.init().await;
        let err = store.login("admin", "wrong").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid username or password");
        assert_eq!(store.snapshot(), SessionState { load: LoadState::Resolved, user: None });
    }

    #[tokio::test]
    async fn restored_token_is_resolved_by_provider() {
        let (store, credentials) = store();
        store.restore(Some(StoredSession {
            token: "token-viewer".into(),
            issued_at: Utc::now(),
            user: None,
        }));
        let user = store.init().await.unwrap();
        assert_eq!(user.role, Role::Viewer);
        assert_eq!(credentials.bearer().as_deref(), Some("token-viewer"));
        assert!(store.stored().unwrap().user.is_some());
    }

    #[tokio::test]
    async fn rejected_token_clears_session() {
        let (store, credentials) = store();
        store.restore(Some(StoredSession {
            token: "garbage".into(),
            issued_at: Utc::now(),
            user: None,
        }));
        assert!(store.init().await.is_none());
        assert!(credentials.bearer().is_none());
        assert!(store.stored().is_none());
    }

    #[tokio::test]
    async fn expired_token_is_not_used() {
        let (store, _) = store();
        store.restore(Some(StoredSession {
            token: "token-admin".into(),
            issued_at: Utc::now() - Duration::minutes(DEFAULT_SESSION_TTL_MINUTES + 1),
            user: None,
        }));
        assert!(store.init().await.is_none());
    }

    #[tokio::test]
    async fn session_expires_while_in_use() {
        let (store, credentials) = store();
        let store = store.with_ttl(Duration::zero());
        store.init().await;
        store.login("admin", "secret").await.unwrap();
        assert!(store.current_user().is_none());
        assert!(credentials.bearer().is_none());
        assert_eq!(store.load_state(), LoadState::Resolved);
    }

    #[tokio::test]
    async fn logout_publishes_to_subscribers() {
        let (store, credentials) = store();
        store.init().await;
        store.login("admin", "secret").await.unwrap();
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        store.logout();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().user.is_none());
        assert!(credentials.bearer().is_none());
    }

    #[tokio::test]
    async fn register_logs_the_new_user_in() {
        let (store, _) = store();
        store.init().await;
        let user = store
            .register(&RegisterRequest {
                username: "new".into(),
                email: "new@example.com".into(),
                password: "pw".into(),
                role: Role::Viewer,
            })
            .await
            .unwrap();
        assert_eq!(user.role, Role::Viewer);
        assert!(store.has_permission(Permission::ViewDataset));
    }
}
