use crate::adapters::http::ReqwestTransport;
use crate::core::client::ApiClient;
use crate::domain::model::{Credentials, Identity, SessionSnapshot};
use crate::domain::ports::{SessionInvalidator, Transport};
use crate::utils::error::{ApiError, Result};
use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock};

pub const LOGIN_PATH: &str = "/auth/login";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";

/// 共用的登入身分快取
#[derive(Clone, Default)]
pub struct SessionStore {
    current: Arc<RwLock<Option<SessionSnapshot>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, identity: Identity) {
        let snapshot = SessionSnapshot {
            identity,
            established_at: Utc::now(),
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.snapshot().map(|s| s.identity)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Hook for [`ApiClient`] that drops the cached identity once the session
    /// can no longer be refreshed.
    pub fn invalidator(&self) -> SessionInvalidator {
        let store = self.clone();
        Arc::new(move || {
            let had_session = store.is_authenticated();
            store.clear();
            tracing::warn!(had_session, "🔒 Session invalidated, cached identity cleared");
        })
    }
}

pub struct AuthService<T: Transport = ReqwestTransport> {
    client: ApiClient<T>,
    store: SessionStore,
}

impl<T: Transport> AuthService<T> {
    pub fn new(client: ApiClient<T>, store: SessionStore) -> Self {
        Self { client, store }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Identity> {
        let payload = serde_json::to_value(credentials)?;
        let body = self.client.post(LOGIN_PATH, Some(payload)).await?;
        let identity = extract_identity(body)?;

        tracing::info!(
            email = identity.email.as_deref().unwrap_or_default(),
            role = identity.role.as_deref().unwrap_or_default(),
            "🔑 Signed in"
        );
        self.store.set(identity.clone());
        Ok(identity)
    }

    /// 向伺服器確認目前身分並更新快取
    pub async fn current_user(&self) -> Result<Identity> {
        let body = self.client.get(ME_PATH).await?;
        let identity = extract_identity(body)?;
        self.store.set(identity.clone());
        Ok(identity)
    }

    /// The local session is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<()> {
        let outcome = self.client.post(LOGOUT_PATH, None).await;
        self.store.clear();

        match outcome {
            Ok(_) => {
                tracing::info!("👋 Signed out");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-out request failed, local session cleared anyway");
                Err(e)
            }
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        self.store.identity()
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.store
            .identity()
            .and_then(|i| i.role)
            .is_some_and(|r| r.eq_ignore_ascii_case(role))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }
}

/// 後端可能直接回傳使用者，或包在 `user` 欄位裡
fn extract_identity(body: serde_json::Value) -> Result<Identity> {
    let candidate = match body {
        serde_json::Value::Object(mut map) => match map.remove("user") {
            Some(user @ serde_json::Value::Object(_)) => user,
            Some(other) => {
                map.insert("user".to_string(), other);
                serde_json::Value::Object(map)
            }
            None => serde_json::Value::Object(map),
        },
        other => {
            return Err(ApiError::ValidationError {
                message: format!("Expected a user object, got {}", other),
            })
        }
    };

    Ok(serde_json::from_value(candidate)?)
}
