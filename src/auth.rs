use std::collections::HashMap;
use std::ops::Add;

use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::{DateTime, Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand::{thread_rng, Rng};
use rand_core::OsRng;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::{breaks, proceeds, AppState, Error, Payload};

#[derive(Debug, Clone, Eq, Ord, PartialOrd, PartialEq)]
pub enum AuthResult {
    Success,
    SessionExpired,
    InvalidSession,
}

impl Serialize for AuthResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:?}", self))
    }
}

/// Shared admin password in front of the dashboard routes. A successful login
/// hands out a session id that expires after the configured lifetime.
pub struct AdminGate {
    password_hash: String,
    ttl: Duration,
    sessions: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AdminGate {
    pub fn new(password: &str, ttl: Duration) -> Result<Self, Error> {
        let password_hash = Pbkdf2
            .hash_password(password.as_bytes(), &SaltString::generate(&mut OsRng))?
            .to_string();
        Ok(Self {
            password_hash,
            ttl,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub async fn login(&self, password: &str) -> Result<AdminSession, Error> {
        if password.is_empty() {
            return Err(Error::invalid("`password` parameter was empty"));
        }
        let hash = PasswordHash::new(&self.password_hash)?;
        let matches = Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok();
        if !matches {
            return Err(Error::AuthenticationFailure {
                message: "Incorrect password. Please try again.".to_string(),
            });
        }

        let session_id = new_session_id();
        let expires_at = Utc::now().add(self.ttl);
        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), expires_at);
        Ok(AdminSession {
            session_id,
            expires_at,
        })
    }

    pub async fn check(&self, session_id: Option<&str>) -> AuthResult {
        let ssid = match session_id {
            Some(ssid) if !ssid.is_empty() => ssid,
            _ => return AuthResult::InvalidSession,
        };
        let mut sessions = self.sessions.lock().await;
        let expired = match sessions.get(ssid) {
            Some(expires_at) => Utc::now().gt(expires_at),
            None => return AuthResult::InvalidSession,
        };
        if expired {
            sessions.remove(ssid);
            return AuthResult::SessionExpired;
        }
        AuthResult::Success
    }

    pub async fn require(
        &self,
        bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ) -> Result<(), Error> {
        let token = bearer.as_ref().map(|TypedHeader(auth)| auth.token());
        match self.check(token).await {
            AuthResult::Success => Ok(()),
            AuthResult::SessionExpired => Err(Error::AuthenticationFailure {
                message: "Admin session expired, log in again".to_string(),
            }),
            AuthResult::InvalidSession => Err(Error::AuthenticationFailure {
                message: "Admin session required".to_string(),
            }),
        }
    }

    pub async fn logout(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }
}

fn new_session_id() -> String {
    let ssid_bytes: [u8; 32] = thread_rng().gen();
    let mut hasher: Sha256 = Digest::new();
    hasher.update(&ssid_bytes);
    hex::encode(hasher.finalize())
}

pub async fn login_admin(
    Extension(state): Extension<AppState>,
    Json(login): Json<AdminLogin>,
) -> Payload<AdminSession> {
    match state.gate.login(&login.password).await {
        Ok(session) => proceeds(session),
        Err(err) => {
            log::info!("rejected admin login");
            breaks(err)
        }
    }
}

pub async fn logout_admin(
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Extension(state): Extension<AppState>,
) -> Payload<SessionDropped> {
    let Some(TypedHeader(auth)) = bearer else {
        return breaks(Error::AuthenticationFailure {
            message: "Admin session required".to_string(),
        });
    };
    let dropped = state.gate.logout(auth.token()).await;
    proceeds(SessionDropped {
        drop_success: dropped,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDropped {
    pub drop_success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminSession {
    pub session_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminLogin {
    password: String,
}
