//! Back-office authentication.
//!
//! The back-office has a single administrator identified by the email in the
//! configuration. Signing in with any other address is refused before the
//! backend is contacted; the first sign-in of the administrator creates the
//! account.
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Message the auth service answers with for unknown users or bad passwords.
pub const INVALID_LOGIN: &str = "Invalid login credentials";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

#[async_trait]
pub trait AuthService: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Registers a user; `metadata` lands in the user's metadata document.
    async fn sign_up(&self, email: &str, password: &str, metadata: Value) -> Result<AuthUser>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;

    /// `None` when the token is unknown or expired.
    async fn current_user(&self, access_token: &str) -> Result<Option<AuthUser>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdminLogin {
    SignedIn(Session),
    /// The administrator account did not exist yet and was created.
    SignedUp(AuthUser),
}

pub async fn admin_sign_in(
    auth: &dyn AuthService,
    admin_email: &str,
    email: &str,
    password: &str,
) -> Result<AdminLogin> {
    if !email.eq_ignore_ascii_case(admin_email) {
        warn!(email, "sign-in refused for non-admin address");
        return Err(StoreError::Auth("Invalid credentials".into()));
    }

    match auth.sign_in(email, password).await {
        Ok(session) => {
            info!(email, "admin signed in");
            Ok(AdminLogin::SignedIn(session))
        }
        Err(StoreError::Auth(msg)) if msg.contains(INVALID_LOGIN) => {
            info!(email, "admin account missing; signing up");
            let user = auth
                .sign_up(email, password, json!({ "role": "admin" }))
                .await?;
            Ok(AdminLogin::SignedUp(user))
        }
        Err(err) => Err(err),
    }
}

/// Any lookup failure counts as "not an admin".
pub async fn is_admin(auth: &dyn AuthService, admin_email: &str, access_token: &str) -> bool {
    match auth.current_user(access_token).await {
        Ok(Some(user)) => user
            .email
            .as_deref()
            .map_or(false, |e| e.eq_ignore_ascii_case(admin_email)),
        Ok(None) => false,
        Err(err) => {
            warn!(?err, "admin check failed");
            false
        }
    }
}
