//! Resolves the signed-in user from the session cookie via the identity
//! provider, and from there the doctor record.
//!
//! Any provider failure reads as "not signed in": callers see `None`, never
//! the provider's error.

use std::sync::Arc;
use std::time::Duration;

use actix_web::HttpRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, ClinicStore};
use crate::models::Doctor;
use crate::repository::RepositoryError;

const PROVIDER_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("identity provider rejected the session: {0}")]
    Rejected(String),

    #[error("identity provider unreachable: {0}")]
    Transport(String),

    #[error("malformed identity provider response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError>;
}

/// Supabase GoTrue `GET /auth/v1/user`.
pub struct SupabaseAuth {
    base_url: String,
    anon_key: String,
    client: reqwest::Client,
}

impl SupabaseAuth {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            client,
        })
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::Rejected(status.to_string()));
        }

        response
            .json::<AuthUser>()
            .await
            .map_err(|e| AuthError::Malformed(e.to_string()))
    }
}

#[derive(Clone)]
pub struct SessionAccessor {
    auth: Arc<dyn AuthProvider>,
    clinic: Arc<dyn ClinicStore>,
    cookie_name: String,
}

impl SessionAccessor {
    pub fn new(auth: Arc<dyn AuthProvider>, clinic: Arc<dyn ClinicStore>, cookie_name: &str) -> Self {
        Self {
            auth,
            clinic,
            cookie_name: cookie_name.to_string(),
        }
    }

    pub async fn current_user(&self, req: &HttpRequest) -> Option<AuthUser> {
        let cookie = req.cookie(&self.cookie_name)?;
        match self.auth.get_user(cookie.value()).await {
            Ok(user) => Some(user),
            Err(err) => {
                tracing::debug!(error = %err, "Session could not be resolved");
                None
            }
        }
    }

    /// The doctor whose id is the signed-in user's id, if both exist.
    pub async fn current_doctor(&self, req: &HttpRequest) -> Result<Option<Doctor>, RepositoryError> {
        let Some(user) = self.current_user(req).await else {
            return Ok(None);
        };
        db::blocking(&self.clinic, move |s| s.find_doctor(user.id))
            .await
            .map_err(|e| RepositoryError::from_store("get doctor", e))
    }
}
