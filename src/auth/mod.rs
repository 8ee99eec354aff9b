//! Authentication: session cookies, HTTP Basic credentials and the login subtree

use crate::config::UserSeed;
use crate::error::ApiError;
use crate::store::UserStore;
use anyhow::Context;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::sync::Arc;
use thiserror::Error;

pub mod passwords;
pub mod routes;
pub mod session;

pub use passwords::PasswordService;
pub use session::SessionStore;

/// Password hashing errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("argon2 parameter error: {0}")]
    Argon2(String),

    #[error("password hashing error: {0}")]
    PasswordHash(String),

    #[error("password verification task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<argon2::Error> for AuthError {
    fn from(err: argon2::Error) -> Self {
        AuthError::Argon2(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AuthError::PasswordHash(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Internal(err.into())
    }
}

/// An authenticated API user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: u64,
    pub username: String,
}

/// Outcome of authentication, stored in request extensions by [`auth_middleware`]
#[derive(Debug, Clone, Default)]
pub struct CurrentUser(pub Option<AuthUser>);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .and_then(|current| current.0.clone())
            .ok_or(ApiError::NotAuthenticated)
    }
}

/// Resolves request credentials to users
pub struct Authenticator {
    users: Arc<UserStore>,
    sessions: SessionStore,
    passwords: PasswordService,
    cookie_name: String,
}

impl Authenticator {
    pub fn new(users: Arc<UserStore>, passwords: PasswordService, cookie_name: &str) -> Self {
        Self {
            users,
            sessions: SessionStore::new(),
            passwords,
            cookie_name: cookie_name.to_string(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Check a username/password pair; `Ok(None)` when they do not match
    pub async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> AuthResult<Option<AuthUser>> {
        let Some(user) = self.users.find_by_username(username).await else {
            return Ok(None);
        };

        // argon2 is CPU bound; keep it off the async workers
        let passwords = self.passwords.clone();
        let password = password.to_string();
        let hash = user.password_hash.clone();
        let valid =
            tokio::task::spawn_blocking(move || passwords.verify_password(&password, &hash))
                .await??;

        Ok(valid.then(|| AuthUser {
            id: user.id,
            username: user.username,
        }))
    }

    /// Authenticate from a session cookie, then from HTTP Basic credentials
    ///
    /// Anonymous requests yield `Ok(None)`; presented but wrong credentials
    /// are an error.
    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Option<AuthUser>, ApiError> {
        if let Some(key) = session_key(headers, &self.cookie_name)
            && let Some(user_id) = self.sessions.user_id(&key)
            && let Some(user) = self.users.get(user_id).await
        {
            return Ok(Some(AuthUser {
                id: user.id,
                username: user.username,
            }));
        }

        let Some(value) = headers.get(header::AUTHORIZATION) else {
            return Ok(None);
        };
        let Some((username, password)) = value.to_str().ok().and_then(parse_basic) else {
            // Other schemes are not ours to judge
            return Ok(None);
        };
        let (username, password) = match (username, password) {
            (Some(username), Some(password)) => (username, password),
            _ => return Err(ApiError::AuthenticationFailed),
        };

        match self.verify_credentials(&username, &password).await? {
            Some(user) => Ok(Some(user)),
            None => {
                tracing::debug!(username = %username, "Basic authentication failed");
                Err(ApiError::AuthenticationFailed)
            }
        }
    }
}

/// Parse an `Authorization` value; `None` when it is not a Basic credential,
/// `Some((None, None))` when it is Basic but malformed
fn parse_basic(value: &str) -> Option<(Option<String>, Option<String>)> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());
    let Some(decoded) = decoded else {
        return Some((None, None));
    };

    match decoded.split_once(':') {
        Some((username, password)) => Some((Some(username.to_string()), Some(password.to_string()))),
        None => Some((None, None)),
    }
}

/// Extract the session key from the `Cookie` headers
pub fn session_key(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, key)| key.to_string())
}

/// Axum middleware resolving the caller for every request
pub async fn auth_middleware(
    State(authenticator): State<Arc<Authenticator>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = authenticator.authenticate(request.headers()).await?;
    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Create configured users that do not exist yet; returns how many were added
pub async fn seed_users(
    users: &UserStore,
    passwords: &PasswordService,
    seeds: &[UserSeed],
) -> anyhow::Result<usize> {
    let mut added = 0;
    for seed in seeds {
        if users.find_by_username(&seed.username).await.is_some() {
            tracing::debug!(username = %seed.username, "Seed user already present");
            continue;
        }
        let hash = passwords
            .hash_password(&seed.password)
            .with_context(|| format!("Failed to hash password for '{}'", seed.username))?;
        users
            .create_user(&seed.username, hash)
            .await
            .with_context(|| format!("Failed to create user '{}'", seed.username))?;
        added += 1;
    }

    tracing::info!(added, total = users.count().await, "Users seeded");
    Ok(added)
}
