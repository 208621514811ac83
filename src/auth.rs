//! Bearer-token authentication and the admin gate.
//!
//! Protected requests pass through two checks:
//! 1. [`auth_middleware`] extracts `Authorization: Bearer <token>`,
//!    verifies the HS256 signature and expiry, and attaches the decoded
//!    [`Identity`] to the request extensions.
//! 2. [`admin_middleware`] rejects identities without the admin flag.
//!
//! Login goes through [`authenticate`], which answers unknown emails and
//! wrong passwords identically and performs one Argon2 verification on
//! both paths.

use std::sync::{Arc, OnceLock};

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::errors::GalleryError;
use crate::metadata::store::{MetadataStore, UserRecord};
use crate::AppState;

/// Verified bearer-token failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization: Bearer` header.
    #[error("no credential supplied")]
    MissingToken,
    /// Bad signature, malformed token, or expired.
    #[error("invalid credential")]
    InvalidToken,
}

impl From<AuthError> for GalleryError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => GalleryError::MissingToken,
            AuthError::InvalidToken => GalleryError::InvalidToken,
        }
    }
}

/// JWT claims carried by every issued token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            is_admin: claims.is_admin,
        }
    }
}

/// Issues and verifies HS256 tokens with a shared secret.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl_hours: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: i64::try_from(ttl_hours)
                .ok()
                .and_then(Duration::try_hours)
                .unwrap_or(Duration::MAX),
        }
    }

    /// Issue a token for `user`, valid for the configured TTL.
    pub fn issue(&self, user: &UserRecord) -> anyhow::Result<String> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| anyhow::anyhow!("token lifetime out of range"))?;
        let claims = Claims {
            sub: user.id.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        self.sign(&claims)
    }

    /// Sign arbitrary claims.
    pub fn sign(&self, claims: &Claims) -> anyhow::Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| anyhow::anyhow!("Failed to sign token: {e}"))
    }

    /// Verify signature and expiry, returning the embedded identity.
    pub fn verify(&self, token: &str) -> Result<Identity, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| Identity::from(data.claims))
            .map_err(|e| {
                debug!("Token rejected: {e}");
                AuthError::InvalidToken
            })
    }
}

/// Extract the bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)
}

// ── Password hashing ────────────────────────────────────────────────

fn hash_password_blocking(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))
}

fn verify_password_blocking(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Hash checked against when the email is unknown, so both login failure
/// paths cost one verification.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password_blocking("gallery-dummy-password").unwrap_or_default())
}

/// Hash `password` on the blocking pool.
pub async fn hash_password(password: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password_blocking(&password)).await?
}

/// Verify `password` against `hash` on the blocking pool. A missing hash
/// is verified against a dummy and always fails.
pub async fn verify_password(password: String, hash: Option<String>) -> anyhow::Result<bool> {
    let matched = tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password_blocking(&password, &hash),
        None => {
            verify_password_blocking(&password, dummy_hash());
            false
        }
    })
    .await?;
    Ok(matched)
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub token: String,
    pub is_admin: bool,
}

/// Check `email`/`password` against the credential store and issue a token.
pub async fn authenticate(
    store: &dyn MetadataStore,
    tokens: &TokenService,
    email: &str,
    password: &str,
) -> Result<LoginGrant, GalleryError> {
    let user = store.find_user_by_email(email).await?;
    let hash = user.as_ref().map(|u| u.password_hash.clone());

    let matched = verify_password(password.to_string(), hash).await?;
    let user = match user {
        Some(user) if matched => user,
        _ => return Err(GalleryError::InvalidCredentials),
    };

    let token = tokens.issue(&user)?;
    Ok(LoginGrant {
        token,
        is_admin: user.is_admin,
    })
}

/// Reject identities without the admin flag.
pub fn require_admin(identity: &Identity) -> Result<(), GalleryError> {
    if identity.is_admin {
        Ok(())
    } else {
        Err(GalleryError::AdminRequired)
    }
}

// ── Middleware ──────────────────────────────────────────────────────

/// Verify the bearer token and attach the [`Identity`] to the request.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, GalleryError> {
    let token = bearer_token(req.headers())?;
    let identity = state.tokens.verify(token)?;
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Require an admin [`Identity`]. Must run after [`auth_middleware`].
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, GalleryError> {
    let identity = req
        .extensions()
        .get::<Identity>()
        .ok_or(GalleryError::MissingToken)?;
    require_admin(identity)?;
    Ok(next.run(req).await)
}
