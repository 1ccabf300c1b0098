//! Auth service — accounts, password hashing, and bearer tokens.
//!
//! DESIGN
//! ======
//! Tokens are stateless HS256 JWTs: the WebSocket handshake and the REST
//! extractor both verify signature + expiry and read identity straight from
//! the claims, no session table. Passwords are salted SHA-256 stored as
//! `salt$digest` hex.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::envelope::now_ms;

/// Token lifetime when `JWT_TTL_SECS` is unset: one day.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 86_400;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailTaken,
    /// A presented token failed verification (signature, expiry, or shape).
    #[error("invalid token")]
    InvalidToken,
    /// Token issuing failed; a config problem, not a caller problem.
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// =============================================================================
// TOKENS
// =============================================================================

/// Bearer token claims. `sub` carries the user id, `name` the display name
/// shown next to the user's cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

/// HS256 signer and verifier for access tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl TokenService {
    #[must_use]
    pub fn new(secret: &[u8], ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    /// Build from `JWT_SECRET` and `JWT_TTL_SECS`.
    ///
    /// Without a configured secret a random ephemeral one is generated, so
    /// every issued token dies with the process. Fine for development, loud
    /// in the logs.
    #[must_use]
    pub fn from_env() -> Self {
        let ttl_secs = crate::state::env_parse("JWT_TTL_SECS", DEFAULT_TOKEN_TTL_SECS);
        match std::env::var("JWT_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => Self::new(secret.as_bytes(), ttl_secs),
            _ => {
                warn!("JWT_SECRET not set; using an ephemeral secret, tokens will not survive a restart");
                let mut secret = [0u8; 32];
                rand::rng().fill_bytes(&mut secret);
                Self::new(&secret, ttl_secs)
            }
        }
    }

    #[must_use]
    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Sign a fresh token for the user.
    ///
    /// # Errors
    ///
    /// Fails only on key/serialization problems, never on user input.
    pub fn issue(&self, user_id: Uuid, name: &str) -> Result<String, AuthError> {
        let now = now_ms() / 1000;
        let claims = Claims {
            sub: user_id,
            name: name.to_owned(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// Expiry has zero leeway: an expired token is invalid the second it
    /// expires.
    ///
    /// # Errors
    ///
    /// Any rejection reason collapses to [`AuthError::InvalidToken`].
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}

// =============================================================================
// PASSWORDS
// =============================================================================

fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn digest_with_salt(salt_hex: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    bytes_to_hex(&hasher.finalize())
}

/// Hash a password with a fresh random salt. Output is `salt$digest` hex.
#[must_use]
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::rng().fill_bytes(&mut salt);
    let salt_hex = bytes_to_hex(&salt);
    let digest = digest_with_salt(&salt_hex, password);
    format!("{salt_hex}${digest}")
}

/// Check a password against a stored `salt$digest` hash.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest)) = stored.split_once('$') else {
        return false;
    };
    digest_with_salt(salt_hex, password) == digest
}

// =============================================================================
// ACCOUNTS
// =============================================================================

/// Account as the API exposes it. The hash never leaves this module.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Create an account.
///
/// # Errors
///
/// `EmailTaken` when the email is already registered.
pub async fn register_user(
    pool: &PgPool,
    email: &str,
    name: &str,
    password: &str,
) -> Result<UserRecord, AuthError> {
    let id = Uuid::new_v4();
    let email = normalize_email(email);
    let result = sqlx::query(
        "INSERT INTO users (id, email, name, password_hash)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (email) DO NOTHING",
    )
    .bind(id)
    .bind(&email)
    .bind(name)
    .bind(hash_password(password))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AuthError::EmailTaken);
    }

    Ok(UserRecord {
        id,
        email,
        name: name.to_owned(),
    })
}

/// Check credentials and return the account.
///
/// # Errors
///
/// `InvalidCredentials` for an unknown email or a wrong password; the two
/// cases are indistinguishable to the caller on purpose.
pub async fn login_user(pool: &PgPool, email: &str, password: &str) -> Result<UserRecord, AuthError> {
    let Some(row) = sqlx::query("SELECT id, email, name, password_hash FROM users WHERE email = $1")
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await?
    else {
        return Err(AuthError::InvalidCredentials);
    };

    let stored: String = row.get("password_hash");
    if !verify_password(password, &stored) {
        return Err(AuthError::InvalidCredentials);
    }

    Ok(UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        name: row.get("name"),
    })
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
