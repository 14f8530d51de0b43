/// Password Reset Token Management
///
/// Reset tokens are:
/// - Cryptographically secure random 64-character strings
/// - Hashed with SHA-256 before storage (never store plaintext)
/// - Single-use, consumed atomically when the password is reset
/// - Valid for one hour from issuance

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AuthError};

const RESET_TOKEN_TTL_MINUTES: i64 = 60;

/// Generate a new cryptographically secure reset token
///
/// The plaintext token goes into the emailed link; the server stores only
/// its SHA-256 hash.
pub fn generate_reset_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Save a reset token for a user
///
/// # Errors
/// Returns error if database operation fails
pub async fn save_reset_token(pool: &PgPool, user_id: Uuid, token: &str) -> Result<(), AppError> {
    let token_hash = hash_token(token);
    let now = Utc::now();
    let expires_at = now + Duration::minutes(RESET_TOKEN_TTL_MINUTES);

    sqlx::query(
        r#"
        INSERT INTO password_reset_tokens (id, user_id, token_hash, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(token_hash)
    .bind(expires_at)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Consume a reset token, returning the owning user
///
/// The used flag flips in the same statement that checks it, so a token
/// can be redeemed by at most one caller even under concurrent requests.
/// Any unusable token (unknown, already used, expired) maps to the same
/// `TokenInvalid` error.
///
/// # Errors
/// Returns error if the token is unknown, already used, or expired
pub async fn consume_reset_token(pool: &PgPool, token: &str) -> Result<Uuid, AppError> {
    let token_hash = hash_token(token);

    let result = sqlx::query_as::<_, (Uuid,)>(
        r#"
        UPDATE password_reset_tokens
        SET used = TRUE, used_at = $1
        WHERE token_hash = $2 AND used = FALSE AND expires_at > $1
        RETURNING user_id
        "#,
    )
    .bind(Utc::now())
    .bind(&token_hash)
    .fetch_optional(pool)
    .await?;

    match result {
        Some((user_id,)) => Ok(user_id),
        None => {
            tracing::warn!("Rejected unusable password reset token");
            Err(AppError::Auth(AuthError::TokenInvalid))
        }
    }
}
