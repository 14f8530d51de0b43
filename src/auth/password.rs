/// Password Hashing and Verification
///
/// Credentials are stored as base64(salt || derived key), where the key is
/// derived with PBKDF2-HMAC-SHA256 over a fresh per-password random salt.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{AppError, ValidationError};

const SALT_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;
const PBKDF2_ITERATIONS: u32 = 100_000;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;

/// Hash a password into an opaque credential record
///
/// Generates a fresh 16-byte random salt, derives a 256-bit key with
/// PBKDF2-HMAC-SHA256 and returns base64(salt || key). Two calls with the
/// same password produce different records.
///
/// # Errors
/// Returns error only if the system randomness source fails
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| AppError::Internal(format!("Salt generation failed: {}", e)))?;

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut key);

    let mut record = Vec::with_capacity(SALT_LENGTH + KEY_LENGTH);
    record.extend_from_slice(&salt);
    record.extend_from_slice(&key);

    Ok(BASE64.encode(record))
}

/// Verify a password against a stored credential record
///
/// Fails closed: a record that does not decode, is truncated, or has the
/// wrong length yields `false` rather than an error, so a malformed stored
/// record is indistinguishable from a wrong password.
pub fn verify_password(password: &str, record: &str) -> bool {
    let decoded = match BASE64.decode(record) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    if decoded.len() != SALT_LENGTH + KEY_LENGTH {
        return false;
    }

    let (salt, stored_key) = decoded.split_at(SALT_LENGTH);

    let mut derived_key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut derived_key);

    constant_time_eq(&derived_key, stored_key)
}

// Branch-free comparison: the runtime must not depend on the position of
// the first mismatched byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Validate password length constraints
///
/// Applied at the route boundary; the hasher itself accepts any input.
pub fn validate_password_strength(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooShort(
            "password".to_string(),
            MIN_PASSWORD_LENGTH,
        )));
    }

    if password.len() > MAX_PASSWORD_LENGTH {
        return Err(AppError::Validation(ValidationError::TooLong(
            "password".to_string(),
            MAX_PASSWORD_LENGTH,
        )));
    }

    Ok(())
}
