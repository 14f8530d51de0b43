/// JWT Claims structure
///
/// Represents the payload of an access token containing user identity,
/// role, and standard JWT claims (RFC 7519).

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::error::AppError;

/// Role with unrestricted access to every center and invitation issuance.
pub const ROLE_SUPERADMIN: &str = "superadmin";
/// Default role: person-in-charge, scoped to explicitly granted centers.
pub const ROLE_PIC: &str = "pic";

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    /// User email
    pub email: String,
    /// User role (`superadmin` or `pic`)
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Issuer
    pub iss: String,
}

impl Claims {
    /// Create new claims with user information
    pub fn new(
        user_id: Uuid,
        email: String,
        role: String,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            email,
            role,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
        }
    }

    /// Extract user ID from claims
    ///
    /// # Errors
    /// Returns error if user ID is not a valid UUID
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Internal("Invalid user ID in token".to_string()))
    }

    pub fn is_superadmin(&self) -> bool {
        self.role == ROLE_SUPERADMIN
    }

    /// Check if token has expired
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp < now
    }
}
