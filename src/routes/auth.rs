/// Authentication Routes
///
/// Handles user registration (with optional invitation redemption), login,
/// current user information, and the password reset flow.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditOutcome, AuditRecord};
use crate::auth::{
    consume_reset_token, generate_access_token, generate_reset_token, hash_password,
    save_reset_token, validate_password_strength, verify_password, Claims, ROLE_PIC,
};
use crate::configuration::{ApplicationSettings, JwtSettings};
use crate::email_client::{password_reset_email, EmailClient};
use crate::error::{AppError, AuthError, ErrorContext};
use crate::invitations::consume_invitation;
use crate::validators::{is_valid_email, is_valid_name};

/// User registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    /// Invitation token from the sign-up link, if the user was invited
    pub invitation_token: Option<String>,
}

/// User login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// Authentication response with the session token
#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Registration response
///
/// `centers_assigned` / `warning` report the outcome of invitation
/// redemption: a failed redemption does not undo account creation, it is
/// surfaced here as a partial success.
#[derive(Serialize)]
pub struct RegisterResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub centers_assigned: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// User information response
#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: String,
    pub created_at: String,
}

/// POST /auth/register
///
/// Register a new user with email, password, and name. New accounts get
/// the `pic` role; center access comes exclusively through invitations.
///
/// When the request carries an invitation token, the token is consumed
/// after the account exists. Redemption failure leaves the account in
/// place and reports `centers_assigned: 0` with a warning instead of
/// rolling back.
///
/// # Errors
/// - 400: Validation errors (invalid email/password/name)
/// - 409: Email already registered (duplicate)
/// - 500: Internal server error
pub async fn register(
    form: web::Json<RegisterRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    // Validate inputs
    let email = is_valid_email(&form.email)?;
    let name = is_valid_name(&form.name)?;
    validate_password_strength(&form.password)?;
    let password_hash = hash_password(&form.password)?;

    // Create user in database
    let user_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO users (id, email, name, password_hash, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(user_id)
    .bind(&email)
    .bind(&name)
    .bind(&password_hash)
    .bind(ROLE_PIC)
    .bind(Utc::now())
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        let error = AppError::from(e);
        context.log_error(&error);
        AuditRecord::new(
            "CREATE_USER",
            "user",
            AuditOutcome::Failure,
            error.to_string(),
        )
        .emit();
        error
    })?;

    AuditRecord::new(
        "CREATE_USER",
        "user",
        AuditOutcome::Success,
        "account created",
    )
    .with_resource_id(user_id.to_string())
    .emit();

    // Redeem invitation, if one was supplied. The account survives a
    // failed redemption; the caller is told instead.
    let (centers_assigned, warning) = match form.invitation_token.as_deref() {
        None => (0, None),
        Some(token) => match consume_invitation(pool.get_ref(), token, user_id).await {
            Ok(grants) => (grants.len(), None),
            Err(error) => {
                tracing::warn!(
                    request_id = %context.request_id,
                    user_id = %user_id,
                    error = %error,
                    "Account created but invitation redemption failed"
                );
                (
                    0,
                    Some(
                        "Account created, but center assignment failed: the invitation \
                         is invalid, expired, or has already been used."
                            .to_string(),
                    ),
                )
            }
        },
    };

    let access_token = generate_access_token(&user_id, &email, ROLE_PIC, jwt_config.get_ref())?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        centers_assigned = centers_assigned,
        "User registered successfully"
    );

    Ok(HttpResponse::Created().json(RegisterResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
        centers_assigned,
        warning,
    }))
}

/// POST /auth/login
///
/// Authenticate user with email and password.
///
/// # Errors
/// - 400: Validation error (invalid email format)
/// - 401: Invalid credentials (email not found or wrong password)
/// - 403: Account is inactive
/// - 500: Internal server error
///
/// # Security Notes
/// - Uses same error message for "not found" and "wrong password"
/// - Prevents user enumeration attacks
/// - Only returns a token if the account is active
pub async fn login(
    form: web::Json<LoginRequest>,
    pool: web::Data<PgPool>,
    jwt_config: web::Data<JwtSettings>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    // Validate email format
    let email = is_valid_email(&form.email)?;

    // Fetch user from database
    let user = sqlx::query_as::<_, (Uuid, String, String, String, bool)>(
        "SELECT id, email, password_hash, role, is_active FROM users WHERE email = $1",
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| {
        AuditRecord::new(
            "LOGIN",
            "user",
            AuditOutcome::Failure,
            "unknown email or wrong password",
        )
        .emit();
        AppError::Auth(AuthError::InvalidCredentials)
    })?;

    let (user_id, user_email, password_hash, role, is_active) = user;

    // Check if account is active
    if !is_active {
        return Err(AppError::Auth(AuthError::AccountInactive));
    }

    // Verify password
    if !verify_password(&form.password, &password_hash) {
        AuditRecord::new(
            "LOGIN",
            "user",
            AuditOutcome::Failure,
            "unknown email or wrong password",
        )
        .with_resource_id(user_id.to_string())
        .emit();
        return Err(AppError::Auth(AuthError::InvalidCredentials));
    }

    let access_token = generate_access_token(&user_id, &user_email, &role, jwt_config.get_ref())?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: jwt_config.access_token_expiry,
    }))
}

/// POST /auth/forgot-password
///
/// Start the password reset flow. Always returns 200 with the same body,
/// whether or not the email belongs to an account, so the endpoint cannot
/// be used to enumerate users. The reset email is dispatched in the
/// background; the request does not wait on delivery.
pub async fn forgot_password(
    form: web::Json<ForgotPasswordRequest>,
    pool: web::Data<PgPool>,
    email_client: web::Data<EmailClient>,
    app_config: web::Data<ApplicationSettings>,
) -> Result<HttpResponse, AppError> {
    let email = is_valid_email(&form.email)?;

    let user = sqlx::query_as::<_, (Uuid,)>(
        "SELECT id FROM users WHERE email = $1 AND is_active = TRUE",
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?;

    if let Some((user_id,)) = user {
        let token = generate_reset_token();
        save_reset_token(pool.get_ref(), user_id, &token).await?;

        let reset_url = format!(
            "{}/auth/reset-password?token={}",
            app_config.base_url, token
        );
        let body = password_reset_email(&reset_url);

        let client = email_client.get_ref().clone();
        let recipient = email;
        tokio::spawn(async move {
            if let Err(e) = client
                .send_email(&recipient, "Reset your password - Dialisis Admin", &body)
                .await
            {
                tracing::error!(error = %e, "Failed to deliver password reset email");
            }
        });

        AuditRecord::new(
            "REQUEST_PASSWORD_RESET",
            "user",
            AuditOutcome::Success,
            "reset token issued",
        )
        .with_resource_id(user_id.to_string())
        .emit();
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "If that account exists, a password reset link has been sent."
    })))
}

/// POST /auth/reset-password
///
/// Complete the password reset flow. The token is single-use: it is
/// consumed in the same statement that validates it, and the credential
/// record is replaced wholesale.
///
/// # Errors
/// - 400: New password fails the strength check
/// - 401: Token is unknown, already used, or expired
pub async fn reset_password(
    form: web::Json<ResetPasswordRequest>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    validate_password_strength(&form.new_password)?;

    let user_id = consume_reset_token(pool.get_ref(), &form.token).await?;

    let password_hash = hash_password(&form.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE id = $3")
        .bind(&password_hash)
        .bind(Utc::now())
        .bind(user_id)
        .execute(pool.get_ref())
        .await?;

    AuditRecord::new(
        "RESET_PASSWORD",
        "user",
        AuditOutcome::Success,
        "credential record replaced",
    )
    .with_resource_id(user_id.to_string())
    .emit();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password has been reset. You can now sign in."
    })))
}

/// GET /api/me
///
/// Get current authenticated user's information.
/// Claims are injected by the JWT middleware.
pub async fn get_current_user(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let user_id = claims.user_id()?;

    let user = sqlx::query_as::<_, (Uuid, String, String, String, chrono::DateTime<Utc>)>(
        "SELECT id, email, name, role, created_at FROM users WHERE id = $1 AND is_active = TRUE",
    )
    .bind(user_id)
    .fetch_one(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(UserResponse {
        id: user.0.to_string(),
        email: user.1,
        name: user.2,
        role: user.3,
        created_at: user.4.to_rfc3339(),
    }))
}
