/// Invitation Routes
///
/// Issuance is superadmin-only and sits behind the session middleware;
/// lookup is public because the sign-up page resolves the invitation
/// before any account exists.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::AppError;
use crate::invitations::{issue_invitation, lookup_invitation};

#[derive(Deserialize)]
pub struct IssueInvitationRequest {
    pub center_ids: Vec<Uuid>,
    pub expires_in_days: i64,
}

#[derive(Deserialize)]
pub struct LookupQuery {
    token: String,
}

/// POST /api/invitations
///
/// Issue a new invitation binding a set of centers to a future account.
/// The response is the only place the plaintext token ever appears.
///
/// # Errors
/// - 400: Empty center list or non-positive expiry window
/// - 403: Actor is not a superadmin
/// - 404: A listed center does not exist
pub async fn issue(
    form: web::Json<IssueInvitationRequest>,
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let invitation = issue_invitation(
        pool.get_ref(),
        &claims,
        &form.center_ids,
        form.expires_in_days,
    )
    .await?;

    Ok(HttpResponse::Created().json(invitation))
}

/// GET /invitations/lookup?token=...
///
/// Resolve an invitation for display on the sign-up page. Read-only; safe
/// to call repeatedly.
///
/// # Errors
/// - 404 / 410 / 409: invalid, expired, or consumed token (one shared
///   user-facing message)
pub async fn lookup(
    query: web::Query<LookupQuery>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let view = lookup_invitation(pool.get_ref(), &query.token).await?;

    Ok(HttpResponse::Ok().json(view))
}
