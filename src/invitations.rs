/// Invitation Token Management
///
/// Invitations are single-use, time-limited capability tokens issued by a
/// superadmin. Each one binds a set of center ids to a future account;
/// consuming it at sign-up grants the new user access to those centers.
///
/// Lifecycle: `pending` -> `consumed` (terminal). Expiry is never stored as
/// a status of its own; it is computed from `expires_at` at check time, so
/// an expired invitation still reads `pending` in the row store while being
/// permanently unredeemable.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sqlx::PgPool;
use uuid::Uuid;

use crate::audit::{AuditOutcome, AuditRecord};
use crate::auth::Claims;
use crate::error::{AppError, AuthError, InvitationError, StorageError, ValidationError};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_CONSUMED: &str = "consumed";

/// A freshly issued invitation, including the plaintext token.
///
/// The token is shown to the issuer exactly once; afterwards it only
/// travels inside the sign-up link.
#[derive(Debug, serde::Serialize)]
pub struct Invitation {
    pub id: Uuid,
    pub token: String,
    pub center_ids: Vec<Uuid>,
    pub expires_at: DateTime<Utc>,
}

/// Read-only view of a pending invitation, resolved for display.
#[derive(Debug, serde::Serialize)]
pub struct InvitationView {
    pub centers: Vec<CenterSummary>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, serde::Serialize)]
pub struct CenterSummary {
    pub id: Uuid,
    pub name: String,
    pub town: Option<String>,
}

/// A persisted `(user, center)` authorization relation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AccessGrant {
    pub user_id: Uuid,
    pub center_id: Uuid,
}

/// Generate an unguessable invitation token
///
/// 64 alphanumeric characters from a CSPRNG, far above the entropy needed
/// to rule out enumeration.
pub fn generate_invitation_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

// Set semantics for center ids: first occurrence wins, order preserved.
fn dedupe_center_ids(center_ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(center_ids.len());
    for id in center_ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

/// Issue a new invitation
///
/// Only a superadmin may issue. The centers must all exist, the id list
/// must be non-empty and the expiry window positive.
///
/// # Errors
/// - `AuthError::Forbidden` if the actor is not a superadmin
/// - `ValidationError` for an empty center list or non-positive expiry
/// - `StorageError::NotFound` if any center id is unknown
pub async fn issue_invitation(
    pool: &PgPool,
    issued_by: &Claims,
    center_ids: &[Uuid],
    expires_in_days: i64,
) -> Result<Invitation, AppError> {
    if !issued_by.is_superadmin() {
        AuditRecord::new(
            "ISSUE_INVITATION",
            "invitation",
            AuditOutcome::Failure,
            "actor lacks superadmin role",
        )
        .emit();
        return Err(AppError::Auth(AuthError::Forbidden));
    }

    let center_ids = dedupe_center_ids(center_ids);
    if center_ids.is_empty() {
        return Err(AppError::Validation(ValidationError::EmptyField(
            "center_ids".to_string(),
        )));
    }
    if expires_in_days <= 0 {
        return Err(AppError::Validation(ValidationError::OutOfRange(
            "expires_in_days".to_string(),
        )));
    }

    let (known_centers,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM dialysis_centers WHERE id = ANY($1)")
            .bind(&center_ids)
            .fetch_one(pool)
            .await?;
    if known_centers as usize != center_ids.len() {
        return Err(AppError::Storage(StorageError::NotFound(
            "one or more centers do not exist".to_string(),
        )));
    }

    let id = Uuid::new_v4();
    let token = generate_invitation_token();
    let now = Utc::now();
    let expires_at = now + Duration::days(expires_in_days);
    let issuer_id = issued_by.user_id()?;

    sqlx::query(
        r#"
        INSERT INTO invitations
        (id, token, center_ids, status, expires_at, issued_by, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(&token)
    .bind(&center_ids)
    .bind(STATUS_PENDING)
    .bind(expires_at)
    .bind(issuer_id)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!(
        invitation_id = %id,
        issued_by = %issuer_id,
        centers = center_ids.len(),
        "Invitation issued"
    );
    AuditRecord::new(
        "ISSUE_INVITATION",
        "invitation",
        AuditOutcome::Success,
        format!("invitation for {} center(s) issued", center_ids.len()),
    )
    .with_resource_id(id.to_string())
    .emit();

    Ok(Invitation {
        id,
        token,
        center_ids,
        expires_at,
    })
}

/// Look up an invitation by token for display
///
/// Read-only and safe to call repeatedly; no state is mutated.
///
/// # Errors
/// - `InvitationError::NotFound` if no invitation matches
/// - `InvitationError::Expired` once past `expires_at`, regardless of status
/// - `InvitationError::AlreadyConsumed` for a consumed invitation
pub async fn lookup_invitation(pool: &PgPool, token: &str) -> Result<InvitationView, AppError> {
    let row = sqlx::query_as::<_, (String, DateTime<Utc>, Vec<Uuid>)>(
        "SELECT status, expires_at, center_ids FROM invitations WHERE token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let (status, expires_at, center_ids) = match row {
        Some(row) => row,
        None => return Err(AppError::Invitation(InvitationError::NotFound)),
    };

    // Expiry wins over consumption: past expires_at nothing is redeemable,
    // whatever the stored status says.
    if Utc::now() > expires_at {
        return Err(AppError::Invitation(InvitationError::Expired));
    }
    if status == STATUS_CONSUMED {
        return Err(AppError::Invitation(InvitationError::AlreadyConsumed));
    }

    let centers = sqlx::query_as::<_, (Uuid, String, Option<String>)>(
        "SELECT id, name, town FROM dialysis_centers WHERE id = ANY($1) ORDER BY name",
    )
    .bind(&center_ids)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(id, name, town)| CenterSummary { id, name, town })
    .collect();

    Ok(InvitationView {
        centers,
        expires_at,
    })
}

/// Consume an invitation, granting the user access to its centers
///
/// The `pending -> consumed` transition is a single conditional UPDATE:
/// exactly one of any number of concurrent callers wins it, and the rest
/// observe `AlreadyConsumed`. The transition and the grant inserts share
/// one transaction, so either all of them commit or none do.
///
/// # Errors
/// Same validity errors as [`lookup_invitation`], re-checked atomically at
/// consumption time.
pub async fn consume_invitation(
    pool: &PgPool,
    token: &str,
    user_id: Uuid,
) -> Result<Vec<AccessGrant>, AppError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let transitioned = sqlx::query_as::<_, (Uuid, Vec<Uuid>)>(
        r#"
        UPDATE invitations
        SET status = $1, consumed_by_user_id = $2, consumed_at = $3
        WHERE token = $4 AND status = $5 AND expires_at > $3
        RETURNING id, center_ids
        "#,
    )
    .bind(STATUS_CONSUMED)
    .bind(user_id)
    .bind(now)
    .bind(token)
    .bind(STATUS_PENDING)
    .fetch_optional(&mut tx)
    .await?;

    let (invitation_id, center_ids) = match transitioned {
        Some(row) => row,
        None => {
            // Lost the transition; a plain read tells the caller why.
            drop(tx);
            let reason = classify_unredeemable(pool, token).await?;
            AuditRecord::new(
                "CONSUME_INVITATION",
                "invitation",
                AuditOutcome::Failure,
                reason.to_string(),
            )
            .emit();
            return Err(AppError::Invitation(reason));
        }
    };

    let mut grants = Vec::with_capacity(center_ids.len());
    for center_id in &center_ids {
        sqlx::query(
            r#"
            INSERT INTO center_access (user_id, center_id, granted_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, center_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(center_id)
        .bind(now)
        .execute(&mut tx)
        .await?;

        grants.push(AccessGrant {
            user_id,
            center_id: *center_id,
        });
    }

    tx.commit().await?;

    tracing::info!(
        invitation_id = %invitation_id,
        user_id = %user_id,
        grants = grants.len(),
        "Invitation consumed"
    );
    AuditRecord::new(
        "CONSUME_INVITATION",
        "invitation",
        AuditOutcome::Success,
        format!("{} access grant(s) created", grants.len()),
    )
    .with_resource_id(invitation_id.to_string())
    .emit();

    Ok(grants)
}

// Explains a failed conditional transition. By the time we re-read, the row
// can only be missing, expired, or consumed; the expired check runs first
// to match lookup precedence (it also absorbs the sliver where the row
// expired between the UPDATE and this read).
async fn classify_unredeemable(pool: &PgPool, token: &str) -> Result<InvitationError, AppError> {
    let row = sqlx::query_as::<_, (String, DateTime<Utc>)>(
        "SELECT status, expires_at FROM invitations WHERE token = $1",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(match row {
        None => InvitationError::NotFound,
        Some((_, expires_at)) if Utc::now() > expires_at => InvitationError::Expired,
        Some((status, _)) if status == STATUS_CONSUMED => InvitationError::AlreadyConsumed,
        Some(_) => InvitationError::Expired,
    })
}
