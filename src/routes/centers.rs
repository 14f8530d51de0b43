/// Center Routes
///
/// CRUD over dialysis center records, scoped by role: a superadmin sees
/// and edits everything, a PIC only the centers an invitation granted.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::Claims;
use crate::error::{AppError, AuthError, StorageError};

#[derive(Serialize, sqlx::FromRow)]
pub struct CenterResponse {
    pub id: Uuid,
    pub name: String,
    pub sector: Option<String>,
    pub address: Option<String>,
    pub town: Option<String>,
    pub tel: Option<String>,
    pub email: Option<String>,
    pub dr_in_charge: Option<String>,
    pub featured: bool,
    pub state: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCenterRequest {
    pub name: String,
    pub sector: Option<String>,
    pub address: Option<String>,
    pub town: Option<String>,
    pub tel: Option<String>,
    pub email: Option<String>,
    pub dr_in_charge: Option<String>,
    pub state_id: Option<Uuid>,
    pub featured: Option<bool>,
}

#[derive(Deserialize)]
pub struct UpdateCenterRequest {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub address: Option<String>,
    pub town: Option<String>,
    pub tel: Option<String>,
    pub email: Option<String>,
    pub dr_in_charge: Option<String>,
    pub state_id: Option<Uuid>,
    pub featured: Option<bool>,
}

#[derive(Serialize)]
pub struct StateResponse {
    pub id: Uuid,
    pub name: String,
}

const CENTER_COLUMNS: &str = r#"
    c.id, c.name, c.sector, c.address, c.town, c.tel, c.email,
    c.dr_in_charge, c.featured, s.name AS state
"#;

async fn has_center_access(pool: &PgPool, user_id: Uuid, center_id: Uuid) -> Result<bool, AppError> {
    let grant = sqlx::query_as::<_, (Uuid,)>(
        "SELECT center_id FROM center_access WHERE user_id = $1 AND center_id = $2",
    )
    .bind(user_id)
    .bind(center_id)
    .fetch_optional(pool)
    .await?;

    Ok(grant.is_some())
}

// Gate shared by the single-center endpoints: superadmin passes, anyone
// else needs an access-grant row.
async fn ensure_center_access(
    pool: &PgPool,
    claims: &Claims,
    center_id: Uuid,
) -> Result<(), AppError> {
    if claims.is_superadmin() {
        return Ok(());
    }

    let user_id = claims.user_id()?;
    if has_center_access(pool, user_id, center_id).await? {
        Ok(())
    } else {
        Err(AppError::Auth(AuthError::Forbidden))
    }
}

/// GET /api/centers
///
/// Superadmins see every center; PIC users only those with an access
/// grant. Ordered by center name.
pub async fn list_centers(
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let centers = if claims.is_superadmin() {
        sqlx::query_as::<_, CenterResponse>(&format!(
            r#"
            SELECT {columns}
            FROM dialysis_centers c
            LEFT JOIN states s ON c.state_id = s.id
            ORDER BY c.name
            "#,
            columns = CENTER_COLUMNS
        ))
        .fetch_all(pool.get_ref())
        .await?
    } else {
        let user_id = claims.user_id()?;
        sqlx::query_as::<_, CenterResponse>(&format!(
            r#"
            SELECT {columns}
            FROM center_access a
            INNER JOIN dialysis_centers c ON a.center_id = c.id
            LEFT JOIN states s ON c.state_id = s.id
            WHERE a.user_id = $1
            ORDER BY c.name
            "#,
            columns = CENTER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(pool.get_ref())
        .await?
    };

    Ok(HttpResponse::Ok().json(centers))
}

/// GET /api/centers/{id}
///
/// # Errors
/// - 404: Center does not exist
/// - 403: PIC user without an access grant for this center
pub async fn get_center(
    path: web::Path<Uuid>,
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let center_id = path.into_inner();

    let center = sqlx::query_as::<_, CenterResponse>(&format!(
        r#"
        SELECT {columns}
        FROM dialysis_centers c
        LEFT JOIN states s ON c.state_id = s.id
        WHERE c.id = $1
        "#,
        columns = CENTER_COLUMNS
    ))
    .bind(center_id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::Storage(StorageError::NotFound("center not found".to_string())))?;

    ensure_center_access(pool.get_ref(), &claims, center_id).await?;

    Ok(HttpResponse::Ok().json(center))
}

/// POST /api/centers
///
/// Superadmin only.
pub async fn create_center(
    form: web::Json<CreateCenterRequest>,
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    if !claims.is_superadmin() {
        return Err(AppError::Auth(AuthError::Forbidden));
    }

    let center_id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO dialysis_centers
        (id, name, sector, address, town, tel, email, dr_in_charge, featured, state_id,
         created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
        "#,
    )
    .bind(center_id)
    .bind(&form.name)
    .bind(&form.sector)
    .bind(&form.address)
    .bind(&form.town)
    .bind(&form.tel)
    .bind(&form.email)
    .bind(&form.dr_in_charge)
    .bind(form.featured.unwrap_or(false))
    .bind(form.state_id)
    .bind(now)
    .execute(pool.get_ref())
    .await?;

    tracing::info!(center_id = %center_id, "Center created");

    Ok(HttpResponse::Created().json(serde_json::json!({ "id": center_id })))
}

/// PUT /api/centers/{id}
///
/// Partial update: absent fields keep their stored value. The `featured`
/// flag is silently dropped for non-superadmin callers.
///
/// # Errors
/// - 404: Center does not exist
/// - 403: PIC user without an access grant for this center
pub async fn update_center(
    path: web::Path<Uuid>,
    form: web::Json<UpdateCenterRequest>,
    claims: web::ReqData<Claims>,
    pool: web::Data<PgPool>,
) -> Result<HttpResponse, AppError> {
    let center_id = path.into_inner();

    let exists = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM dialysis_centers WHERE id = $1")
        .bind(center_id)
        .fetch_optional(pool.get_ref())
        .await?;
    if exists.is_none() {
        return Err(AppError::Storage(StorageError::NotFound(
            "center not found".to_string(),
        )));
    }

    ensure_center_access(pool.get_ref(), &claims, center_id).await?;

    // Only a superadmin may promote or demote a center on the public site
    let featured = if claims.is_superadmin() {
        form.featured
    } else {
        None
    };

    sqlx::query(
        r#"
        UPDATE dialysis_centers SET
            name = COALESCE($2, name),
            sector = COALESCE($3, sector),
            address = COALESCE($4, address),
            town = COALESCE($5, town),
            tel = COALESCE($6, tel),
            email = COALESCE($7, email),
            dr_in_charge = COALESCE($8, dr_in_charge),
            state_id = COALESCE($9, state_id),
            featured = COALESCE($10, featured),
            updated_at = $11
        WHERE id = $1
        "#,
    )
    .bind(center_id)
    .bind(&form.name)
    .bind(&form.sector)
    .bind(&form.address)
    .bind(&form.town)
    .bind(&form.tel)
    .bind(&form.email)
    .bind(&form.dr_in_charge)
    .bind(form.state_id)
    .bind(featured)
    .bind(Utc::now())
    .execute(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "success": true })))
}

/// GET /api/states
pub async fn get_states(pool: web::Data<PgPool>) -> Result<HttpResponse, AppError> {
    let states = sqlx::query_as::<_, (Uuid, String)>("SELECT id, name FROM states ORDER BY name")
        .fetch_all(pool.get_ref())
        .await?
        .into_iter()
        .map(|(id, name)| StateResponse { id, name })
        .collect::<Vec<_>>();

    Ok(HttpResponse::Ok().json(states))
}
