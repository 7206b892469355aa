use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::titles::{PaginatedResponse, PaginationParams};
use crate::auth::password::hash_password;
use crate::auth::routes::{
    validate_email, validate_password, validate_username, UserResponse,
};
use crate::error::ApiError;
use kritika_db::entities::user::{self, UserRole};
use kritika_db::AppState;

fn parse_role(role: &str) -> Result<UserRole, ApiError> {
    match role {
        "admin" => Ok(UserRole::Admin),
        "moderator" => Ok(UserRole::Moderator),
        "user" => Ok(UserRole::User),
        other => Err(ApiError::Validation(format!(
            "unknown role {other:?}, expected admin, moderator or user"
        ))),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub bio: Option<String>,
    pub role: Option<String>,
}

/// GET /api/users (admin)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<UserResponse>>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).min(100);

    let paginator = user::Entity::find()
        .order_by_asc(user::Column::Username)
        .paginate(&state.db, per_page);

    let total = paginator.num_items().await?;
    let users = paginator.fetch_page(page - 1).await?;

    Ok(Json(PaginatedResponse {
        data: users.into_iter().map(UserResponse::from).collect(),
        total,
        page,
        per_page,
        total_pages: total.div_ceil(per_page),
    }))
}

/// POST /api/users (admin)
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_username(&body.username)?;
    validate_email(&body.email)?;
    validate_password(&body.password)?;
    let role = body.role.as_deref().map(parse_role).transpose()?;

    let password_hash = hash_password(&body.password)
        .map_err(|e| ApiError::Internal(format!("hash error: {e}")))?;

    let now = chrono::Utc::now().fixed_offset();
    let created = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(body.username),
        email: Set(body.email),
        password_hash: Set(password_hash),
        bio: Set(body.bio),
        role: Set(role.unwrap_or(UserRole::User)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&state.db)
    .await
    .map_err(|e| ApiError::conflict_on_unique(e, "username or email already taken"))?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// GET /api/users/{id} (admin)
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let found = user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(found.into()))
}

/// PATCH /api/users/{id} (admin) — change role, email or bio
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let existing = user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if let Some(email) = &body.email {
        validate_email(email)?;
    }
    let role = body.role.as_deref().map(parse_role).transpose()?;

    // Demoting the last admin would lock everyone out of this API
    if existing.role == UserRole::Admin
        && role.as_ref().is_some_and(|r| *r != UserRole::Admin)
        && admin_count(&state).await? <= 1
    {
        return Err(ApiError::Validation(
            "cannot demote the only admin".into(),
        ));
    }

    let mut active: user::ActiveModel = existing.into();
    if let Some(email) = body.email {
        active.email = Set(email);
    }
    if let Some(bio) = body.bio {
        active.bio = Set(Some(bio));
    }
    if let Some(role) = role {
        active.role = Set(role);
    }
    active.updated_at = Set(chrono::Utc::now().fixed_offset());

    let updated = active
        .update(&state.db)
        .await
        .map_err(|e| ApiError::conflict_on_unique(e, "this email is already in use"))?;

    tracing::info!(user_id = %updated.id, role = %updated.role, "user updated");

    Ok(Json(updated.into()))
}

/// DELETE /api/users/{id} (admin)
///
/// The user's reviews and comments go with the account (FK cascade).
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let found = user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if found.role == UserRole::Admin && admin_count(&state).await? <= 1 {
        return Err(ApiError::Validation(
            "cannot delete the only admin".into(),
        ));
    }

    user::Entity::delete_by_id(id).exec(&state.db).await?;

    tracing::info!(user_id = %id, "user deleted");

    Ok(StatusCode::NO_CONTENT)
}

async fn admin_count(state: &AppState) -> Result<u64, ApiError> {
    Ok(user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::Admin))
        .count(&state.db)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_known_values() {
        assert_eq!(parse_role("admin").unwrap(), UserRole::Admin);
        assert_eq!(parse_role("moderator").unwrap(), UserRole::Moderator);
        assert_eq!(parse_role("user").unwrap(), UserRole::User);
    }

    #[test]
    fn test_parse_role_rejects_unknown() {
        assert!(parse_role("superuser").is_err());
        assert!(parse_role("").is_err());
        assert!(parse_role("Admin").is_err());
    }
}
