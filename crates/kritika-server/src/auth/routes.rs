use axum::{extract::State, http::StatusCode, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::{generate_token_pair, validate_token, TokenPair, TokenType};
use super::middleware::AuthUser;
use super::password::{hash_password, verify_password};
use crate::error::ApiError;
use kritika_db::entities::user::{self, UserRole};
use kritika_db::AppState;

// ─── Request/Response DTOs ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub role: String,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            bio: u.bio,
            role: u.role.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub tokens: TokenPair,
}

pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.len() < 3 || username.len() > 150 {
        return Err(ApiError::Validation(
            "username must be between 3 and 150 characters".into(),
        ));
    }
    if username.contains('@') || username.contains('/') || username.contains(' ') {
        return Err(ApiError::Validation(
            "username cannot contain @, / or spaces".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), ApiError> {
    let domain_ok = email
        .split('@')
        .nth(1)
        .is_some_and(|d| d.contains('.') && !d.is_empty());
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') || !domain_ok {
        return Err(ApiError::Validation("invalid email address".into()));
    }
    if email.len() > 254 {
        return Err(ApiError::Validation("email address too long".into()));
    }
    Ok(())
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    if password.len() > 1024 {
        return Err(ApiError::Validation("password too long".into()));
    }
    Ok(())
}

// ─── Handlers ──────────────────────────────────────────────────────

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    validate_username(&body.username)?;
    validate_email(&body.email)?;
    validate_password(&body.password)?;

    let existing = user::Entity::find()
        .filter(
            user::Column::Username
                .eq(&body.username)
                .or(user::Column::Email.eq(&body.email)),
        )
        .one(&state.db)
        .await?;

    if existing.is_some() {
        return Err(ApiError::Conflict("username or email already taken".into()));
    }

    let password_hash = hash_password(&body.password)
        .map_err(|e| ApiError::Internal(format!("hash error: {e}")))?;

    // First registered user becomes the instance admin
    let user_count: u64 = user::Entity::find().count(&state.db).await?;
    let role = if user_count == 0 {
        UserRole::Admin
    } else {
        UserRole::User
    };

    let now = chrono::Utc::now().fixed_offset();
    let new_user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(body.username.clone()),
        email: Set(body.email.clone()),
        password_hash: Set(password_hash),
        bio: Set(body.bio.clone()),
        role: Set(role),
        created_at: Set(now),
        updated_at: Set(now),
    };

    // The unique keys on username/email remain authoritative if two
    // identical registrations race past the pre-check.
    let created = new_user
        .insert(&state.db)
        .await
        .map_err(|e| ApiError::conflict_on_unique(e, "username or email already taken"))?;

    let tokens = generate_token_pair(
        created.id,
        &created.username,
        created.role.as_str(),
        &state.jwt_secret,
    )
    .map_err(|e| ApiError::Internal(format!("token error: {e}")))?;

    tracing::info!(username = %created.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: created.into(),
            tokens,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let found = user::Entity::find()
        .filter(user::Column::Username.eq(&body.username))
        .one(&state.db)
        .await?;

    let invalid_credentials = || ApiError::Unauthorized("invalid credentials".into());

    let user = found.ok_or_else(invalid_credentials)?;

    let valid = verify_password(&body.password, &user.password_hash)
        .map_err(|e| ApiError::Internal(format!("verify error: {e}")))?;
    if !valid {
        return Err(invalid_credentials());
    }

    let tokens = generate_token_pair(
        user.id,
        &user.username,
        user.role.as_str(),
        &state.jwt_secret,
    )
    .map_err(|e| ApiError::Internal(format!("token error: {e}")))?;

    Ok(Json(AuthResponse {
        user: user.into(),
        tokens,
    }))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let claims = validate_token(&body.refresh_token, &state.jwt_secret)
        .map_err(|_| ApiError::Unauthorized("invalid or expired refresh token".into()))?;

    if claims.token_type != TokenType::Refresh {
        return Err(ApiError::Unauthorized("invalid token type".into()));
    }

    // Verify user still exists; role is re-read so a promotion or
    // demotion takes effect on the next refresh.
    let user = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    let tokens = generate_token_pair(
        user.id,
        &user.username,
        user.role.as_str(),
        &state.jwt_secret,
    )
    .map_err(|e| ApiError::Internal(format!("token error: {e}")))?;

    Ok(Json(tokens))
}

/// GET /api/auth/me (requires auth)
pub async fn me(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = user::Entity::find_by_id(auth_user.0.sub)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateMeRequest {
    pub bio: Option<String>,
}

/// PATCH /api/auth/me — update the authenticated user's profile
pub async fn update_me(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let found = user::Entity::find_by_id(auth_user.0.sub)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    let mut update: user::ActiveModel = found.into();
    if let Some(bio) = body.bio {
        update.bio = Set(Some(bio));
    }
    update.updated_at = Set(chrono::Utc::now().fixed_offset());

    let updated = update.update(&state.db).await?;
    Ok(Json(updated.into()))
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// PUT /api/auth/password — change the authenticated user's password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validate_password(&body.new_password)?;

    let found = user::Entity::find_by_id(auth_user.0.sub)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    let valid = verify_password(&body.current_password, &found.password_hash)
        .map_err(|e| ApiError::Internal(format!("verify error: {e}")))?;
    if !valid {
        return Err(ApiError::Unauthorized("incorrect password".into()));
    }

    let new_hash = hash_password(&body.new_password)
        .map_err(|e| ApiError::Internal(format!("hash error: {e}")))?;

    let user_id = found.id;
    let mut update: user::ActiveModel = found.into();
    update.password_hash = Set(new_hash);
    update.updated_at = Set(chrono::Utc::now().fixed_offset());
    update.update(&state.db).await?;

    tracing::info!(%user_id, "password changed");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_rules() {
        assert!(validate_username("critic42").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username("has@sign").is_err());
        assert!(validate_username("has/slash").is_err());
    }

    #[test]
    fn test_email_rules() {
        assert!(validate_email("critic@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("trailing@").is_err());
        assert!(validate_email("nodot@example").is_err());
    }

    #[test]
    fn test_password_rules() {
        assert!(validate_password("longenough").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"p".repeat(1025)).is_err());
    }

    #[test]
    fn test_user_response_hides_password_hash() {
        let model = user::Model {
            id: Uuid::new_v4(),
            username: "critic".into(),
            email: "critic@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            bio: None,
            role: UserRole::User,
            created_at: chrono::Utc::now().fixed_offset(),
            updated_at: chrono::Utc::now().fixed_offset(),
        };
        let resp: UserResponse = model.into();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["username"], "critic");
        assert_eq!(json["role"], "user");
        assert!(json.get("password_hash").is_none());
    }
}
