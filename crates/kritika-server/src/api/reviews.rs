use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::titles::{PaginatedResponse, PaginationParams};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::validation::{validate_score, validate_text};
use kritika_db::entities::{review, title, user};
use kritika_db::AppState;

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub title_id: Uuid,
    pub author_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_username: Option<String>,
    pub text: String,
    pub score: i16,
    pub pub_date: chrono::DateTime<chrono::FixedOffset>,
}

impl From<review::Model> for ReviewResponse {
    fn from(r: review::Model) -> Self {
        Self {
            id: r.id,
            title_id: r.title_id,
            author_id: r.author_id,
            author_username: None,
            text: r.text,
            score: r.score,
            pub_date: r.pub_date,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReviewRequest {
    pub text: String,
    pub score: i16,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReviewRequest {
    pub text: Option<String>,
    pub score: Option<i16>,
}

/// Authors may touch their own records; moderators and admins anyone's.
pub(crate) fn can_edit(auth: &AuthUser, author_id: Uuid) -> bool {
    auth.0.sub == author_id || matches!(auth.0.role.as_str(), "admin" | "moderator")
}

/// Batch-fetch usernames for a page of records.
pub(crate) async fn usernames_by_id(
    db: &DatabaseConnection,
    author_ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, String>, ApiError> {
    let unique: Vec<Uuid> = author_ids
        .into_iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    if unique.is_empty() {
        return Ok(HashMap::new());
    }
    Ok(user::Entity::find()
        .filter(user::Column::Id.is_in(unique))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect())
}

async fn find_title(db: &DatabaseConnection, title_id: Uuid) -> Result<title::Model, ApiError> {
    title::Entity::find_by_id(title_id)
        .one(db)
        .await?
        .ok_or(ApiError::NotFound("title"))
}

/// Fetch a review and check it actually hangs off the title in the path.
async fn find_review(
    db: &DatabaseConnection,
    title_id: Uuid,
    review_id: Uuid,
) -> Result<review::Model, ApiError> {
    let found = review::Entity::find_by_id(review_id)
        .one(db)
        .await?
        .ok_or(ApiError::NotFound("review"))?;
    if found.title_id != title_id {
        return Err(ApiError::NotFound("review"));
    }
    Ok(found)
}

/// GET /api/titles/{title_id}/reviews
pub async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(title_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<ReviewResponse>>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).min(100);

    find_title(&state.db, title_id).await?;

    let paginator = review::Entity::find()
        .filter(review::Column::TitleId.eq(title_id))
        .order_by_desc(review::Column::PubDate)
        .paginate(&state.db, per_page);

    let total = paginator.num_items().await?;
    let reviews = paginator.fetch_page(page - 1).await?;

    let usernames =
        usernames_by_id(&state.db, reviews.iter().map(|r| r.author_id).collect()).await?;

    Ok(Json(PaginatedResponse {
        data: reviews
            .into_iter()
            .map(|r| {
                let username = usernames.get(&r.author_id).cloned();
                let mut resp = ReviewResponse::from(r);
                resp.author_username = username;
                resp
            })
            .collect(),
        total,
        page,
        per_page,
        total_pages: total.div_ceil(per_page),
    }))
}

/// GET /api/titles/{title_id}/reviews/{id}
pub async fn get_review(
    State(state): State<Arc<AppState>>,
    Path((title_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let found = find_review(&state.db, title_id, id).await?;

    let usernames = usernames_by_id(&state.db, vec![found.author_id]).await?;
    let username = usernames.get(&found.author_id).cloned();
    let mut resp = ReviewResponse::from(found);
    resp.author_username = username;
    Ok(Json(resp))
}

/// POST /api/titles/{title_id}/reviews
///
/// The author comes from the verified token, never from the body, and
/// `pub_date` is set here, once.
pub async fn create_review(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path(title_id): Path<Uuid>,
    Json(body): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), ApiError> {
    validate_text(&body.text)?;
    validate_score(body.score)?;

    find_title(&state.db, title_id).await?;

    let new_review = review::ActiveModel {
        id: Set(Uuid::new_v4()),
        title_id: Set(title_id),
        author_id: Set(auth_user.0.sub),
        text: Set(body.text),
        score: Set(body.score),
        pub_date: Set(chrono::Utc::now().fixed_offset()),
    };

    // The composite unique index on (title_id, author_id) decides the
    // race between two identical requests.
    let created = new_review
        .insert(&state.db)
        .await
        .map_err(|e| ApiError::conflict_on_unique(e, "you have already reviewed this title"))?;

    let mut resp = ReviewResponse::from(created);
    resp.author_username = Some(auth_user.0.username);
    Ok((StatusCode::CREATED, Json(resp)))
}

/// PATCH /api/titles/{title_id}/reviews/{id}
///
/// Only text and score are mutable; `pub_date` stays as written.
pub async fn update_review(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((title_id, id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateReviewRequest>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let existing = find_review(&state.db, title_id, id).await?;

    if !can_edit(&auth_user, existing.author_id) {
        return Err(ApiError::Forbidden(
            "you can only edit your own reviews".into(),
        ));
    }

    if let Some(text) = &body.text {
        validate_text(text)?;
    }
    if let Some(score) = body.score {
        validate_score(score)?;
    }

    let author_id = existing.author_id;
    let mut active: review::ActiveModel = existing.into();
    if let Some(text) = body.text {
        active.text = Set(text);
    }
    if let Some(score) = body.score {
        active.score = Set(score);
    }
    let updated = active.update(&state.db).await?;

    let usernames = usernames_by_id(&state.db, vec![author_id]).await?;
    let username = usernames.get(&author_id).cloned();
    let mut resp = ReviewResponse::from(updated);
    resp.author_username = username;
    Ok(Json(resp))
}

/// DELETE /api/titles/{title_id}/reviews/{id}
///
/// Comments under the review go with it (FK cascade).
pub async fn delete_review(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((title_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let existing = find_review(&state.db, title_id, id).await?;

    if !can_edit(&auth_user, existing.author_id) {
        return Err(ApiError::Forbidden(
            "you can only delete your own reviews".into(),
        ));
    }

    review::Entity::delete_by_id(existing.id)
        .exec(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{Claims, TokenType};

    fn auth_user(sub: Uuid, role: &str) -> AuthUser {
        AuthUser(Claims {
            sub,
            username: "critic".into(),
            role: role.into(),
            token_type: TokenType::Access,
            iat: 0,
            exp: 0,
        })
    }

    fn make_review_model(author_id: Uuid) -> review::Model {
        review::Model {
            id: Uuid::new_v4(),
            title_id: Uuid::new_v4(),
            author_id,
            text: "a slow burn that pays off".into(),
            score: 8,
            pub_date: chrono::Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn test_author_can_edit_own_review() {
        let author = Uuid::new_v4();
        assert!(can_edit(&auth_user(author, "user"), author));
    }

    #[test]
    fn test_other_user_cannot_edit() {
        assert!(!can_edit(&auth_user(Uuid::new_v4(), "user"), Uuid::new_v4()));
    }

    #[test]
    fn test_moderator_and_admin_can_edit_any() {
        let author = Uuid::new_v4();
        assert!(can_edit(&auth_user(Uuid::new_v4(), "moderator"), author));
        assert!(can_edit(&auth_user(Uuid::new_v4(), "admin"), author));
    }

    #[test]
    fn test_review_response_from_model() {
        let author = Uuid::new_v4();
        let model = make_review_model(author);
        let id = model.id;
        let resp = ReviewResponse::from(model);
        assert_eq!(resp.id, id);
        assert_eq!(resp.author_id, author);
        assert_eq!(resp.score, 8);
        assert!(resp.author_username.is_none());
    }

    #[test]
    fn test_review_response_hides_absent_username() {
        let resp = ReviewResponse::from(make_review_model(Uuid::new_v4()));
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("author_username").is_none());
        assert_eq!(json["score"], 8);
    }
}
