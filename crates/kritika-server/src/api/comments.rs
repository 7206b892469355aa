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
use std::sync::Arc;
use uuid::Uuid;

use super::reviews::{can_edit, usernames_by_id};
use super::titles::{PaginatedResponse, PaginationParams};
use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::validation::validate_text;
use kritika_db::entities::{comment, review};
use kritika_db::AppState;

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub review_id: Uuid,
    pub author_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_username: Option<String>,
    pub text: String,
    pub pub_date: chrono::DateTime<chrono::FixedOffset>,
}

impl From<comment::Model> for CommentResponse {
    fn from(c: comment::Model) -> Self {
        Self {
            id: c.id,
            review_id: c.review_id,
            author_id: c.author_id,
            author_username: None,
            text: c.text,
            pub_date: c.pub_date,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCommentRequest {
    pub text: String,
}

/// Fetch a review and check it hangs off the title in the path.
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

async fn find_comment(
    db: &DatabaseConnection,
    title_id: Uuid,
    review_id: Uuid,
    comment_id: Uuid,
) -> Result<comment::Model, ApiError> {
    find_review(db, title_id, review_id).await?;
    let found = comment::Entity::find_by_id(comment_id)
        .one(db)
        .await?
        .ok_or(ApiError::NotFound("comment"))?;
    if found.review_id != review_id {
        return Err(ApiError::NotFound("comment"));
    }
    Ok(found)
}

/// GET /api/titles/{title_id}/reviews/{review_id}/comments
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path((title_id, review_id)): Path<(Uuid, Uuid)>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<PaginatedResponse<CommentResponse>>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).min(100);

    find_review(&state.db, title_id, review_id).await?;

    let paginator = comment::Entity::find()
        .filter(comment::Column::ReviewId.eq(review_id))
        .order_by_asc(comment::Column::PubDate)
        .paginate(&state.db, per_page);

    let total = paginator.num_items().await?;
    let comments = paginator.fetch_page(page - 1).await?;

    let usernames =
        usernames_by_id(&state.db, comments.iter().map(|c| c.author_id).collect()).await?;

    Ok(Json(PaginatedResponse {
        data: comments
            .into_iter()
            .map(|c| {
                let username = usernames.get(&c.author_id).cloned();
                let mut resp = CommentResponse::from(c);
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

/// GET /api/titles/{title_id}/reviews/{review_id}/comments/{id}
pub async fn get_comment(
    State(state): State<Arc<AppState>>,
    Path((title_id, review_id, id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<CommentResponse>, ApiError> {
    let found = find_comment(&state.db, title_id, review_id, id).await?;

    let usernames = usernames_by_id(&state.db, vec![found.author_id]).await?;
    let username = usernames.get(&found.author_id).cloned();
    let mut resp = CommentResponse::from(found);
    resp.author_username = username;
    Ok(Json(resp))
}

/// POST /api/titles/{title_id}/reviews/{review_id}/comments
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((title_id, review_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    validate_text(&body.text)?;

    find_review(&state.db, title_id, review_id).await?;

    let created = comment::ActiveModel {
        id: Set(Uuid::new_v4()),
        review_id: Set(review_id),
        author_id: Set(auth_user.0.sub),
        text: Set(body.text),
        pub_date: Set(chrono::Utc::now().fixed_offset()),
    }
    .insert(&state.db)
    .await?;

    let mut resp = CommentResponse::from(created);
    resp.author_username = Some(auth_user.0.username);
    Ok((StatusCode::CREATED, Json(resp)))
}

/// PATCH /api/titles/{title_id}/reviews/{review_id}/comments/{id}
pub async fn update_comment(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((title_id, review_id, id)): Path<(Uuid, Uuid, Uuid)>,
    Json(body): Json<UpdateCommentRequest>,
) -> Result<Json<CommentResponse>, ApiError> {
    let existing = find_comment(&state.db, title_id, review_id, id).await?;

    if !can_edit(&auth_user, existing.author_id) {
        return Err(ApiError::Forbidden(
            "you can only edit your own comments".into(),
        ));
    }

    validate_text(&body.text)?;

    let author_id = existing.author_id;
    let mut active: comment::ActiveModel = existing.into();
    active.text = Set(body.text);
    let updated = active.update(&state.db).await?;

    let usernames = usernames_by_id(&state.db, vec![author_id]).await?;
    let username = usernames.get(&author_id).cloned();
    let mut resp = CommentResponse::from(updated);
    resp.author_username = username;
    Ok(Json(resp))
}

/// DELETE /api/titles/{title_id}/reviews/{review_id}/comments/{id}
pub async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
    Path((title_id, review_id, id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<StatusCode, ApiError> {
    let existing = find_comment(&state.db, title_id, review_id, id).await?;

    if !can_edit(&auth_user, existing.author_id) {
        return Err(ApiError::Forbidden(
            "you can only delete your own comments".into(),
        ));
    }

    comment::Entity::delete_by_id(existing.id)
        .exec(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_comment_model() -> comment::Model {
        comment::Model {
            id: Uuid::new_v4(),
            review_id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            text: "agreed, the ending lands".into(),
            pub_date: chrono::Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn test_comment_response_from_model() {
        let model = make_comment_model();
        let id = model.id;
        let review_id = model.review_id;
        let resp = CommentResponse::from(model);
        assert_eq!(resp.id, id);
        assert_eq!(resp.review_id, review_id);
        assert!(resp.author_username.is_none());
    }

    #[test]
    fn test_comment_response_serialization() {
        let mut resp = CommentResponse::from(make_comment_model());
        resp.author_username = Some("critic".into());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["text"], "agreed, the ending lands");
        assert_eq!(json["author_username"], "critic");
    }
}
