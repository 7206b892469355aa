use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::categories::ReferenceParams;
use super::titles::PaginatedResponse;
use crate::error::ApiError;
use crate::validation::{validate_name, validate_slug};
use kritika_db::entities::genre;
use kritika_db::AppState;

#[derive(Debug, Serialize)]
pub struct GenreResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

impl From<genre::Model> for GenreResponse {
    fn from(g: genre::Model) -> Self {
        Self {
            id: g.id,
            name: g.name,
            slug: g.slug,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateGenreRequest {
    pub name: String,
    pub slug: String,
}

/// GET /api/genres
pub async fn list_genres(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReferenceParams>,
) -> Result<Json<PaginatedResponse<GenreResponse>>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).min(100);

    let mut query = genre::Entity::find().order_by_asc(genre::Column::Name);
    if let Some(search) = &params.search {
        query = query.filter(genre::Column::Name.contains(search));
    }

    let paginator = query.paginate(&state.db, per_page);
    let total = paginator.num_items().await?;
    let genres = paginator.fetch_page(page - 1).await?;

    Ok(Json(PaginatedResponse {
        data: genres.into_iter().map(GenreResponse::from).collect(),
        total,
        page,
        per_page,
        total_pages: total.div_ceil(per_page),
    }))
}

/// POST /api/genres (admin)
pub async fn create_genre(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateGenreRequest>,
) -> Result<(StatusCode, Json<GenreResponse>), ApiError> {
    validate_name(&body.name)?;
    validate_slug(&body.slug)?;

    let new_genre = genre::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(body.name),
        slug: Set(body.slug),
        created_at: Set(chrono::Utc::now().fixed_offset()),
    };

    let created = new_genre
        .insert(&state.db)
        .await
        .map_err(|e| ApiError::conflict_on_unique(e, "a genre with this slug already exists"))?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// DELETE /api/genres/{slug} (admin)
///
/// Titles keep existing; only the join rows disappear (FK `CASCADE` on
/// the join table).
pub async fn delete_genre(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    let found = genre::Entity::find()
        .filter(genre::Column::Slug.eq(&slug))
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("genre"))?;

    genre::Entity::delete_by_id(found.id).exec(&state.db).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genre_response_serialization() {
        let model = genre::Model {
            id: Uuid::new_v4(),
            name: "Science Fiction".into(),
            slug: "sci-fi".into(),
            created_at: chrono::Utc::now().fixed_offset(),
        };
        let resp = GenreResponse::from(model);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["name"], "Science Fiction");
        assert_eq!(json["slug"], "sci-fi");
    }
}
