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

use super::titles::PaginatedResponse;
use crate::error::ApiError;
use crate::validation::{validate_name, validate_slug};
use kritika_db::entities::category;
use kritika_db::AppState;

/// List parameters shared by the reference entities (categories, genres).
#[derive(Debug, Deserialize)]
pub struct ReferenceParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Substring match on the name.
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
}

impl From<category::Model> for CategoryResponse {
    fn from(c: category::Model) -> Self {
        Self {
            id: c.id,
            name: c.name,
            slug: c.slug,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: String,
}

/// GET /api/categories
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReferenceParams>,
) -> Result<Json<PaginatedResponse<CategoryResponse>>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).min(100);

    let mut query = category::Entity::find().order_by_asc(category::Column::Name);
    if let Some(search) = &params.search {
        query = query.filter(category::Column::Name.contains(search));
    }

    let paginator = query.paginate(&state.db, per_page);
    let total = paginator.num_items().await?;
    let categories = paginator.fetch_page(page - 1).await?;

    Ok(Json(PaginatedResponse {
        data: categories.into_iter().map(CategoryResponse::from).collect(),
        total,
        page,
        per_page,
        total_pages: total.div_ceil(per_page),
    }))
}

/// POST /api/categories (admin)
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<CategoryResponse>), ApiError> {
    validate_name(&body.name)?;
    validate_slug(&body.slug)?;

    let new_category = category::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(body.name),
        slug: Set(body.slug),
        created_at: Set(chrono::Utc::now().fixed_offset()),
    };

    let created = new_category
        .insert(&state.db)
        .await
        .map_err(|e| ApiError::conflict_on_unique(e, "a category with this slug already exists"))?;

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// DELETE /api/categories/{slug} (admin)
///
/// Titles referencing the category keep existing with their category
/// cleared (FK `SET NULL`).
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    let found = category::Entity::find()
        .filter(category::Column::Slug.eq(&slug))
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("category"))?;

    category::Entity::delete_by_id(found.id)
        .exec(&state.db)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_category_model() -> category::Model {
        category::Model {
            id: Uuid::new_v4(),
            name: "Films".into(),
            slug: "films".into(),
            created_at: chrono::Utc::now().fixed_offset(),
        }
    }

    #[test]
    fn test_category_response_from_model() {
        let model = make_category_model();
        let id = model.id;
        let resp = CategoryResponse::from(model);
        assert_eq!(resp.id, id);
        assert_eq!(resp.name, "Films");
        assert_eq!(resp.slug, "films");
    }

    #[test]
    fn test_category_response_serialization() {
        let resp = CategoryResponse::from(make_category_model());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["name"], "Films");
        assert_eq!(json["slug"], "films");
        assert!(json.get("created_at").is_none());
    }
}
