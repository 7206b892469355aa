use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use super::categories::CategoryResponse;
use super::genres::GenreResponse;
use crate::error::ApiError;
use crate::validation::{validate_name, validate_year};
use kritika_db::entities::{category, genre, review, title, title_genre};
use kritika_db::AppState;

#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

#[derive(Debug, Deserialize)]
pub struct TitleListParams {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    /// Category slug.
    pub category: Option<String>,
    /// Genre slug.
    pub genre: Option<String>,
    /// Substring match on the name.
    pub name: Option<String>,
    pub year: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct TitleResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub year: i32,
    /// Mean review score, absent until the first review lands.
    pub rating: Option<f64>,
    pub category: Option<CategoryResponse>,
    pub genres: Vec<GenreResponse>,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTitleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub year: i32,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub genre_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTitleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub year: Option<i32>,
    pub category_id: Option<Uuid>,
    pub genre_ids: Option<Vec<Uuid>>,
}

/// Mean score per title from raw (title_id, score) pairs.
fn mean_scores(scores: &[(Uuid, i16)]) -> HashMap<Uuid, f64> {
    let mut sums: HashMap<Uuid, (i64, u32)> = HashMap::new();
    for (title_id, score) in scores {
        let entry = sums.entry(*title_id).or_insert((0, 0));
        entry.0 += i64::from(*score);
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(title_id, (sum, count))| (title_id, sum as f64 / f64::from(count)))
        .collect()
}

/// Join a page of titles with their categories, genres and ratings.
async fn title_responses(
    db: &DatabaseConnection,
    titles: Vec<title::Model>,
) -> Result<Vec<TitleResponse>, ApiError> {
    let title_ids: Vec<Uuid> = titles.iter().map(|t| t.id).collect();

    // Batch-fetch categories
    let category_ids: Vec<Uuid> = titles
        .iter()
        .filter_map(|t| t.category_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let categories: HashMap<Uuid, category::Model> = if category_ids.is_empty() {
        HashMap::new()
    } else {
        category::Entity::find()
            .filter(category::Column::Id.is_in(category_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect()
    };

    // Batch-fetch genre links, then the genres themselves
    let links: Vec<title_genre::Model> = if title_ids.is_empty() {
        Vec::new()
    } else {
        title_genre::Entity::find()
            .filter(title_genre::Column::TitleId.is_in(title_ids.clone()))
            .all(db)
            .await?
    };
    let genre_ids: Vec<Uuid> = links
        .iter()
        .map(|l| l.genre_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let genres: HashMap<Uuid, genre::Model> = if genre_ids.is_empty() {
        HashMap::new()
    } else {
        genre::Entity::find()
            .filter(genre::Column::Id.is_in(genre_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|g| (g.id, g))
            .collect()
    };

    // Ratings are computed at read time, never stored
    let scores: Vec<(Uuid, i16)> = if title_ids.is_empty() {
        Vec::new()
    } else {
        review::Entity::find()
            .filter(review::Column::TitleId.is_in(title_ids))
            .select_only()
            .column(review::Column::TitleId)
            .column(review::Column::Score)
            .into_tuple()
            .all(db)
            .await?
    };
    let ratings = mean_scores(&scores);

    Ok(titles
        .into_iter()
        .map(|t| {
            let title_genres = links
                .iter()
                .filter(|l| l.title_id == t.id)
                .filter_map(|l| genres.get(&l.genre_id).cloned())
                .map(GenreResponse::from)
                .collect();
            TitleResponse {
                id: t.id,
                name: t.name,
                description: t.description,
                year: t.year,
                rating: ratings.get(&t.id).copied(),
                category: t
                    .category_id
                    .and_then(|id| categories.get(&id).cloned())
                    .map(CategoryResponse::from),
                genres: title_genres,
                created_at: t.created_at,
            }
        })
        .collect())
}

fn empty_page<T: Serialize>(page: u64, per_page: u64) -> PaginatedResponse<T> {
    PaginatedResponse {
        data: Vec::new(),
        total: 0,
        page,
        per_page,
        total_pages: 0,
    }
}

/// GET /api/titles
pub async fn list_titles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TitleListParams>,
) -> Result<Json<PaginatedResponse<TitleResponse>>, ApiError> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).min(100);

    let mut query = title::Entity::find().order_by_desc(title::Column::CreatedAt);

    if let Some(slug) = &params.category {
        let Some(cat) = category::Entity::find()
            .filter(category::Column::Slug.eq(slug))
            .one(&state.db)
            .await?
        else {
            return Ok(Json(empty_page(page, per_page)));
        };
        query = query.filter(title::Column::CategoryId.eq(cat.id));
    }

    if let Some(slug) = &params.genre {
        let Some(gen) = genre::Entity::find()
            .filter(genre::Column::Slug.eq(slug))
            .one(&state.db)
            .await?
        else {
            return Ok(Json(empty_page(page, per_page)));
        };
        let linked_ids: Vec<Uuid> = title_genre::Entity::find()
            .filter(title_genre::Column::GenreId.eq(gen.id))
            .all(&state.db)
            .await?
            .into_iter()
            .map(|l| l.title_id)
            .collect();
        if linked_ids.is_empty() {
            return Ok(Json(empty_page(page, per_page)));
        }
        query = query.filter(title::Column::Id.is_in(linked_ids));
    }

    if let Some(name) = &params.name {
        query = query.filter(title::Column::Name.contains(name));
    }

    if let Some(year) = params.year {
        query = query.filter(title::Column::Year.eq(year));
    }

    let paginator = query.paginate(&state.db, per_page);
    let total = paginator.num_items().await?;
    let titles = paginator.fetch_page(page - 1).await?;

    Ok(Json(PaginatedResponse {
        data: title_responses(&state.db, titles).await?,
        total,
        page,
        per_page,
        total_pages: total.div_ceil(per_page),
    }))
}

/// GET /api/titles/{id}
pub async fn get_title(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TitleResponse>, ApiError> {
    let found = title::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("title"))?;

    let mut responses = title_responses(&state.db, vec![found]).await?;
    Ok(Json(responses.remove(0)))
}

/// Check that every referenced genre id resolves.
async fn resolve_genres(db: &DatabaseConnection, genre_ids: &[Uuid]) -> Result<(), ApiError> {
    if genre_ids.is_empty() {
        return Ok(());
    }
    let found = genre::Entity::find()
        .filter(genre::Column::Id.is_in(genre_ids.to_vec()))
        .all(db)
        .await?;
    if found.len() != genre_ids.len() {
        return Err(ApiError::NotFound("genre"));
    }
    Ok(())
}

/// POST /api/titles (admin)
pub async fn create_title(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTitleRequest>,
) -> Result<(StatusCode, Json<TitleResponse>), ApiError> {
    let name = body.name.unwrap_or_else(|| "default name".to_string());
    validate_name(&name)?;
    validate_year(body.year)?;

    if let Some(category_id) = body.category_id {
        category::Entity::find_by_id(category_id)
            .one(&state.db)
            .await?
            .ok_or(ApiError::NotFound("category"))?;
    }

    let genre_ids: Vec<Uuid> = body
        .genre_ids
        .into_iter()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    resolve_genres(&state.db, &genre_ids).await?;

    // The title row and its genre links land together or not at all.
    let txn = state.db.begin().await?;

    let created = title::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(body.description),
        year: Set(body.year),
        category_id: Set(body.category_id),
        created_at: Set(chrono::Utc::now().fixed_offset()),
    }
    .insert(&txn)
    .await?;

    if !genre_ids.is_empty() {
        let links = genre_ids.iter().map(|genre_id| title_genre::ActiveModel {
            title_id: Set(created.id),
            genre_id: Set(*genre_id),
        });
        title_genre::Entity::insert_many(links).exec(&txn).await?;
    }

    txn.commit().await?;

    let mut responses = title_responses(&state.db, vec![created]).await?;
    Ok((StatusCode::CREATED, Json(responses.remove(0))))
}

/// PATCH /api/titles/{id} (admin)
pub async fn update_title(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateTitleRequest>,
) -> Result<Json<TitleResponse>, ApiError> {
    let existing = title::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("title"))?;

    if let Some(name) = &body.name {
        validate_name(name)?;
    }
    if let Some(year) = body.year {
        validate_year(year)?;
    }
    if let Some(category_id) = body.category_id {
        category::Entity::find_by_id(category_id)
            .one(&state.db)
            .await?
            .ok_or(ApiError::NotFound("category"))?;
    }
    let genre_ids: Option<Vec<Uuid>> = body.genre_ids.map(|ids| {
        ids.into_iter()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect()
    });
    if let Some(ids) = &genre_ids {
        resolve_genres(&state.db, ids).await?;
    }

    let txn = state.db.begin().await?;

    let mut active: title::ActiveModel = existing.into();
    if let Some(name) = body.name {
        active.name = Set(name);
    }
    if let Some(description) = body.description {
        active.description = Set(Some(description));
    }
    if let Some(year) = body.year {
        active.year = Set(year);
    }
    if let Some(category_id) = body.category_id {
        active.category_id = Set(Some(category_id));
    }
    let updated = active.update(&txn).await?;

    // Replacing the genre set swaps the join rows atomically with the update
    if let Some(ids) = genre_ids {
        title_genre::Entity::delete_many()
            .filter(title_genre::Column::TitleId.eq(updated.id))
            .exec(&txn)
            .await?;
        if !ids.is_empty() {
            let links = ids.iter().map(|genre_id| title_genre::ActiveModel {
                title_id: Set(updated.id),
                genre_id: Set(*genre_id),
            });
            title_genre::Entity::insert_many(links).exec(&txn).await?;
        }
    }

    txn.commit().await?;

    let mut responses = title_responses(&state.db, vec![updated]).await?;
    Ok(Json(responses.remove(0)))
}

/// DELETE /api/titles/{id} (admin)
///
/// Reviews and their comments go with the title (FK cascade).
pub async fn delete_title(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    title::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or(ApiError::NotFound("title"))?;

    title::Entity::delete_by_id(id).exec(&state.db).await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_scores_basic() {
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        let ratings = mean_scores(&[(t1, 8), (t1, 9), (t2, 4)]);
        assert_eq!(ratings[&t1], 8.5);
        assert_eq!(ratings[&t2], 4.0);
    }

    #[test]
    fn test_mean_scores_empty() {
        let ratings = mean_scores(&[]);
        assert!(ratings.is_empty());
    }

    #[test]
    fn test_mean_scores_single_title_many_reviews() {
        let t = Uuid::new_v4();
        let scores: Vec<(Uuid, i16)> = (1..=10).map(|s| (t, s)).collect();
        let ratings = mean_scores(&scores);
        assert_eq!(ratings[&t], 5.5);
    }

    #[test]
    fn test_title_response_serialization() {
        let resp = TitleResponse {
            id: Uuid::new_v4(),
            name: "Solaris".into(),
            description: None,
            year: 1972,
            rating: Some(9.0),
            category: None,
            genres: Vec::new(),
            created_at: chrono::Utc::now().fixed_offset(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["name"], "Solaris");
        assert_eq!(json["year"], 1972);
        assert_eq!(json["rating"], 9.0);
        assert!(json["category"].is_null());
        assert_eq!(json["genres"], serde_json::json!([]));
    }

    #[test]
    fn test_create_request_defaults_genres_to_empty() {
        let body: CreateTitleRequest =
            serde_json::from_str(r#"{"name": "Solaris", "year": 1972}"#).unwrap();
        assert!(body.genre_ids.is_empty());
        assert!(body.category_id.is_none());
    }

    #[test]
    fn test_empty_page_shape() {
        let page: PaginatedResponse<TitleResponse> = empty_page(3, 20);
        assert_eq!(page.total, 0);
        assert_eq!(page.page, 3);
        assert!(page.data.is_empty());
    }
}
