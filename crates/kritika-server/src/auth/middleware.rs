use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::EntityTrait;
use serde_json::json;
use std::sync::Arc;

use super::jwt::{validate_token, Claims, TokenType};
use kritika_db::entities::user::{self, UserRole};
use kritika_db::AppState;

/// Extension type to access authenticated user claims in handlers
#[derive(Clone, Debug)]
pub struct AuthUser(pub Claims);

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message })),
    )
        .into_response()
}

fn forbidden(message: &str) -> Response {
    (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
}

/// Middleware: require valid access token
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized("Missing or invalid Authorization header");
    };

    match validate_token(token, &state.jwt_secret) {
        Ok(claims) if claims.token_type == TokenType::Access => {
            request.extensions_mut().insert(AuthUser(claims));
            next.run(request).await
        }
        Ok(_) => unauthorized("Invalid token type, access token required"),
        Err(_) => unauthorized("Invalid or expired token"),
    }
}

/// Load the caller's role from the database. Privileged access is decided
/// on the stored role, not on whatever the JWT claims: a demoted user
/// keeps a valid token until it expires.
async fn stored_role(state: &AppState, claims: &Claims) -> Option<UserRole> {
    let user_id = claims.sub;
    let db = state.db.clone();
    tokio::spawn(async move {
        user::Entity::find_by_id(user_id)
            .one(&db)
            .await
            .ok()
            .flatten()
            .map(|u| u.role)
    })
    .await
    .unwrap_or(None)
}

/// Middleware: require the admin role
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(&request) else {
        return unauthorized("Missing or invalid Authorization header");
    };

    match validate_token(token, &state.jwt_secret) {
        Ok(claims) if claims.token_type == TokenType::Access => {
            match stored_role(&state, &claims).await {
                Some(UserRole::Admin) => {
                    request.extensions_mut().insert(AuthUser(claims));
                    next.run(request).await
                }
                Some(_) => forbidden("Admin access required"),
                None => unauthorized("User no longer exists"),
            }
        }
        _ => unauthorized("Invalid or expired token"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_token_pair;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware as axum_mw,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            db: sea_orm::DatabaseConnection::Disconnected,
            jwt_secret: "test-middleware-secret".to_string(),
        })
    }

    async fn ok_handler() -> &'static str {
        "OK"
    }

    fn auth_app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/protected", get(ok_handler))
            .layer(axum_mw::from_fn_with_state(state.clone(), require_auth))
            .with_state(state)
    }

    fn admin_app(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/admin", get(ok_handler))
            .layer(axum_mw::from_fn_with_state(state.clone(), require_admin))
            .with_state(state)
    }

    #[tokio::test]
    async fn test_require_auth_no_header() {
        let app = auth_app(test_state());

        let req = HttpRequest::builder()
            .uri("/protected")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_auth_invalid_token() {
        let app = auth_app(test_state());

        let req = HttpRequest::builder()
            .uri("/protected")
            .header("Authorization", "Bearer invalid-token")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_auth_valid_access_token() {
        let state = test_state();
        let app = auth_app(state.clone());

        let pair =
            generate_token_pair(uuid::Uuid::new_v4(), "reviewer", "user", &state.jwt_secret)
                .unwrap();

        let req = HttpRequest::builder()
            .uri("/protected")
            .header("Authorization", format!("Bearer {}", pair.access_token))
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_require_auth_refresh_token_rejected() {
        let state = test_state();
        let app = auth_app(state.clone());

        let pair =
            generate_token_pair(uuid::Uuid::new_v4(), "reviewer", "user", &state.jwt_secret)
                .unwrap();

        let req = HttpRequest::builder()
            .uri("/protected")
            .header("Authorization", format!("Bearer {}", pair.refresh_token))
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_auth_no_bearer_prefix() {
        let app = auth_app(test_state());

        let req = HttpRequest::builder()
            .uri("/protected")
            .header("Authorization", "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_admin_no_header() {
        let app = admin_app(test_state());

        let req = HttpRequest::builder()
            .uri("/admin")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_admin_role_is_verified_against_db() {
        // With a Disconnected DB the stored-role lookup fails, so even a
        // token claiming "admin" must not get through.
        let state = test_state();
        let app = admin_app(state.clone());

        let pair = generate_token_pair(uuid::Uuid::new_v4(), "admin", "admin", &state.jwt_secret)
            .unwrap();

        let req = HttpRequest::builder()
            .uri("/admin")
            .header("Authorization", format!("Bearer {}", pair.access_token))
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_admin_invalid_token() {
        let app = admin_app(test_state());

        let req = HttpRequest::builder()
            .uri("/admin")
            .header("Authorization", "Bearer garbage")
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_auth_wrong_secret() {
        let app = auth_app(test_state());

        let pair =
            generate_token_pair(uuid::Uuid::new_v4(), "reviewer", "user", "wrong-secret").unwrap();

        let req = HttpRequest::builder()
            .uri("/protected")
            .header("Authorization", format!("Bearer {}", pair.access_token))
            .body(Body::empty())
            .unwrap();

        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
