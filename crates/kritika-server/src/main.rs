use axum::{
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use kritika_db::AppState;

mod api;
mod auth;
mod error;
mod validation;

#[derive(Serialize)]
struct ApiStatus {
    status: &'static str,
    version: &'static str,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Database connection
    let db_config = kritika_db::DatabaseConfig::from_env();
    tracing::info!("connecting to database...");
    let db = kritika_db::connect(&db_config)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("running database migrations...");
    kritika_migration::Migrator::up(&db, None)
        .await
        .expect("failed to run migrations");
    tracing::info!("migrations complete");

    let jwt_secret = std::env::var("JWT_SECRET")
        .unwrap_or_else(|_| "dev-secret-change-me-in-production".to_string());

    // SECURITY: warn if JWT secret is the default fallback
    if jwt_secret == "dev-secret-change-me-in-production" {
        tracing::error!(
            "JWT_SECRET is set to a known default value! \
             Set JWT_SECRET to a strong random string (≥32 chars) in production."
        );
        if std::env::var("KRITIKA_ENV").unwrap_or_default() == "production" {
            panic!("Refusing to start: JWT_SECRET must be set to a secure value in production.");
        }
    }

    let state = Arc::new(AppState { db, jwt_secret });

    // Rate limiter for auth endpoints: 10 requests per 60 seconds per IP
    let auth_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(6)
            .burst_size(10)
            .finish()
            .expect("failed to build rate limiter config"),
    );

    // Auth routes (public, rate-limited)
    let auth_public = Router::new()
        .route("/register", post(auth::routes::register))
        .route("/login", post(auth::routes::login))
        .route("/refresh", post(auth::routes::refresh))
        .layer(GovernorLayer::new(auth_governor_conf));

    // Auth routes (protected)
    let auth_protected = Router::new()
        .route(
            "/me",
            get(auth::routes::me).patch(auth::routes::update_me),
        )
        .route(
            "/password",
            axum::routing::put(auth::routes::change_password),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    // Public read-only API routes
    let public_api = Router::new()
        .route("/categories", get(api::categories::list_categories))
        .route("/genres", get(api::genres::list_genres))
        .route("/titles", get(api::titles::list_titles))
        .route("/titles/{title_id}", get(api::titles::get_title))
        .route(
            "/titles/{title_id}/reviews",
            get(api::reviews::list_reviews),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}",
            get(api::reviews::get_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            get(api::comments::list_comments),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
            get(api::comments::get_comment),
        );

    // Protected API routes (any authenticated user)
    let protected_api = Router::new()
        .route(
            "/titles/{title_id}/reviews",
            post(api::reviews::create_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}",
            axum::routing::patch(api::reviews::update_review)
                .delete(api::reviews::delete_review),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            post(api::comments::create_comment),
        )
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
            axum::routing::patch(api::comments::update_comment)
                .delete(api::comments::delete_comment),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    // Admin routes: catalogue and user management
    let admin_api = Router::new()
        .route("/categories", post(api::categories::create_category))
        .route(
            "/categories/{slug}",
            axum::routing::delete(api::categories::delete_category),
        )
        .route("/genres", post(api::genres::create_genre))
        .route(
            "/genres/{slug}",
            axum::routing::delete(api::genres::delete_genre),
        )
        .route("/titles", post(api::titles::create_title))
        .route(
            "/titles/{title_id}",
            axum::routing::patch(api::titles::update_title).delete(api::titles::delete_title),
        )
        .route(
            "/users",
            get(api::users::list_users).post(api::users::create_user),
        )
        .route(
            "/users/{id}",
            get(api::users::get_user)
                .patch(api::users::update_user)
                .delete(api::users::delete_user),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_admin,
        ));

    let api_routes = Router::new()
        .nest("/auth", auth_public.merge(auth_protected))
        .merge(public_api)
        .merge(protected_api)
        .merge(admin_api);

    // CORS configuration — restrict to configured origins
    let cors = {
        let allowed_origins_str = std::env::var("CORS_ORIGINS").unwrap_or_default();
        let origins: Vec<HeaderValue> = allowed_origins_str
            .split(',')
            .filter_map(|s| HeaderValue::from_str(s.trim()).ok())
            .collect();
        let layer = if origins.is_empty() {
            tracing::warn!(
                "CORS_ORIGINS not set — defaulting to restrictive CORS. \
                 Set CORS_ORIGINS=http://localhost:3000 for dev."
            );
            CorsLayer::new().allow_origin(AllowOrigin::exact(HeaderValue::from_static(
                "https://localhost",
            )))
        } else {
            tracing::info!("CORS allowed origins: {:?}", origins);
            CorsLayer::new().allow_origin(origins)
        };
        layer.allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::PATCH,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any)
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!(%addr, "server started");

    axum::serve(
        tokio::net::TcpListener::bind(addr).await.unwrap(),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

async fn healthz() -> Json<ApiStatus> {
    Json(ApiStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
