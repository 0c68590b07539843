use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::predicate::NotForContentType;
use tower_http::compression::{DefaultPredicate, Predicate};
use tower_http::{
    compression::CompressionLayer, decompression::DecompressionLayer, trace::TraceLayer,
};
use tower_sessions::cookie::time::Duration;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use state::AppState;

use crate::controllers::{admin, api, auth as auth_routes, client, media};

pub mod access;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod controllers;
pub mod dashboard;
pub mod datasource;
pub mod errors;
pub mod ledger;
pub mod models;
pub mod state;
pub mod storage;
pub mod streaming;

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth_routes::admin_login))
        .route("/logout", post(auth_routes::logout))
        .route("/me", get(auth_routes::admin_me))
        .route("/password", post(auth_routes::change_password))
        .route("/forgot-password", post(auth_routes::forgot_password))
        .route("/reset-password", post(auth_routes::reset_password))
        .route("/dashboard", get(admin::dashboard))
        .route("/films", get(admin::list_films).post(admin::create_film))
        .route(
            "/films/:id",
            get(admin::get_film)
                .put(admin::update_film)
                .delete(admin::delete_film),
        )
        .route("/series", get(admin::list_series).post(admin::create_series))
        .route(
            "/series/:id",
            get(admin::get_series)
                .put(admin::update_series)
                .delete(admin::delete_series),
        )
        .route(
            "/series/:id/seasons",
            get(admin::list_seasons).post(admin::create_season),
        )
        .route(
            "/seasons/:id",
            get(admin::get_season)
                .put(admin::update_season)
                .delete(admin::delete_season),
        )
        .route(
            "/seasons/:id/episodes",
            get(admin::list_episodes).post(admin::create_episode),
        )
        .route(
            "/episodes/:id",
            put(admin::update_episode).delete(admin::delete_episode),
        )
        .route("/transactions", get(admin::list_transactions))
        .route("/transactions/stats", get(admin::transaction_stats))
        .route("/transactions/reset", post(admin::reset_transactions))
        .route("/transactions/:id/confirm", post(admin::confirm_transaction))
        .route("/transactions/:id/reject", post(admin::reject_transaction))
        .route("/clients", post(admin::create_client))
}

fn client_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth_routes::client_login))
        .route("/logout", post(auth_routes::logout))
        .route("/me", get(auth_routes::client_me))
        .route("/library", get(client::library))
        .route("/watch/film/:id", get(client::watch_film))
        .route("/watch/episode/:id", get(client::watch_episode))
        .route("/download/:content_type/:id", get(client::download))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/transactions", post(api::create_transaction))
        .route("/transactions/screenshots", post(api::upload_screenshot))
        .route("/data/export", get(api::export))
        .route("/bot/films", get(api::bot_films))
        .route("/bot/series", get(api::bot_series))
}

pub fn router(app_state: AppState) -> Router {
    let compression_predicate =
        DefaultPredicate::new().and(NotForContentType::const_new("video/"));
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(app_state.config.session_secure_cookie)
        .with_expiry(Expiry::OnInactivity(Duration::minutes(
            app_state.config.session_idle_minutes,
        )));
    let body_limit = DefaultBodyLimit::max(app_state.config.max_upload_size);

    Router::new()
        .nest("/admin", admin_routes())
        .nest("/client", client_routes())
        .nest("/api", api_routes())
        .route("/stream/:content_type/:id", get(media::stream))
        .route("/media/thumbnails/:name", get(media::thumbnail))
        .route("/media/screenshots/:name", get(media::screenshot))
        .route("/health", get(|| async { "ok" }))
        .with_state(app_state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new().compress_when(compression_predicate))
                .layer(DecompressionLayer::new())
                .layer(session_layer)
                .layer(body_limit),
        )
}

pub async fn serve(app_state: AppState) -> Result<()> {
    let address = app_state.config.bind_address;
    let app = router(app_state);

    let listener = tokio::net::TcpListener::bind(address).await?;
    tracing::info!("listening on {}", address);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;

    fn app() -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        router(AppState::with_pool(pool, Config::default()))
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_routes_require_a_session() {
        let response = app()
            .oneshot(
                Request::get("/admin/dashboard")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_streams_require_a_session() {
        let response = app()
            .oneshot(
                Request::get(format!("/stream/film/{}", uuid::Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_screenshots_require_an_admin_session() {
        let response = app()
            .oneshot(
                Request::get("/media/screenshots/receipt.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_transactions_reject_unknown_screenshots() {
        let response = app()
            .oneshot(
                Request::post("/api/transactions")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"user_id": 42, "amount": 5000, "payment_method": "wave", "payment_screenshot": "forged.png"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_thumbnail_names_cannot_escape() {
        let response = app()
            .oneshot(
                Request::get("/media/thumbnails/..")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
