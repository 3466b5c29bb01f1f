pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::storage::ObjectStorage;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::uploads::upload_file,
        api::handlers::uploads::list_uploads,
        api::handlers::uploads::get_upload,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::uploads::UploadResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "uploads", description = "File upload endpoints"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub upload_service: Arc<UploadService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn ObjectStorage>, config: AppConfig) -> Self {
        let upload_service = Arc::new(UploadService::new(db.clone(), storage, config.clone()));

        Self {
            db,
            upload_service,
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD))
        .unwrap_or(usize::MAX);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/uploads",
            post(api::handlers::uploads::upload_file).get(api::handlers::uploads::list_uploads),
        )
        .route("/uploads/:id", get(api::handlers::uploads::get_upload))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}
