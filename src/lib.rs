pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::UploadConfig;
use crate::services::attachment::AttachmentTracker;
use crate::services::reclaim::SafeDeletePolicy;
use crate::services::scheduler::DeferredDeletionScheduler;
use crate::services::storage::StorageService;
use crate::services::upload_store::UploadStore;
use crate::utils::validation::UploadPolicies;
use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::uploads::upload_file,
        api::handlers::attachments::attach_uploads,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            models::UploadResponse,
            models::AttachRequest,
            models::AttachResponse,
            entities::uploads::UploadKind,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "uploads", description = "Upload ingest and attachment"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub store: UploadStore,
    pub policy: SafeDeletePolicy,
    pub scheduler: DeferredDeletionScheduler,
    pub tracker: AttachmentTracker,
    pub policies: Arc<UploadPolicies>,
    pub config: UploadConfig,
}

impl AppState {
    /// Wires the upload lifecycle components around one store and one storage backend
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        config: UploadConfig,
    ) -> Self {
        let store = UploadStore::new(db.clone());
        let policy = SafeDeletePolicy::new(storage.clone(), config.safety_mode);
        let scheduler =
            DeferredDeletionScheduler::new(store.clone(), policy.clone(), config.delete_delay());
        let tracker = AttachmentTracker::new(store.clone()).with_scheduler(scheduler.clone());

        Self {
            db,
            storage,
            store,
            policy,
            scheduler,
            tracker,
            policies: Arc::new(UploadPolicies::default()),
            config,
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/upload/:kind",
            post(api::handlers::uploads::upload_file)
                .layer(axum::extract::DefaultBodyLimit::max(
                    state.policies.largest_file_size() + 1024 * 1024, // multipart overhead
                ))
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/uploads/attach",
            post(api::handlers::attachments::attach_uploads).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
