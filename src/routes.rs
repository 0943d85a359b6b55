// routes.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{account::account_handler, admin::admin_handler, auth::auth_handler, projects::projects_handler},
    middleware::{auth, require_admin},
    AppState,
};

async fn health_check(Extension(app_state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running",
        "ledger": app_state.store.backend_name(),
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_route = Router::new()
        .nest("/auth", auth_handler())
        .nest(
            "/projects",
            projects_handler()
                .layer(middleware::from_fn(auth)),
        )
        .merge(account_handler().layer(middleware::from_fn(auth)))
        .nest(
            "/admin",
            admin_handler()
                .layer(middleware::from_fn(require_admin))
                .layer(middleware::from_fn(auth)),
        )
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new().nest("/api", api_route)
}
