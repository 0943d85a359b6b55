// handler/projects.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::marketdtos::{ApiResponse, SubmitWorkDto},
    error::HttpError,
    middleware::AuthenticatedCaller,
    AppState,
};

pub fn projects_handler() -> Router {
    Router::new()
        .route("/", get(list_projects))
        .route("/:project_id/submissions", post(submit_work))
}

pub async fn list_projects(
    Extension(app_state): Extension<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpError> {
    let projects = app_state.marketplace.list_projects().await?;
    Ok(Json(ApiResponse::success(projects)))
}

pub async fn submit_work(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(project_id): Path<Uuid>,
    Json(body): Json<SubmitWorkDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let submission = app_state
        .marketplace
        .submit_work(caller.user_id, project_id, body.into_pairs())
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(submission))))
}
