// handler/admin.rs
use std::sync::Arc;

use axum::{
    extract::Path,
    http::StatusCode,
    response::IntoResponse,
    routing::{post, put},
    Extension, Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::{
        marketdtos::{ApiResponse, CreateProjectDto, ReviewNoteDto},
        userdtos::{FilterUserDto, UserData, UserResponseDto},
    },
    error::HttpError,
    middleware::AuthenticatedCaller,
    AppState,
};

pub fn admin_handler() -> Router {
    Router::new()
        .route("/projects", post(create_project))
        .route("/users/:user_id/approve", put(approve_registration))
        .route("/submissions/:submission_id/approve", put(approve_submission))
        .route("/submissions/:submission_id/reject", put(reject_submission))
        .route("/withdrawals/:withdrawal_id/approve", put(approve_withdrawal))
        .route("/withdrawals/:withdrawal_id/reject", put(reject_withdrawal))
}

pub async fn create_project(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Json(body): Json<CreateProjectDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let project = app_state
        .marketplace
        .create_project(
            caller.user_id,
            body.name,
            body.description,
            body.value,
            body.fields.into_iter().map(Into::into).collect(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

pub async fn approve_registration(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let user = app_state
        .registration
        .approve_registration(user_id, caller.user_id)
        .await?;

    Ok(Json(UserResponseDto {
        status: "success".to_string(),
        data: UserData {
            user: FilterUserDto::filter_user(&user),
        },
    }))
}

pub async fn approve_submission(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(submission_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let receipt = app_state
        .submission_engine
        .approve_submission(submission_id, caller.user_id)
        .await?;

    Ok(Json(ApiResponse::success(receipt)))
}

pub async fn reject_submission(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(submission_id): Path<Uuid>,
    body: Option<Json<ReviewNoteDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let Json(body) = body.unwrap_or_default();
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let submission = app_state
        .submission_engine
        .reject_submission(submission_id, caller.user_id, body.note)
        .await?;

    Ok(Json(ApiResponse::success(submission)))
}

pub async fn approve_withdrawal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(withdrawal_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let receipt = app_state
        .withdrawal_engine
        .approve_withdrawal(withdrawal_id, caller.user_id)
        .await?;

    Ok(Json(ApiResponse::success(receipt)))
}

pub async fn reject_withdrawal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Path(withdrawal_id): Path<Uuid>,
    body: Option<Json<ReviewNoteDto>>,
) -> Result<impl IntoResponse, HttpError> {
    let Json(body) = body.unwrap_or_default();
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let withdrawal = app_state
        .withdrawal_engine
        .reject_withdrawal(withdrawal_id, caller.user_id, body.note)
        .await?;

    Ok(Json(ApiResponse::success(withdrawal)))
}
