// handler/account.rs
use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};

use crate::{
    dtos::{
        marketdtos::{ApiResponse, WithdrawalRequestDto},
        userdtos::AccountResponseDto,
    },
    error::HttpError,
    middleware::AuthenticatedCaller,
    AppState,
};

pub fn account_handler() -> Router {
    Router::new()
        .route("/me", get(get_me))
        .route("/withdrawals", post(request_withdrawal))
}

pub async fn get_me(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
) -> Result<impl IntoResponse, HttpError> {
    let overview = app_state.marketplace.account_overview(caller.user_id).await?;
    Ok(Json(AccountResponseDto::from(overview)))
}

pub async fn request_withdrawal(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedCaller>,
    Json(body): Json<WithdrawalRequestDto>,
) -> Result<impl IntoResponse, HttpError> {
    let withdrawal = app_state
        .marketplace
        .request_withdrawal(caller.user_id, body.amount)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(withdrawal))))
}
