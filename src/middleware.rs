// middleware.rs
use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ErrorMessage, HttpError},
    models::usermodel::{RegistrationStatus, UserRole},
    utils::token,
    AppState,
};

/// Identity of the caller, inserted into request extensions by [`auth`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct AuthenticatedCaller {
    pub user_id: Uuid,
    pub role: UserRole,
}

pub async fn auth(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let cookies = cookie_jar
        .get("token")
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|auth_header| auth_header.to_str().ok())
                .and_then(|auth_value| auth_value.strip_prefix("Bearer ").map(str::to_owned))
        });

    let token = cookies.ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let claims = token::decode_token(token, app_state.env.jwt_secret.as_bytes())?;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| HttpError::unauthorized(ErrorMessage::InvalidToken.to_string()))?;

    // The role is read from the store so a demoted user loses access at once.
    let user = {
        let mut unit = app_state.store.begin().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to open unit for auth");
            HttpError::server_error("Internal storage error")
        })?;
        let found = unit.get_user(user_id).await.map_err(|e| {
            tracing::error!(error = %e, %user_id, "Failed to load caller");
            HttpError::server_error("Internal storage error")
        })?;
        found
    };

    let user = user.ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string()))?;

    if user.registration_status != RegistrationStatus::Approved {
        return Err(HttpError::forbidden(ErrorMessage::RegistrationNotApproved.to_string()));
    }

    req.extensions_mut().insert(AuthenticatedCaller {
        user_id: user.id,
        role: user.role,
    });

    Ok(next.run(req).await)
}

pub async fn role_check(
    req: Request,
    next: Next,
    required_roles: Vec<UserRole>,
) -> Result<impl IntoResponse, HttpError> {
    let caller = req
        .extensions()
        .get::<AuthenticatedCaller>()
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string()))?;

    if !required_roles.contains(&caller.role) {
        tracing::warn!(user_id = %caller.user_id, role = caller.role.to_str(), "Permission denied");
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    Ok(next.run(req).await)
}

pub async fn require_admin(req: Request, next: Next) -> Result<impl IntoResponse, HttpError> {
    role_check(req, next, vec![UserRole::Admin, UserRole::SuperAdmin]).await
}
