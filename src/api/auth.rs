use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::json_body;
use crate::error::{ApiError, ApiResult};
use crate::upstream::UserAccount;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub user_email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserAccount,
}

/// Case-insensitive email match against the backend's users.
pub(crate) fn find_user<'a>(users: &'a [UserAccount], email: &str) -> Option<&'a UserAccount> {
    users
        .iter()
        .find(|u| u.user_email.eq_ignore_ascii_case(email))
}

/// Check that an email belongs to a known analyst.
#[utoipa::path(
    post,
    path = "/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Known analyst", body = LoginResponse),
        (status = 400, description = "Missing or invalid user_email", body = super::ErrorBody),
        (status = 403, description = "Unknown email", body = super::ErrorBody),
        (status = 500, description = "Backend unavailable", body = super::ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let body = json_body(payload)?;
    let user_email = match body.get("user_email").and_then(Value::as_str) {
        Some(email) if !email.is_empty() => email,
        _ => return Err(ApiError::BadRequest("Missing or invalid user_email".into())),
    };

    let users = state.backend.users().await.map_err(|e| {
        log::error!("Login error: {}", e);
        ApiError::Internal("Internal server error".into())
    })?;

    match find_user(&users, user_email) {
        Some(user) => {
            log::info!("Login success for {}", user.user_email);
            Ok(Json(LoginResponse {
                message: "Login success".into(),
                user: user.clone(),
            }))
        }
        None => Err(ApiError::Forbidden("User email not found".into())),
    }
}
