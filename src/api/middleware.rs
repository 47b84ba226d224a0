use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;
use crate::history::ActorContext;
use crate::AppState;

/// Header the form sends with the signed-in analyst's email.
pub const USER_EMAIL_HEADER: &str = "user_email";

/// Reject requests whose `user_email` header does not name a backend user,
/// and attach an [`ActorContext`] for the handlers' audit entries.
pub async fn require_user_email(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let user_email = match req
        .headers()
        .get(USER_EMAIL_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        Some(email) => email.to_string(),
        None => {
            return ApiError::Unauthorized("Missing or invalid user_email in header".into())
                .into_response()
        }
    };

    let users = match state.backend.users().await {
        Ok(users) => users,
        Err(e) => {
            log::error!("Authentication error: {}", e);
            return ApiError::Internal("Failed to authenticate user_email".into()).into_response();
        }
    };

    let user = match users.into_iter().find(|u| u.user_email == user_email) {
        Some(user) => user,
        None => {
            log::warn!(
                "AUDIT DENIED user={} method={} path={} reason=unknown_user",
                user_email,
                req.method(),
                req.uri().path()
            );
            return ApiError::Forbidden("Unauthorized user_email".into()).into_response();
        }
    };

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let actor = ActorContext {
        user_email: Some(user_email.clone()),
        name: user.name,
        id: Some(user.id),
        user_agent: req
            .headers()
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ip_address: client_ip(req.headers()).or(peer),
    };

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    req.extensions_mut().insert(actor);

    let response = next.run(req).await;

    log::info!(
        "AUDIT user={} method={} path={} status={}",
        user_email,
        method,
        path,
        response.status().as_u16()
    );

    response
}

/// First non-empty entry of `x-forwarded-for`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())?
        .split(',')
        .map(str::trim)
        .find(|ip| !ip.is_empty())
        .map(str::to_string)
}
