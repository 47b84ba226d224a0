pub mod auth;
pub mod cases;
pub mod history;
pub mod lookup;
pub mod middleware;
pub mod users;

use std::future::Future;
use std::net::SocketAddr;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    middleware as axum_middleware, routing, Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi, ToSchema};

use crate::error::{ApiError, ApiResult};
use crate::resolver::ResolutionError;
use crate::upstream::UpstreamError;
use crate::AppState;

/// Request bodies are small JSON documents; anything larger is a client bug.
const BODY_LIMIT: usize = 1024 * 1024;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "user_email",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    middleware::USER_EMAIL_HEADER,
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Case Gateway API",
        description = "REST front for the case-management GraphQL backend. Every route except /login requires the user_email header of a known analyst.",
        version = "0.1.0"
    ),
    paths(
        auth::login,
        cases::list_incidents,
        cases::close_alert_status,
        cases::update_case_result,
        lookup::lookup_incidents,
        lookup::lookup_users,
        users::unlock,
        users::unlock_batch,
        history::get_history,
    ),
    components(schemas(
        ErrorBody,
        crate::upstream::Incident,
        crate::upstream::UserAccount,
        crate::upstream::Note,
        auth::LoginRequest,
        auth::LoginResponse,
        cases::IncidentList,
        cases::CloseRequest,
        cases::CloseBatch,
        cases::CaseResultRequest,
        cases::CaseResultBatch,
        cases::ChangeOutcome,
        cases::BatchResults,
        lookup::IncidentLookupRequest,
        lookup::UserLookupRequest,
        lookup::IncidentLookup,
        lookup::IncidentLookupResponse,
        lookup::UserLookup,
        lookup::UserLookupResponse,
        users::UnlockRequest,
        users::UnlockBatch,
        users::UnlockOutcome,
        users::UnlockResults,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Analyst login check"),
        (name = "cases", description = "Incident listing and case updates"),
        (name = "lookup", description = "Batch lookups by alert id or email"),
        (name = "users", description = "Account administration"),
        (name = "history", description = "Audit trail of every change")
    )
)]
pub struct ApiDoc;

/// `{ "error": .. }` body of every whole-request failure.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Per-item failure inside a batch response.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ItemError {
    pub error: String,
    /// `invalid_input`, `not_found`, `ambiguous`, `upstream_error` or `upstream_timeout`.
    pub error_kind: String,
}

impl ItemError {
    pub fn new(message: impl Into<String>, kind: &str) -> Self {
        Self {
            error: message.into(),
            error_kind: kind.to_string(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(message, "invalid_input")
    }
}

impl From<ResolutionError> for ItemError {
    fn from(err: ResolutionError) -> Self {
        Self::new(err.to_string(), err.kind())
    }
}

impl From<UpstreamError> for ItemError {
    fn from(err: UpstreamError) -> Self {
        Self::new(err.to_string(), err.kind())
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let authenticated_routes = Router::new()
        // Cases
        .route("/incidents", routing::get(cases::list_incidents))
        .route("/closedAlertStatus", routing::put(cases::close_alert_status))
        .route("/updateCaseResult", routing::put(cases::update_case_result))
        // Lookup
        .route("/lookup/incidents", routing::post(lookup::lookup_incidents))
        .route("/lookup/users", routing::post(lookup::lookup_users))
        // Users
        .route("/unlock", routing::put(users::unlock))
        .route("/accounts/unlock", routing::put(users::unlock_batch))
        // History
        .route("/history", routing::get(history::get_history))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_user_email,
        ));

    Router::new()
        // Public routes
        .route("/login", routing::post(auth::login))
        .route("/api/openapi.json", routing::get(openapi_spec))
        .merge(authenticated_routes)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .with_state(state)
}

/// Serve the API on `bind_addr` until `shutdown` resolves.
pub async fn start_server(
    state: AppState,
    bind_addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    log::info!("Case gateway listening on {}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

async fn openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Unwrap a JSON body, turning axum's rejection into our `{ "error": .. }` shape.
pub(crate) fn json_body(payload: Result<Json<Value>, JsonRejection>) -> ApiResult<Value> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::BadRequest(format!(
            "Invalid JSON body: {}",
            rejection.body_text()
        ))),
    }
}

/// Non-blank string field of a JSON object.
pub(crate) fn str_field<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}
