use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use super::auth::find_user;
use super::{json_body, ItemError};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct IncidentLookupRequest {
    pub alert_ids: Vec<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserLookupRequest {
    pub user_emails: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum IncidentLookup {
    Found {
        alert_id: String,
        alert_name: Option<String>,
        source_ip: Option<String>,
        alert_status: Option<String>,
        case_result: Option<String>,
    },
    Failed {
        alert_id: Option<String>,
        error: String,
        error_kind: String,
    },
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IncidentLookupResponse {
    pub incidents: Vec<IncidentLookup>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum UserLookup {
    Found {
        user_email: String,
        account_status: String,
        name: Option<String>,
        id: String,
    },
    Failed {
        user_email: Option<String>,
        error: String,
        error_kind: String,
    },
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserLookupResponse {
    pub users: Vec<UserLookup>,
}

/// Non-empty array field of the request body.
fn non_empty_array<'a>(body: &'a Value, key: &str) -> ApiResult<&'a [Value]> {
    match body.get(key).and_then(Value::as_array) {
        Some(items) if !items.is_empty() => Ok(items),
        _ => Err(ApiError::BadRequest(format!("Missing or invalid '{}'", key))),
    }
}

fn incident_failure(alert_id: Option<String>, err: ItemError) -> IncidentLookup {
    IncidentLookup::Failed {
        alert_id,
        error: err.error,
        error_kind: err.error_kind,
    }
}

/// Look up incidents by their public alert ids.
///
/// Each id is resolved on its own; a failure is reported next to that id
/// and never affects the others.
#[utoipa::path(
    post,
    path = "/lookup/incidents",
    tag = "lookup",
    security(("user_email" = [])),
    request_body = IncidentLookupRequest,
    responses(
        (status = 200, description = "One entry per requested alert id", body = IncidentLookupResponse),
        (status = 400, description = "Missing or empty alert_ids", body = super::ErrorBody)
    )
)]
pub async fn lookup_incidents(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<IncidentLookupResponse>> {
    let body = json_body(payload)?;
    let alert_ids = non_empty_array(&body, "alert_ids")?;

    let mut incidents = Vec::with_capacity(alert_ids.len());
    for raw in alert_ids {
        let alert_id = match raw.as_str().map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id,
            None => {
                incidents.push(incident_failure(
                    None,
                    ItemError::invalid_input("Invalid or missing 'alert_id'"),
                ));
                continue;
            }
        };

        match state.resolver.resolve(alert_id).await {
            Ok(resolved) => {
                let node = resolved.node;
                incidents.push(IncidentLookup::Found {
                    alert_id: alert_id.to_string(),
                    alert_name: node.alert_name,
                    source_ip: node.source_ip,
                    alert_status: node.alert_status,
                    case_result: node.case_result,
                });
            }
            Err(e) => {
                log::warn!("Lookup of {} failed: {}", alert_id, e);
                incidents.push(incident_failure(Some(alert_id.to_string()), e.into()));
            }
        }
    }

    Ok(Json(IncidentLookupResponse { incidents }))
}

/// Look up accounts by email, case-insensitively.
#[utoipa::path(
    post,
    path = "/lookup/users",
    tag = "lookup",
    security(("user_email" = [])),
    request_body = UserLookupRequest,
    responses(
        (status = 200, description = "One entry per requested email", body = UserLookupResponse),
        (status = 400, description = "Missing or empty user_emails", body = super::ErrorBody),
        (status = 500, description = "Backend unavailable", body = super::ErrorBody)
    )
)]
pub async fn lookup_users(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<UserLookupResponse>> {
    let body = json_body(payload)?;
    let emails = non_empty_array(&body, "user_emails")?;

    let accounts = state.backend.users().await.map_err(|e| {
        log::error!("Error fetching user data: {}", e);
        ApiError::Internal("Failed to fetch user data".into())
    })?;

    let users = emails
        .iter()
        .map(|raw| {
            let Some(email) = raw.as_str() else {
                return UserLookup::Failed {
                    user_email: None,
                    error: "Invalid user_email".into(),
                    error_kind: "invalid_input".into(),
                };
            };
            match find_user(&accounts, email) {
                Some(found) => UserLookup::Found {
                    user_email: found.user_email.clone(),
                    account_status: found
                        .account_status
                        .clone()
                        .unwrap_or_else(|| "Unknown".to_string()),
                    name: found.name.clone(),
                    id: found.id.clone(),
                },
                None => UserLookup::Failed {
                    user_email: Some(email.to_string()),
                    error: "User not found".into(),
                    error_kind: "not_found".into(),
                },
            }
        })
        .collect();

    Ok(Json(UserLookupResponse { users }))
}
