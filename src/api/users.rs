use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use super::auth::find_user;
use super::{json_body, str_field, ItemError};
use crate::error::{ApiError, ApiResult};
use crate::history::{ActorContext, CaseRecord};
use crate::upstream::{UpstreamError, UserAccount};
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnlockRequest {
    pub user_email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnlockBatch {
    pub users: Vec<UnlockRequest>,
}

/// Outcome of one account in a batch unlock.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum UnlockOutcome {
    Unlocked {
        user_email: String,
        unlocked: bool,
        account_status: Option<String>,
    },
    Failed {
        user_email: Option<String>,
        error: String,
        error_kind: String,
    },
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnlockResults {
    pub results: Vec<UnlockOutcome>,
}

#[derive(Debug)]
enum UnlockFailure {
    UnknownUser,
    /// The backend answered the mutation with `null`.
    NotUnlocked,
    Upstream(UpstreamError),
}

impl From<UnlockFailure> for ItemError {
    fn from(failure: UnlockFailure) -> Self {
        match failure {
            UnlockFailure::UnknownUser => ItemError::new("User not found with given email", "not_found"),
            UnlockFailure::NotUnlocked => ItemError::new("Unlock failed or user not found", "not_found"),
            UnlockFailure::Upstream(e) => e.into(),
        }
    }
}

/// Unlock the account matching `user_email` in `accounts` and queue its
/// `unlockUser` history entry.
async fn unlock_one(
    state: &AppState,
    actor: &ActorContext,
    accounts: &[UserAccount],
    user_email: &str,
) -> Result<UserAccount, UnlockFailure> {
    let target = find_user(accounts, user_email).ok_or(UnlockFailure::UnknownUser)?;

    let unlocked = state
        .backend
        .unlock_account(&target.id)
        .await
        .map_err(UnlockFailure::Upstream)?
        .ok_or(UnlockFailure::NotUnlocked)?;

    state.history.append(
        "unlockUser",
        vec![CaseRecord::id_keyed(json!({
            "id": target.id,
            "name": target.name.as_deref().unwrap_or(crate::history::UNKNOWN),
            "user_email": user_email,
            "status_before": target.account_status,
            "status_after": unlocked.account_status,
        }))],
        actor,
    );

    Ok(unlocked)
}

/// Unlock an analyst account by email.
#[utoipa::path(
    put,
    path = "/unlock",
    tag = "users",
    security(("user_email" = [])),
    request_body = UnlockRequest,
    responses(
        (status = 200, description = "The unlocked account", body = UserAccount),
        (status = 400, description = "Missing or invalid user_email", body = super::ErrorBody),
        (status = 404, description = "No such account, or the unlock returned nothing", body = super::ErrorBody),
        (status = 500, description = "Backend unavailable", body = super::ErrorBody)
    )
)]
pub async fn unlock(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<UserAccount>> {
    let body = json_body(payload)?;
    let user_email = str_field(&body, "user_email")
        .ok_or_else(|| ApiError::BadRequest("Missing or invalid 'user_email'".into()))?;

    let failed = |e: UpstreamError| {
        log::error!("Failed to unlock account {}: {}", user_email, e);
        ApiError::Internal("Failed to unlock account".into())
    };

    let accounts = state.backend.users().await.map_err(failed)?;
    match unlock_one(&state, &actor, &accounts, user_email).await {
        Ok(unlocked) => Ok(Json(unlocked)),
        Err(UnlockFailure::Upstream(e)) => Err(failed(e)),
        Err(other) => Err(ApiError::NotFound(ItemError::from(other).error)),
    }
}

/// Unlock several accounts in one request.
///
/// The user list is read once; each account is then unlocked and recorded
/// on its own, and a failure is reported next to that email only.
#[utoipa::path(
    put,
    path = "/accounts/unlock",
    tag = "users",
    security(("user_email" = [])),
    request_body = UnlockBatch,
    responses(
        (status = 200, description = "Per-account outcome, in request order", body = UnlockResults),
        (status = 400, description = "Missing or invalid users", body = super::ErrorBody),
        (status = 500, description = "Backend unavailable", body = super::ErrorBody)
    )
)]
pub async fn unlock_batch(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<UnlockResults>> {
    let body = json_body(payload)?;
    let Some(items) = body.get("users").and_then(Value::as_array) else {
        return Err(ApiError::BadRequest("Missing or invalid 'users'".into()));
    };
    if items.is_empty() {
        return Ok(Json(UnlockResults { results: Vec::new() }));
    }

    let accounts = state.backend.users().await.map_err(|e| {
        log::error!("Failed to fetch users for batch unlock: {}", e);
        ApiError::Internal("Failed to unlock accounts".into())
    })?;

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let Some(user_email) = str_field(item, "user_email") else {
            let err = ItemError::invalid_input("Invalid or missing 'user_email'");
            results.push(UnlockOutcome::Failed {
                user_email: None,
                error: err.error,
                error_kind: err.error_kind,
            });
            continue;
        };

        match unlock_one(&state, &actor, &accounts, user_email).await {
            Ok(unlocked) => results.push(UnlockOutcome::Unlocked {
                user_email: user_email.to_string(),
                unlocked: true,
                account_status: unlocked.account_status,
            }),
            Err(failure) => {
                log::warn!("Unlock of {} failed: {:?}", user_email, failure);
                let err = ItemError::from(failure);
                results.push(UnlockOutcome::Failed {
                    user_email: Some(user_email.to_string()),
                    error: err.error,
                    error_kind: err.error_kind,
                });
            }
        }
    }

    Ok(Json(UnlockResults { results }))
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::test_support::*;
    use crate::upstream::mock::{BackendCall, MockBackend};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    #[tokio::test]
    async fn unlock_records_before_and_after() {
        let mock = with_analyst(MockBackend::new()).with_user("u7", "Bob", "bob@x.com", "Locked");
        let (state, _tmp, mock) = test_state(mock);

        let resp = router(state.clone())
            .oneshot(json_request("PUT", "/unlock", json!({ "user_email": "BOB@x.com" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["id"], "u7");
        assert_eq!(body["account_status"], "Active");

        assert!(mock.calls().contains(&BackendCall::UnlockAccount("u7".into())));

        let log = history(&state).await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0]["action"], "unlockUser");
        assert_eq!(log[0]["case"]["id"], "u7");
        assert_eq!(log[0]["case"]["name"], "Bob");
        assert_eq!(log[0]["case"]["user_email"], "BOB@x.com");
        assert_eq!(log[0]["case"]["status_before"], "Locked");
        assert_eq!(log[0]["case"]["status_after"], "Active");
        assert_eq!(log[0]["authentication"]["user_email"], ANALYST);
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let (state, _tmp, mock) = test_state(with_analyst(MockBackend::new()));

        let resp = router(state.clone())
            .oneshot(json_request("PUT", "/unlock", json!({ "user_email": "ghost@x.com" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "User not found with given email");
        assert_eq!(mock.mutation_count(), 0);
        assert!(history(&state).await.is_empty());
    }

    #[tokio::test]
    async fn null_unlock_is_not_found_and_not_recorded() {
        let mock = with_analyst(MockBackend::new())
            .with_user("u7", "Bob", "bob@x.com", "Locked")
            .unlock_returns_null();
        let (state, _tmp, _mock) = test_state(mock);

        let resp = router(state.clone())
            .oneshot(json_request("PUT", "/unlock", json!({ "user_email": "bob@x.com" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["error"], "Unlock failed or user not found");
        assert!(history(&state).await.is_empty());
    }

    #[tokio::test]
    async fn blank_email_is_bad_request() {
        let (state, _tmp, _mock) = test_state(with_analyst(MockBackend::new()));
        let resp = router(state)
            .oneshot(json_request("PUT", "/unlock", json!({ "user_email": "  " })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Missing or invalid 'user_email'");
    }

    #[tokio::test]
    async fn batch_unlock_reports_each_account() {
        let mock = with_analyst(MockBackend::new())
            .with_user("u7", "Bob", "bob@x.com", "Locked")
            .with_user("u8", "Cy", "cy@x.com", "Locked");
        let (state, _tmp, mock) = test_state(mock);

        let resp = router(state.clone())
            .oneshot(json_request(
                "PUT",
                "/accounts/unlock",
                json!({ "users": [
                    { "user_email": "bob@x.com", "account_status": "Locked", "id": "u7" },
                    { "user_email": "ghost@x.com" },
                    { "name": "no email" },
                    { "user_email": "CY@x.com" },
                ]}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = body_json(resp).await;
        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 4);
        assert_eq!(results[0]["user_email"], "bob@x.com");
        assert_eq!(results[0]["unlocked"], true);
        assert_eq!(results[0]["account_status"], "Active");
        assert!(results[0].get("error").is_none());
        assert_eq!(results[1]["user_email"], "ghost@x.com");
        assert_eq!(results[1]["error"], "User not found with given email");
        assert_eq!(results[1]["error_kind"], "not_found");
        assert_eq!(results[2]["error_kind"], "invalid_input");
        assert!(results[2]["user_email"].is_null());
        assert_eq!(results[3]["unlocked"], true);

        // One read for the auth check, one for the whole batch
        let reads = mock.calls().iter().filter(|c| **c == BackendCall::Users).count();
        assert_eq!(reads, 2);
        assert_eq!(mock.mutation_count(), 2);

        let log = history(&state).await;
        let unlocked: Vec<&str> = log.iter().map(|e| e["case"]["id"].as_str().unwrap()).collect();
        assert_eq!(unlocked, vec!["u7", "u8"]);
        assert!(log.iter().all(|e| e["action"] == "unlockUser"));
    }

    #[tokio::test]
    async fn batch_unlock_null_result_is_per_item() {
        let mock = with_analyst(MockBackend::new())
            .with_user("u7", "Bob", "bob@x.com", "Locked")
            .unlock_returns_null();
        let (state, _tmp, _mock) = test_state(mock);

        let body = body_json(
            router(state.clone())
                .oneshot(json_request(
                    "PUT",
                    "/accounts/unlock",
                    json!({ "users": [{ "user_email": "bob@x.com" }] }),
                ))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(body["results"][0]["error"], "Unlock failed or user not found");
        assert!(history(&state).await.is_empty());
    }

    #[tokio::test]
    async fn batch_unlock_body_shapes() {
        let (state, _tmp, mock) = test_state(with_analyst(MockBackend::new()));
        let app = router(state);

        let resp = app
            .clone()
            .oneshot(json_request("PUT", "/accounts/unlock", json!({ "users": [] })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({ "results": [] }));

        let resp = app
            .oneshot(json_request("PUT", "/accounts/unlock", json!({ "users": "bob@x.com" })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Missing or invalid 'users'");
        assert_eq!(mock.mutation_count(), 0);
    }

}
