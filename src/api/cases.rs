use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use utoipa::ToSchema;

use super::{json_body, str_field, ItemError};
use crate::error::{ApiError, ApiResult};
use crate::history::{ActorContext, CaseRecord};
use crate::upstream::{Incident, Note};
use crate::AppState;

/// Page size of the incident list.
const RECENT_INCIDENTS: u32 = 50;

/// Results an analyst may set on a case.
pub const VALID_RESULTS: [&str; 3] = ["WaitingAnalysis", "TruePositives", "FalsePositives"];

#[derive(Debug, Serialize, ToSchema)]
pub struct IncidentList {
    pub incidents: Vec<Incident>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CloseRequest {
    pub alert_id: String,
    /// Must be `Closed`.
    pub alert_status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CloseBatch {
    pub incidents: Vec<CloseRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CaseResultRequest {
    pub alert_id: String,
    /// One of `WaitingAnalysis`, `TruePositives`, `FalsePositives`.
    pub case_result: String,
    pub reason: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CaseResultBatch {
    pub incidents: Vec<CaseResultRequest>,
}

/// Outcome of one item in a batch change.
#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum ChangeOutcome {
    Changed {
        alert_id: String,
        updated: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        alert_status: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        case_result: Option<String>,
        /// Absent when the field was patched but the note could not be added.
        note: Option<Note>,
        #[serde(skip_serializing_if = "Option::is_none")]
        note_error: Option<String>,
    },
    Failed {
        alert_id: Option<String>,
        error: String,
        error_kind: String,
    },
}

impl ChangeOutcome {
    fn failed(alert_id: Option<&str>, err: ItemError) -> Self {
        ChangeOutcome::Failed {
            alert_id: alert_id.map(str::to_string),
            error: err.error,
            error_kind: err.error_kind,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResults {
    pub results: Vec<ChangeOutcome>,
}

/// Incident fields a batch route may patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    AlertStatus,
    CaseResult,
}

impl Field {
    /// Key in the backend's `fieldPatch` input.
    fn key(self) -> &'static str {
        match self {
            Field::AlertStatus => "alert_status",
            Field::CaseResult => "case_result",
        }
    }

    fn current(self, incident: &Incident) -> Option<String> {
        match self {
            Field::AlertStatus => incident.alert_status.clone(),
            Field::CaseResult => incident.case_result.clone(),
        }
    }
}

/// A single-field change applied to a resolved incident, plus the note and
/// history entries that go with it.
struct FieldChange<'a> {
    field: Field,
    value: &'a str,
    /// History action for the field patch.
    action: &'static str,
    before_key: &'static str,
    after_key: &'static str,
    note_action: &'static str,
    note_content: &'a str,
    reason: Option<&'a str>,
}

/// Accept either `{ incidents: [..] }` (possibly empty) or a single item
/// object carrying every key in `single_keys`.
fn batch_items(body: Value, single_keys: &[&str]) -> ApiResult<Vec<Value>> {
    let Value::Object(mut map) = body else {
        return Err(ApiError::BadRequest("Request body must be a JSON object".into()));
    };

    match map.remove("incidents") {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ApiError::BadRequest("Missing or invalid 'incidents'".into())),
        None if single_keys.iter().all(|k| map.contains_key(*k)) => Ok(vec![Value::Object(map)]),
        None => {
            let keys: Vec<String> = single_keys.iter().map(|k| format!("'{}'", k)).collect();
            Err(ApiError::BadRequest(format!(
                "Missing 'incidents' or {}",
                keys.join(", ")
            )))
        }
    }
}

/// Resolve, read the before-state, patch, then note the change. History is
/// queued after each successful mutation, in mutation order.
async fn apply_change(
    state: &AppState,
    actor: &ActorContext,
    alert_id: &str,
    change: FieldChange<'_>,
) -> ChangeOutcome {
    let resolved = match state.resolver.resolve(alert_id).await {
        Ok(resolved) => resolved,
        Err(e) => {
            log::warn!("{} {} skipped: {}", change.action, alert_id, e);
            return ChangeOutcome::failed(Some(alert_id), e.into());
        }
    };
    let id = resolved.internal_id;

    let before = match state.backend.incident(&id).await {
        Ok(Some(incident)) => incident,
        Ok(None) => resolved.node,
        Err(e) => {
            log::error!("Reading {} before {} failed: {}", alert_id, change.action, e);
            return ChangeOutcome::failed(Some(alert_id), e.into());
        }
    };

    let patched = match state
        .backend
        .patch_incident(&id, change.field.key(), change.value)
        .await
    {
        Ok(patched) => patched,
        Err(e) => {
            log::error!("{} {} failed: {}", change.action, alert_id, e);
            return ChangeOutcome::failed(Some(alert_id), e.into());
        }
    };
    let after = change.field.current(&patched);

    let mut fields = Map::new();
    fields.insert(
        "name".into(),
        json!(before.alert_name.as_deref().unwrap_or(crate::history::UNKNOWN)),
    );
    fields.insert(
        change.before_key.into(),
        json!(change
            .field
            .current(&before)
            .unwrap_or_else(|| crate::history::UNKNOWN.to_string())),
    );
    fields.insert(change.after_key.into(), json!(after));
    if let Some(reason) = change.reason {
        fields.insert("reason".into(), json!(reason));
    }
    state.history.append(
        change.action,
        vec![CaseRecord::alert(alert_id, Some(id.clone()), Value::Object(fields))],
        actor,
    );

    let (note, note_error) = match state
        .backend
        .add_note(&id, change.note_action, change.note_content)
        .await
    {
        Ok(note) => {
            state.history.append(
                "addNote",
                vec![CaseRecord::alert(
                    alert_id,
                    Some(note.id.clone()),
                    json!({ "action": note.action, "content": note.content }),
                )],
                actor,
            );
            (Some(note), None)
        }
        Err(e) => {
            log::error!("Adding note to {} failed: {}", alert_id, e);
            (None, Some(e.to_string()))
        }
    };

    let (alert_status, case_result) = match change.field {
        Field::AlertStatus => (after, None),
        Field::CaseResult => (None, after),
    };

    ChangeOutcome::Changed {
        alert_id: alert_id.to_string(),
        updated: true,
        alert_status,
        case_result,
        note,
        note_error,
    }
}

/// Recent incidents, newest first.
#[utoipa::path(
    get,
    path = "/incidents",
    tag = "cases",
    security(("user_email" = [])),
    responses(
        (status = 200, description = "Recent incidents", body = IncidentList),
        (status = 500, description = "Backend unavailable", body = super::ErrorBody)
    )
)]
pub async fn list_incidents(State(state): State<AppState>) -> ApiResult<Json<IncidentList>> {
    let incidents = state
        .backend
        .recent_incidents(RECENT_INCIDENTS)
        .await
        .map_err(|e| {
            log::error!("Fetching incidents failed: {}", e);
            ApiError::Internal("Failed to fetch incidents".into())
        })?;
    Ok(Json(IncidentList { incidents }))
}

/// Close alerts by their public alert id.
///
/// Accepts `{ incidents: [{ alert_id, alert_status }] }` or one bare item.
/// Every item is closed, noted and recorded in the history independently.
#[utoipa::path(
    put,
    path = "/closedAlertStatus",
    tag = "cases",
    security(("user_email" = [])),
    request_body = CloseBatch,
    responses(
        (status = 200, description = "Per-item outcome, in request order", body = BatchResults),
        (status = 400, description = "Malformed request body", body = super::ErrorBody),
        (status = 401, description = "Missing user_email header", body = super::ErrorBody),
        (status = 403, description = "Unknown user_email", body = super::ErrorBody)
    )
)]
pub async fn close_alert_status(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<BatchResults>> {
    let items = batch_items(json_body(payload)?, &["alert_id", "alert_status"])?;

    let mut results = Vec::with_capacity(items.len());
    for item in &items {
        let Some(alert_id) = str_field(item, "alert_id") else {
            results.push(ChangeOutcome::failed(
                None,
                ItemError::invalid_input("Invalid or missing 'alert_id'"),
            ));
            continue;
        };
        if item.get("alert_status").and_then(Value::as_str) != Some("Closed") {
            results.push(ChangeOutcome::failed(
                Some(alert_id),
                ItemError::invalid_input("This endpoint only accepts 'Closed' alert_status"),
            ));
            continue;
        }

        let change = FieldChange {
            field: Field::AlertStatus,
            value: "Closed",
            action: "updateAlertStatus",
            before_key: "status_before",
            after_key: "status_after",
            note_action: "Closed",
            note_content: "Incident was Closed",
            reason: None,
        };
        results.push(apply_change(&state, &actor, alert_id, change).await);
    }

    Ok(Json(BatchResults { results }))
}

/// Set the case result of alerts by their public alert id.
///
/// Accepts `{ incidents: [{ alert_id, case_result, reason }] }` or one bare
/// item. The reason becomes a `Re-Investigated` note.
#[utoipa::path(
    put,
    path = "/updateCaseResult",
    tag = "cases",
    security(("user_email" = [])),
    request_body = CaseResultBatch,
    responses(
        (status = 200, description = "Per-item outcome, in request order", body = BatchResults),
        (status = 400, description = "Malformed request body", body = super::ErrorBody),
        (status = 401, description = "Missing user_email header", body = super::ErrorBody),
        (status = 403, description = "Unknown user_email", body = super::ErrorBody)
    )
)]
pub async fn update_case_result(
    State(state): State<AppState>,
    Extension(actor): Extension<ActorContext>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<BatchResults>> {
    let items = batch_items(json_body(payload)?, &["alert_id", "case_result", "reason"])?;

    let mut results = Vec::with_capacity(items.len());
    for item in &items {
        let Some(alert_id) = str_field(item, "alert_id") else {
            results.push(ChangeOutcome::failed(
                None,
                ItemError::invalid_input("Invalid or missing 'alert_id'"),
            ));
            continue;
        };
        let Some(case_result) = item
            .get("case_result")
            .and_then(Value::as_str)
            .filter(|r| VALID_RESULTS.contains(r))
        else {
            results.push(ChangeOutcome::failed(
                Some(alert_id),
                ItemError::invalid_input("Invalid 'case_result'"),
            ));
            continue;
        };
        let Some(reason) = str_field(item, "reason") else {
            results.push(ChangeOutcome::failed(
                Some(alert_id),
                ItemError::invalid_input("Missing or invalid 'reason'"),
            ));
            continue;
        };

        let change = FieldChange {
            field: Field::CaseResult,
            value: case_result,
            action: "updateCaseResult",
            before_key: "result_before",
            after_key: "result_after",
            note_action: "Re-Investigated",
            note_content: reason,
            reason: Some(reason),
        };
        results.push(apply_change(&state, &actor, alert_id, change).await);
    }

    Ok(Json(BatchResults { results }))
}
