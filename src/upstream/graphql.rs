use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::documents;
use super::{CaseBackend, Incident, IncidentPage, Note, UpstreamError, UserAccount};

/// [`CaseBackend`] over HTTP: every call is a POST of `{query, variables}`
/// to the configured endpoint with the static bearer credential.
pub struct GraphqlClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GraphqlClient {
    pub fn new(endpoint: &str, token: &str, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            token: token.to_string(),
        })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        document: &str,
        variables: Value,
    ) -> Result<T, UpstreamError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await
            .inspect_err(|e| log::warn!("GraphQL {} request failed: {}", operation, e))?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        decode_response(status, &body)
            .inspect_err(|e| log::warn!("GraphQL {} failed: {}", operation, e))
    }
}

// ---------------------------------------------------------------------------
// Wire shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlErrorMessage>,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
    #[serde(rename = "pageInfo")]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    #[serde(rename = "globalCount")]
    global_count: Option<u64>,
}

impl<T> Connection<T> {
    fn into_nodes(self) -> Vec<T> {
        self.edges.into_iter().map(|e| e.node).collect()
    }
}

#[derive(Debug, Deserialize)]
struct IncidentsData {
    incidents: Option<Connection<Incident>>,
}

#[derive(Debug, Deserialize)]
struct IncidentData {
    incident: Option<Incident>,
}

#[derive(Debug, Deserialize)]
struct IncidentEditData {
    #[serde(rename = "incidentEdit")]
    incident_edit: Option<FieldPatch>,
}

#[derive(Debug, Deserialize)]
struct FieldPatch {
    #[serde(rename = "fieldPatch")]
    field_patch: Option<Incident>,
}

#[derive(Debug, Deserialize)]
struct NoteAddData {
    #[serde(rename = "noteAdd")]
    note_add: Option<Note>,
}

#[derive(Debug, Deserialize)]
struct UsersData {
    users: Option<Connection<UserAccount>>,
}

#[derive(Debug, Deserialize)]
struct UnlockData {
    #[serde(rename = "unlockAccount")]
    unlock_account: Option<UserAccount>,
}

/// Turn a raw HTTP status + body into the `data` payload.
///
/// GraphQL servers often report errors with a 200 status, and some report
/// them with a 4xx/5xx plus a normal error body, so `errors` wins over the
/// status code when both are present.
fn decode_response<T: DeserializeOwned>(status: u16, body: &str) -> Result<T, UpstreamError> {
    let parsed: GraphqlResponse<T> = match serde_json::from_str(body) {
        Ok(p) => p,
        Err(_) if !(200..300).contains(&status) => return Err(UpstreamError::Status(status)),
        Err(e) => return Err(UpstreamError::Decode(e.to_string())),
    };

    if !parsed.errors.is_empty() {
        let messages: Vec<String> = parsed.errors.into_iter().map(|e| e.message).collect();
        return Err(UpstreamError::Graphql(messages.join("; ")));
    }

    if !(200..300).contains(&status) {
        return Err(UpstreamError::Status(status));
    }

    parsed
        .data
        .ok_or_else(|| UpstreamError::Decode("response has no data".into()))
}

fn alert_id_filter(alert_id: &str) -> Value {
    json!({
        "mode": "and",
        "filterGroups": [],
        "filters": [{ "key": "alert_id", "values": [alert_id] }],
    })
}

// ---------------------------------------------------------------------------
// CaseBackend implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CaseBackend for GraphqlClient {
    async fn incidents_by_alert_id(
        &self,
        alert_id: &str,
        first: u32,
    ) -> Result<IncidentPage, UpstreamError> {
        let data: IncidentsData = self
            .execute(
                "IncidentsByAlertId",
                documents::INCIDENTS_BY_ALERT_ID,
                json!({ "filters": alert_id_filter(alert_id), "first": first }),
            )
            .await?;

        let connection = data
            .incidents
            .ok_or_else(|| UpstreamError::Decode("incidents is null".into()))?;
        let global_count = connection
            .page_info
            .as_ref()
            .and_then(|p| p.global_count)
            .ok_or_else(|| UpstreamError::Decode("incidents.pageInfo.globalCount missing".into()))?;

        Ok(IncidentPage {
            global_count,
            nodes: connection.into_nodes(),
        })
    }

    async fn recent_incidents(&self, first: u32) -> Result<Vec<Incident>, UpstreamError> {
        let data: IncidentsData = self
            .execute(
                "RecentIncidents",
                documents::RECENT_INCIDENTS,
                json!({ "first": first }),
            )
            .await?;
        Ok(data.incidents.map(Connection::into_nodes).unwrap_or_default())
    }

    async fn incident(&self, id: &str) -> Result<Option<Incident>, UpstreamError> {
        let data: IncidentData = self
            .execute("IncidentById", documents::INCIDENT_BY_ID, json!({ "id": id }))
            .await?;
        Ok(data.incident)
    }

    async fn patch_incident(
        &self,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<Incident, UpstreamError> {
        let variables = json!({
            "id": id,
            "input": [{ "key": key, "value": [value], "operation": "replace" }],
        });
        let data: IncidentEditData = self
            .execute("IncidentEdit", documents::INCIDENT_EDIT, variables)
            .await?;

        data.incident_edit
            .and_then(|edit| edit.field_patch)
            .ok_or_else(|| UpstreamError::Decode("incidentEdit.fieldPatch is null".into()))
    }

    async fn add_note(
        &self,
        id: &str,
        action: &str,
        content: &str,
    ) -> Result<Note, UpstreamError> {
        let variables = json!({
            "input": { "action": action, "content": content, "objects": [id] },
        });
        let data: NoteAddData = self
            .execute("NoteAdd", documents::NOTE_ADD, variables)
            .await?;

        data.note_add
            .ok_or_else(|| UpstreamError::Decode("noteAdd is null".into()))
    }

    async fn users(&self) -> Result<Vec<UserAccount>, UpstreamError> {
        let data: UsersData = self
            .execute("Users", documents::USERS, json!({}))
            .await?;
        Ok(data.users.map(Connection::into_nodes).unwrap_or_default())
    }

    async fn unlock_account(&self, id: &str) -> Result<Option<UserAccount>, UpstreamError> {
        let data: UnlockData = self
            .execute("UnlockAccount", documents::UNLOCK_ACCOUNT, json!({ "id": id }))
            .await?;
        Ok(data.unlock_account)
    }
}
