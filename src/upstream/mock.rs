//! In-memory mock implementation of `CaseBackend` for testing.
//!
//! Tracks all calls and keeps fake incident/user state so that the resolver
//! and route handlers can be tested without a GraphQL server.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{CaseBackend, Incident, IncidentPage, Note, UpstreamError, UserAccount};

// ---------------------------------------------------------------------------
// Call recording
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    IncidentsByAlertId { alert_id: String, first: u32 },
    RecentIncidents(u32),
    Incident(String),
    PatchIncident { id: String, key: String, value: String },
    AddNote { id: String, action: String, content: String },
    Users,
    UnlockAccount(String),
}

impl BackendCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            BackendCall::PatchIncident { .. }
                | BackendCall::AddNote { .. }
                | BackendCall::UnlockAccount(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Mock state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Timeout,
    Transport,
}

impl Failure {
    fn error(self) -> UpstreamError {
        match self {
            Failure::Timeout => UpstreamError::Timeout,
            Failure::Transport => UpstreamError::Transport("connection refused".into()),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<BackendCall>,
    incidents: Vec<Incident>,
    users: Vec<UserAccount>,
    next_note: u64,
    /// Reported count override for `incidents_by_alert_id`.
    forced_count: Option<u64>,
    fail_lookup: Option<Failure>,
    fail_users: Option<Failure>,
    fail_patch: Option<Failure>,
    unlock_returns_null: bool,
}

#[derive(Default)]
pub struct MockBackend {
    inner: Mutex<Inner>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_incident(self, id: &str, alert_id: &str, status: &str, result: &str) -> Self {
        self.inner.lock().unwrap().incidents.push(Incident {
            id: id.to_string(),
            alert_id: Some(alert_id.to_string()),
            alert_name: Some(format!("Alert {}", alert_id)),
            alert_status: Some(status.to_string()),
            case_result: Some(result.to_string()),
            source_ip: Some("10.0.0.5".to_string()),
        });
        self
    }

    pub fn with_user(self, id: &str, name: &str, email: &str, status: &str) -> Self {
        self.inner.lock().unwrap().users.push(UserAccount {
            id: id.to_string(),
            name: Some(name.to_string()),
            user_email: email.to_string(),
            account_status: Some(status.to_string()),
        });
        self
    }

    /// Report `count` matches for every alert id lookup, regardless of state.
    pub fn with_reported_count(self, count: u64) -> Self {
        self.inner.lock().unwrap().forced_count = Some(count);
        self
    }

    pub fn fail_lookup(self, failure: Failure) -> Self {
        self.inner.lock().unwrap().fail_lookup = Some(failure);
        self
    }

    pub fn fail_users(self, failure: Failure) -> Self {
        self.inner.lock().unwrap().fail_users = Some(failure);
        self
    }

    pub fn fail_patch(self, failure: Failure) -> Self {
        self.inner.lock().unwrap().fail_patch = Some(failure);
        self
    }

    pub fn unlock_returns_null(self) -> Self {
        self.inner.lock().unwrap().unlock_returns_null = true;
        self
    }

    /// Return all recorded calls.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.is_mutation())
            .count()
    }

    pub fn incident_state(&self, id: &str) -> Option<Incident> {
        self.inner
            .lock()
            .unwrap()
            .incidents
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// CaseBackend implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl CaseBackend for MockBackend {
    async fn incidents_by_alert_id(
        &self,
        alert_id: &str,
        first: u32,
    ) -> Result<IncidentPage, UpstreamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(BackendCall::IncidentsByAlertId {
            alert_id: alert_id.to_string(),
            first,
        });
        if let Some(f) = inner.fail_lookup {
            return Err(f.error());
        }

        let matches: Vec<Incident> = inner
            .incidents
            .iter()
            .filter(|i| i.alert_id.as_deref() == Some(alert_id))
            .cloned()
            .collect();
        let global_count = inner.forced_count.unwrap_or(matches.len() as u64);

        Ok(IncidentPage {
            global_count,
            nodes: matches.into_iter().take(first as usize).collect(),
        })
    }

    async fn recent_incidents(&self, first: u32) -> Result<Vec<Incident>, UpstreamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(BackendCall::RecentIncidents(first));
        Ok(inner.incidents.iter().rev().take(first as usize).cloned().collect())
    }

    async fn incident(&self, id: &str) -> Result<Option<Incident>, UpstreamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(BackendCall::Incident(id.to_string()));
        Ok(inner.incidents.iter().find(|i| i.id == id).cloned())
    }

    async fn patch_incident(
        &self,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<Incident, UpstreamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(BackendCall::PatchIncident {
            id: id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        if let Some(f) = inner.fail_patch {
            return Err(f.error());
        }

        let incident = inner
            .incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| UpstreamError::Graphql(format!("incident {} not found", id)))?;
        match key {
            "alert_status" => incident.alert_status = Some(value.to_string()),
            "case_result" => incident.case_result = Some(value.to_string()),
            other => return Err(UpstreamError::Graphql(format!("unknown field {}", other))),
        }

        let mut patched = incident.clone();
        patched.source_ip = None;
        Ok(patched)
    }

    async fn add_note(
        &self,
        id: &str,
        action: &str,
        content: &str,
    ) -> Result<Note, UpstreamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(BackendCall::AddNote {
            id: id.to_string(),
            action: action.to_string(),
            content: content.to_string(),
        });
        inner.next_note += 1;
        Ok(Note {
            id: format!("note-{}", inner.next_note),
            action: Some(action.to_string()),
            content: Some(content.to_string()),
        })
    }

    async fn users(&self) -> Result<Vec<UserAccount>, UpstreamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(BackendCall::Users);
        if let Some(f) = inner.fail_users {
            return Err(f.error());
        }
        Ok(inner.users.clone())
    }

    async fn unlock_account(&self, id: &str) -> Result<Option<UserAccount>, UpstreamError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(BackendCall::UnlockAccount(id.to_string()));
        if inner.unlock_returns_null {
            return Ok(None);
        }

        Ok(inner.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.account_status = Some("Active".to_string());
            UserAccount {
                name: None,
                ..u.clone()
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_counts_matches_and_caps_page() {
        let mock = MockBackend::new()
            .with_incident("n1", "A-1", "Opened", "WaitingAnalysis")
            .with_incident("n2", "A-1", "Opened", "WaitingAnalysis")
            .with_incident("n3", "A-2", "Opened", "WaitingAnalysis");

        let page = mock.incidents_by_alert_id("A-1", 1).await.unwrap();
        assert_eq!(page.global_count, 2);
        assert_eq!(page.nodes.len(), 1);
    }

    #[tokio::test]
    async fn patch_updates_state() {
        let mock = MockBackend::new().with_incident("n1", "A-1", "Opened", "WaitingAnalysis");
        let patched = mock.patch_incident("n1", "alert_status", "Closed").await.unwrap();
        assert_eq!(patched.alert_status.as_deref(), Some("Closed"));
        assert_eq!(
            mock.incident_state("n1").unwrap().alert_status.as_deref(),
            Some("Closed")
        );
        assert_eq!(mock.mutation_count(), 1);
    }

    #[tokio::test]
    async fn unlock_sets_active() {
        let mock = MockBackend::new().with_user("u1", "Ann", "a@x.com", "Locked");
        let user = mock.unlock_account("u1").await.unwrap().unwrap();
        assert_eq!(user.account_status.as_deref(), Some("Active"));
        assert!(mock.unlock_account("missing").await.unwrap().is_none());
    }
}
