//! Upstream case-management backend.
//!
//! Everything the gateway knows about the GraphQL service lives behind the
//! [`CaseBackend`] trait so route handlers and the alert resolver can be
//! tested against [`mock::MockBackend`] without a network.

pub mod documents;
pub mod graphql;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream transport error: {0}")]
    Transport(String),

    #[error("upstream returned HTTP {0}")]
    Status(u16),

    #[error("upstream GraphQL error: {0}")]
    Graphql(String),

    #[error("unexpected upstream response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Stable machine-readable kind, used in per-item error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::Timeout => "upstream_timeout",
            _ => "upstream_error",
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::Decode(err.to_string())
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// An incident node as the backend returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Incident {
    /// Backend-assigned node id. Only valid for the request that resolved it.
    pub id: String,
    #[serde(default)]
    pub alert_id: Option<String>,
    #[serde(default)]
    pub alert_name: Option<String>,
    #[serde(default)]
    pub alert_status: Option<String>,
    #[serde(default)]
    pub case_result: Option<String>,
    #[serde(default)]
    pub source_ip: Option<String>,
}

/// One page of incidents plus the backend's total match count.
#[derive(Debug, Clone, Default)]
pub struct IncidentPage {
    pub global_count: u64,
    pub nodes: Vec<Incident>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserAccount {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub user_email: String,
    #[serde(default)]
    pub account_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Note {
    pub id: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CaseBackend: Send + Sync {
    // Incidents
    /// Incidents whose public alert id equals `alert_id`, newest first,
    /// at most `first` nodes. `global_count` reports every match.
    async fn incidents_by_alert_id(
        &self,
        alert_id: &str,
        first: u32,
    ) -> Result<IncidentPage, UpstreamError>;
    async fn recent_incidents(&self, first: u32) -> Result<Vec<Incident>, UpstreamError>;
    async fn incident(&self, id: &str) -> Result<Option<Incident>, UpstreamError>;
    /// Replace a single field on an incident and return the patched node.
    async fn patch_incident(
        &self,
        id: &str,
        key: &str,
        value: &str,
    ) -> Result<Incident, UpstreamError>;
    async fn add_note(&self, id: &str, action: &str, content: &str)
        -> Result<Note, UpstreamError>;

    // Users
    async fn users(&self) -> Result<Vec<UserAccount>, UpstreamError>;
    async fn unlock_account(&self, id: &str) -> Result<Option<UserAccount>, UpstreamError>;
}
