//! Public alert id → internal incident node.

use std::sync::Arc;

use crate::upstream::{CaseBackend, Incident, UpstreamError};

/// Page size for alert id lookups. A single match is expected; anything
/// beyond this is already a data problem.
pub const MAX_MATCHES: u32 = 10;

#[derive(Debug, Clone)]
pub struct ResolvedIncident {
    /// Backend node id. Resolve again on every request; never cache it.
    pub internal_id: String,
    pub node: Incident,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("no incident found for alert_id {0}")]
    NotFound(String),

    #[error("alert_id {alert_id} matches {count} incidents, please contact the admin")]
    Ambiguous { alert_id: String, count: u64 },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl ResolutionError {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionError::NotFound(_) => "not_found",
            ResolutionError::Ambiguous { .. } => "ambiguous",
            ResolutionError::Upstream(e) => e.kind(),
        }
    }
}

/// Resolves alert identifiers against the backend. Stateless and safe to
/// call concurrently.
#[derive(Clone)]
pub struct AlertResolver {
    backend: Arc<dyn CaseBackend>,
}

impl AlertResolver {
    pub fn new(backend: Arc<dyn CaseBackend>) -> Self {
        Self { backend }
    }

    pub async fn resolve(&self, alert_id: &str) -> Result<ResolvedIncident, ResolutionError> {
        let page = self
            .backend
            .incidents_by_alert_id(alert_id, MAX_MATCHES)
            .await?;

        match page.global_count {
            0 => Err(ResolutionError::NotFound(alert_id.to_string())),
            1 => {
                let node = page.nodes.into_iter().next().ok_or_else(|| {
                    UpstreamError::Decode(format!(
                        "globalCount is 1 but no node returned for alert_id {}",
                        alert_id
                    ))
                })?;
                Ok(ResolvedIncident {
                    internal_id: node.id.clone(),
                    node,
                })
            }
            count => {
                log::warn!(
                    "alert_id {} matches {} incidents upstream, needs manual review",
                    alert_id,
                    count
                );
                Err(ResolutionError::Ambiguous {
                    alert_id: alert_id.to_string(),
                    count,
                })
            }
        }
    }
}
