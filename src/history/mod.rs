//! Audit history of mutating actions.
//!
//! Every close, case-result update, note add and account unlock that the
//! gateway performs upstream is recorded as one [`HistoryEntry`] per affected
//! object. Entries land in one JSON file per calendar day (see
//! [`calendar::HistoryCalendar`]) and are written by a single queue worker
//! ([`writer::HistoryWriter`]) so concurrent requests never lose each other's
//! entries.
//!
//! The audit write is best-effort: it is not transactional with the upstream
//! mutation and its failures never reach the request that triggered it.

pub mod calendar;
pub mod store;
pub mod writer;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Placeholder persisted for any actor field the caller did not supply.
pub const UNKNOWN: &str = "unknown";

/// Who performed a mutating action. Built per request by the auth middleware.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActorContext {
    pub user_email: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// A result entry to be recorded.
///
/// Alert-keyed records are about an incident the caller named by its public
/// alert id; the backend's internal id is carried for logging but never
/// persisted. Id-keyed records (users, for instance) have no public
/// identifier and are persisted exactly as given.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseRecord {
    AlertKeyed {
        alert_id: String,
        internal_id: Option<String>,
        fields: Map<String, Value>,
    },
    IdKeyed(Value),
}

impl CaseRecord {
    pub fn alert(alert_id: impl Into<String>, internal_id: Option<String>, fields: Value) -> Self {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        CaseRecord::AlertKeyed {
            alert_id: alert_id.into(),
            internal_id,
            fields,
        }
    }

    pub fn id_keyed(value: Value) -> Self {
        CaseRecord::IdKeyed(value)
    }

    /// Classify an untyped result entry: a string `alert_id` makes it
    /// alert-keyed and its `id` becomes the internal id.
    pub fn from_value(value: Value) -> Self {
        let mut map = match value {
            Value::Object(map) => map,
            other => return CaseRecord::IdKeyed(other),
        };

        match map.remove("alert_id") {
            Some(Value::String(alert_id)) => {
                let internal_id = map.remove("id").map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                });
                CaseRecord::AlertKeyed {
                    alert_id,
                    internal_id,
                    fields: map,
                }
            }
            Some(other) => {
                map.insert("alert_id".to_string(), other);
                CaseRecord::IdKeyed(Value::Object(map))
            }
            None => CaseRecord::IdKeyed(Value::Object(map)),
        }
    }

    pub fn alert_id(&self) -> Option<&str> {
        match self {
            CaseRecord::AlertKeyed { alert_id, .. } => Some(alert_id),
            CaseRecord::IdKeyed(_) => None,
        }
    }

    /// The form that is written to disk.
    pub fn redacted(&self) -> Value {
        match self {
            CaseRecord::AlertKeyed {
                alert_id, fields, ..
            } => {
                let mut map = fields.clone();
                map.remove("id");
                map.insert("alert_id".to_string(), Value::String(alert_id.clone()));
                Value::Object(map)
            }
            CaseRecord::IdKeyed(value) => value.clone(),
        }
    }
}

impl Serialize for CaseRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.redacted().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Authentication {
    pub user_email: String,
    pub name: String,
}

/// One persisted audit record.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub authentication: Authentication,
    pub user_agent: String,
    pub ip_address: String,
    pub action: String,
    pub case: CaseRecord,
    pub timestamp: String,
}

impl HistoryEntry {
    pub fn new(action: &str, case: CaseRecord, actor: &ActorContext, timestamp: String) -> Self {
        let or_unknown = |v: &Option<String>| v.clone().unwrap_or_else(|| UNKNOWN.to_string());
        HistoryEntry {
            authentication: Authentication {
                user_email: or_unknown(&actor.user_email),
                name: or_unknown(&actor.name),
            },
            user_agent: or_unknown(&actor.user_agent),
            ip_address: normalize_ip(actor.ip_address.as_deref()),
            action: action.to_string(),
            case,
            timestamp,
        }
    }
}

/// IPv6 loopback is recorded as `127.0.0.1`; everything else verbatim.
pub fn normalize_ip(ip: Option<&str>) -> String {
    match ip {
        None => UNKNOWN.to_string(),
        Some(raw) => match raw.parse::<std::net::Ipv6Addr>() {
            Ok(v6) if v6.is_loopback() => "127.0.0.1".to_string(),
            _ => raw.to_string(),
        },
    }
}
