//! GraphQL documents sent to the backend.
//!
//! Only fields every deployment of the backend schema exposes are selected.
//! An unknown field fails the whole query, so optional extensions such as
//! `source_ip` are read when present but never requested.

pub const INCIDENTS_BY_ALERT_ID: &str = r#"
query IncidentsByAlertId($filters: FilterGroup, $first: Int) {
  incidents(orderBy: created_at, orderMode: desc, first: $first, filters: $filters) {
    edges {
      node {
        id
        alert_id
        alert_name
        alert_status
        case_result
      }
    }
    pageInfo {
      globalCount
    }
  }
}
"#;

pub const RECENT_INCIDENTS: &str = r#"
query RecentIncidents($first: Int) {
  incidents(orderBy: created_at, orderMode: desc, first: $first) {
    edges {
      node {
        id
        alert_id
        alert_name
        alert_status
        case_result
      }
    }
    pageInfo {
      globalCount
    }
  }
}
"#;

pub const INCIDENT_BY_ID: &str = r#"
query IncidentById($id: String!) {
  incident(id: $id) {
    id
    alert_id
    alert_name
    alert_status
    case_result
  }
}
"#;

pub const INCIDENT_EDIT: &str = r#"
mutation IncidentEdit($id: ID!, $input: [EditInput]!) {
  incidentEdit(id: $id) {
    fieldPatch(input: $input) {
      id
      alert_id
      alert_name
      alert_status
      case_result
    }
  }
}
"#;

pub const NOTE_ADD: &str = r#"
mutation NoteAdd($input: NoteAddInput!) {
  noteAdd(input: $input) {
    id
    action
    content
  }
}
"#;

pub const USERS: &str = r#"
query Users {
  users {
    edges {
      node {
        id
        name
        user_email
        account_status
      }
    }
  }
}
"#;

pub const UNLOCK_ACCOUNT: &str = r#"
mutation UnlockAccount($id: ID!) {
  unlockAccount(id: $id) {
    id
    user_email
    account_status
  }
}
"#;
