//! Inbound event normalization.
//!
//! Payloads arrive in the GitHub deployment shape:
//!
//! ```json
//! { "deployment": { "environment": "production", "ref": "main", "sha": "abc123" },
//!   "repository": { "full_name": "owner/repo" } }
//! ```
//!
//! A flat `{environment, ref, sha, repository}` object is accepted too.
//! Anything missing or of the wrong type becomes `None`; normalization
//! never fails.

use crate::models::{DeploymentInfo, TriggerEvent};
use serde_json::Value;

/// Build an external trigger event from a raw payload.
pub fn normalize_deployment(payload: &Value) -> TriggerEvent {
    TriggerEvent::external(extract_deployment(payload), payload.clone())
}

/// Extract deployment fields with `None` defaults.
pub fn extract_deployment(payload: &Value) -> DeploymentInfo {
    let deployment = payload.get("deployment").filter(|d| d.is_object());
    let field = |name: &str| -> Option<String> {
        deployment
            .and_then(|d| string_at(d, name))
            .or_else(|| string_at(payload, name))
    };

    let repository = payload.get("repository").and_then(|repo| match repo {
        Value::String(name) => Some(name.clone()),
        Value::Object(_) => string_at(repo, "full_name"),
        _ => None,
    });

    DeploymentInfo {
        environment: field("environment"),
        git_ref: field("ref"),
        sha: field("sha"),
        repository,
    }
}

fn string_at(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}
