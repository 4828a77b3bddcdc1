//! Inbound service notifications (build and merge webhooks).
//!
//! The payload is tagged by `eventType`. Known types must match their shape;
//! anything else is kept verbatim as `Unknown` so new event types never fail
//! delivery.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ControlError;

pub const BUILD_COMPLETE: &str = "build.complete";
pub const PULL_REQUEST_MERGED: &str = "git.pullrequest.merged";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BuildResult {
    Succeeded,
    PartiallySucceeded,
    Failed,
    Canceled,
    #[serde(other)]
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    #[serde(rename = "displayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildNotification {
    pub build_number: String,
    pub result: BuildResult,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub requested_for: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitRef {
    #[serde(rename = "commitId")]
    pub commit_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeNotification {
    pub pull_request_id: i64,
    pub title: String,
    #[serde(default)]
    pub merge_status: Option<String>,
    #[serde(default)]
    pub last_merge_commit: Option<CommitRef>,
    #[serde(default)]
    pub created_by: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceNotification {
    Build(BuildNotification),
    Merge(MergeNotification),
    Unknown(Value),
}

impl ServiceNotification {
    pub fn from_json(raw: Value) -> Result<Self, ControlError> {
        let event_type = raw
            .get("eventType")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match event_type.as_str() {
            BUILD_COMPLETE => Ok(Self::Build(resource(&raw, BUILD_COMPLETE)?)),
            PULL_REQUEST_MERGED => Ok(Self::Merge(resource(&raw, PULL_REQUEST_MERGED)?)),
            _ => Ok(Self::Unknown(raw)),
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            Self::Build(_) => BUILD_COMPLETE,
            Self::Merge(_) => PULL_REQUEST_MERGED,
            Self::Unknown(raw) => raw
                .get("eventType")
                .and_then(Value::as_str)
                .unwrap_or("unknown"),
        }
    }
}

fn resource<T: serde::de::DeserializeOwned>(raw: &Value, event_type: &str) -> Result<T, ControlError> {
    let resource = raw
        .get("resource")
        .cloned()
        .ok_or_else(|| ControlError::InvalidNotification(format!("{event_type}: missing resource")))?;
    serde_json::from_value(resource)
        .map_err(|e| ControlError::InvalidNotification(format!("{event_type}: {e}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_build_complete() {
        let n = ServiceNotification::from_json(json!({
            "eventType": "build.complete",
            "resource": {
                "buildNumber": "20240603.4",
                "result": "failed",
                "sourceBranch": "refs/heads/main",
                "requestedFor": { "displayName": "Jane Doe" }
            }
        }))
        .unwrap();
        match n {
            ServiceNotification::Build(b) => {
                assert_eq!(b.result, BuildResult::Failed);
                assert_eq!(b.requested_for.unwrap().display_name, "Jane Doe");
            }
            other => panic!("expected build, got {other:?}"),
        }
    }

    #[test]
    fn parses_merge() {
        let n = ServiceNotification::from_json(json!({
            "eventType": "git.pullrequest.merged",
            "resource": {
                "pullRequestId": 42,
                "title": "Add login",
                "mergeStatus": "succeeded",
                "lastMergeCommit": { "commitId": "abc" }
            }
        }))
        .unwrap();
        assert_eq!(n.event_type(), PULL_REQUEST_MERGED);
        let ServiceNotification::Merge(m) = n else {
            panic!("expected merge");
        };
        assert_eq!(m.pull_request_id, 42);
        assert_eq!(m.last_merge_commit.unwrap().commit_id, "abc");
    }

    #[test]
    fn unknown_event_type_is_kept_raw() {
        let raw = json!({ "eventType": "workitem.updated", "resource": { "id": 7 } });
        let n = ServiceNotification::from_json(raw.clone()).unwrap();
        assert_eq!(n, ServiceNotification::Unknown(raw));
        assert_eq!(n.event_type(), "workitem.updated");
    }

    #[test]
    fn missing_event_type_is_unknown() {
        let n = ServiceNotification::from_json(json!({ "hello": "world" })).unwrap();
        assert!(matches!(n, ServiceNotification::Unknown(_)));
    }

    #[test]
    fn known_type_with_bad_shape_is_rejected() {
        let err = ServiceNotification::from_json(json!({
            "eventType": "git.pullrequest.merged",
            "resource": { "title": "no id" }
        }))
        .unwrap_err();
        assert!(matches!(err, ControlError::InvalidNotification(_)));
    }
}
