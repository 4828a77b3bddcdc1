//! HTTP clients for the three external systems.

pub mod chat;
pub mod source;
pub mod workflow;

pub use chat::{ChatClient, MentionScope, RoleMentions, WebhookChatClient};
pub use source::{
    HttpSourceClient, PullRequestStatus, SourceClient, SourceCommit, SourcePullRequest, StatusFilter,
};
pub use workflow::{
    NotionWorkflowClient, PropertyValue, RecordDraft, WorkflowClient, WorkflowRecord,
};

use serde::de::DeserializeOwned;

use crate::error::ClientError;

pub(crate) fn request_failed(service: &'static str, e: reqwest::Error) -> ClientError {
    ClientError::RequestFailed {
        service: service.to_string(),
        reason: e.to_string(),
    }
}

/// Check the status and decode a JSON body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            service: service.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    resp.json()
        .await
        .map_err(|e| ClientError::InvalidResponse {
            service: service.to_string(),
            reason: e.to_string(),
        })
}

/// Check the status and discard the body.
pub(crate) async fn expect_success(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<(), ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        service: service.to_string(),
        status: status.as_u16(),
        body,
    })
}
