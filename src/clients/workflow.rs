//! Workflow store client (the replica).
//!
//! Records live in collections and carry typed properties. We only ever read
//! and write plain-text projections of those properties; the canonical id is
//! stored in a searchable text property chosen by the caller.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::clients::{expect_success, read_json, request_failed};
use crate::config::WorkflowConfig;
use crate::error::ClientError;

const SERVICE: &str = "workflow";
const API_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// A single property value to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    Text(String),
    Select(String),
    Url(String),
}

impl PropertyValue {
    pub fn as_text(&self) -> &str {
        match self {
            Self::Title(s) | Self::Text(s) | Self::Select(s) | Self::Url(s) => s,
        }
    }

    fn to_wire(&self) -> Value {
        match self {
            Self::Title(s) => json!({ "title": [{ "text": { "content": s } }] }),
            Self::Text(s) => json!({ "rich_text": [{ "text": { "content": s } }] }),
            Self::Select(s) => json!({ "select": { "name": s } }),
            Self::Url(s) if s.is_empty() => json!({ "url": null }),
            Self::Url(s) => json!({ "url": s }),
        }
    }
}

/// Properties for a create or update call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDraft {
    pub properties: BTreeMap<String, PropertyValue>,
}

impl RecordDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: PropertyValue) -> Self {
        self.properties.insert(name.to_string(), value);
        self
    }

    fn to_wire(&self) -> Value {
        let props: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, value)| (name.clone(), value.to_wire()))
            .collect();
        Value::Object(props)
    }
}

/// A record as read back from the store, properties flattened to text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRecord {
    pub id: String,
    pub created_time: Option<DateTime<Utc>>,
    /// Store-side user id of whoever created the record.
    pub created_by: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl WorkflowRecord {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

#[async_trait]
pub trait WorkflowClient: Send + Sync {
    /// Every record in `collection`, following pagination to the end.
    async fn query_all(&self, collection: &str) -> Result<Vec<WorkflowRecord>, ClientError>;

    async fn create_record(
        &self,
        collection: &str,
        draft: &RecordDraft,
    ) -> Result<WorkflowRecord, ClientError>;

    async fn update_record(
        &self,
        record_id: &str,
        draft: &RecordDraft,
    ) -> Result<WorkflowRecord, ClientError>;

    async fn append_comment(&self, record_id: &str, text: &str) -> Result<(), ClientError>;
}

// ── Wire format ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct QueryPage {
    results: Vec<PageDto>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PageDto {
    id: String,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
    #[serde(default)]
    created_by: Option<UserRef>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

impl From<PageDto> for WorkflowRecord {
    fn from(page: PageDto) -> Self {
        let fields = page
            .properties
            .iter()
            .filter_map(|(name, prop)| property_text(prop).map(|text| (name.clone(), text)))
            .collect();
        Self {
            id: page.id,
            created_time: page.created_time,
            created_by: page.created_by.map(|u| u.id),
            fields,
        }
    }
}

/// Plain-text projection of one property, keyed off its `type` tag.
fn property_text(prop: &Value) -> Option<String> {
    let kind = prop.get("type")?.as_str()?;
    let value = prop.get(kind)?;
    match kind {
        "title" | "rich_text" => Some(
            value
                .as_array()?
                .iter()
                .filter_map(|span| span.get("plain_text").and_then(Value::as_str))
                .collect(),
        ),
        "select" | "status" => value.get("name").and_then(Value::as_str).map(str::to_string),
        "url" | "email" | "phone_number" => value.as_str().map(str::to_string),
        "number" => value.as_f64().map(|n| n.to_string()),
        "people" => value
            .as_array()?
            .first()
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

// ── HTTP client ─────────────────────────────────────────────────────

pub struct NotionWorkflowClient {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl NotionWorkflowClient {
    pub fn new(config: &WorkflowConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}/v1/{path}", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .header("Notion-Version", API_VERSION)
    }
}

#[async_trait]
impl WorkflowClient for NotionWorkflowClient {
    async fn query_all(&self, collection: &str) -> Result<Vec<WorkflowRecord>, ClientError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let resp = self
                .request(reqwest::Method::POST, &format!("databases/{collection}/query"))
                .json(&body)
                .send()
                .await
                .map_err(|e| request_failed(SERVICE, e))?;
            let page: QueryPage = read_json(SERVICE, resp).await?;

            records.extend(page.results.into_iter().map(WorkflowRecord::from));

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(collection = collection, count = records.len(), "Queried workflow collection");
        Ok(records)
    }

    async fn create_record(
        &self,
        collection: &str,
        draft: &RecordDraft,
    ) -> Result<WorkflowRecord, ClientError> {
        let resp = self
            .request(reqwest::Method::POST, "pages")
            .json(&json!({
                "parent": { "database_id": collection },
                "properties": draft.to_wire(),
            }))
            .send()
            .await
            .map_err(|e| request_failed(SERVICE, e))?;
        let page: PageDto = read_json(SERVICE, resp).await?;
        Ok(page.into())
    }

    async fn update_record(
        &self,
        record_id: &str,
        draft: &RecordDraft,
    ) -> Result<WorkflowRecord, ClientError> {
        let resp = self
            .request(reqwest::Method::PATCH, &format!("pages/{record_id}"))
            .json(&json!({ "properties": draft.to_wire() }))
            .send()
            .await
            .map_err(|e| request_failed(SERVICE, e))?;
        let page: PageDto = read_json(SERVICE, resp).await?;
        Ok(page.into())
    }

    async fn append_comment(&self, record_id: &str, text: &str) -> Result<(), ClientError> {
        let resp = self
            .request(reqwest::Method::POST, "comments")
            .json(&json!({
                "parent": { "page_id": record_id },
                "rich_text": [{ "text": { "content": text } }],
            }))
            .send()
            .await
            .map_err(|e| request_failed(SERVICE, e))?;
        expect_success(SERVICE, resp).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};

    use super::*;

    fn page(id: &str, title: &str) -> Value {
        json!({
            "id": id,
            "created_time": "2024-03-01T10:00:00.000Z",
            "created_by": { "id": "user-1" },
            "properties": {
                "Name": { "type": "title", "title": [{ "plain_text": title }] },
                "Canonical ID": { "type": "rich_text", "rich_text": [{ "plain_text": "pr-" }, { "plain_text": id }] },
                "Status": { "type": "select", "select": { "name": "active" } },
                "Link": { "type": "url", "url": null }
            }
        })
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://127.0.0.1:{port}")
    }

    fn client(base_url: String) -> NotionWorkflowClient {
        NotionWorkflowClient::new(&WorkflowConfig {
            base_url,
            token: SecretString::from("secret"),
            pull_request_collection: "prs".into(),
            commit_collection: "commits".into(),
        })
    }

    #[test]
    fn page_flattens_properties() {
        let record: WorkflowRecord = serde_json::from_value::<PageDto>(page("7", "Fix footer"))
            .unwrap()
            .into();
        assert_eq!(record.field("Name"), Some("Fix footer"));
        assert_eq!(record.field("Canonical ID"), Some("pr-7"));
        assert_eq!(record.field("Status"), Some("active"));
        assert_eq!(record.field("Link"), None);
        assert_eq!(record.created_by.as_deref(), Some("user-1"));
        assert!(record.created_time.is_some());
    }

    #[test]
    fn draft_encodes_typed_properties() {
        let draft = RecordDraft::new()
            .with("Name", PropertyValue::Title("Add login".into()))
            .with("Status", PropertyValue::Select("completed".into()))
            .with("Link", PropertyValue::Url(String::new()));
        let wire = draft.to_wire();
        assert_eq!(wire["Name"]["title"][0]["text"]["content"], "Add login");
        assert_eq!(wire["Status"]["select"]["name"], "completed");
        assert!(wire["Link"]["url"].is_null());
    }

    #[tokio::test]
    async fn query_all_follows_cursor() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/v1/databases/{id}/query",
                post(
                    |State(calls): State<Arc<AtomicUsize>>, Json(body): Json<Value>| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        match body.get("start_cursor").and_then(Value::as_str) {
                            None => Json(json!({
                                "results": [page("1", "a"), page("2", "b")],
                                "has_more": true,
                                "next_cursor": "c2"
                            })),
                            Some("c2") => Json(json!({
                                "results": [page("3", "c")],
                                "has_more": false,
                                "next_cursor": null
                            })),
                            Some(other) => panic!("unexpected cursor {other}"),
                        }
                    },
                ),
            )
            .with_state(calls.clone());
        let base = serve(app).await;

        let records = client(base).query_all("prs").await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let app = Router::new().route(
            "/v1/comments",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad token") }),
        );
        let base = serve(app).await;

        let err = client(base).append_comment("page-1", "hi").await.unwrap_err();
        match err {
            ClientError::Status { status, body, .. } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad token");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
