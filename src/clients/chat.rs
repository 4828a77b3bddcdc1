//! Forum-style chat webhook: one thread per pull request.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use crate::clients::{read_json, request_failed};
use crate::config::ChatConfig;
use crate::error::ClientError;

const SERVICE: &str = "chat";
/// Thread names are capped by the chat service.
const MAX_THREAD_NAME: usize = 100;

/// Which role groups a post should ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionScope {
    Dev,
    Design,
    Both,
}

/// Role ids to mention, resolved from config.
#[derive(Debug, Clone, Default)]
pub struct RoleMentions {
    pub dev: Option<String>,
    pub design: Option<String>,
}

impl RoleMentions {
    pub fn from_config(config: &ChatConfig) -> Self {
        Self {
            dev: config.dev_role_id.clone(),
            design: config.design_role_id.clone(),
        }
    }

    /// Mention prefix for `scope`, empty when no matching role is configured.
    pub fn render(&self, scope: MentionScope) -> String {
        let roles: Vec<&String> = match scope {
            MentionScope::Dev => self.dev.iter().collect(),
            MentionScope::Design => self.design.iter().collect(),
            MentionScope::Both => self.dev.iter().chain(self.design.iter()).collect(),
        };
        roles
            .iter()
            .map(|id| format!("<@&{id}>"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Open a new thread with a first message. Returns the thread id.
    async fn start_thread(&self, name: &str, content: &str) -> Result<String, ClientError>;

    async fn post_in_thread(&self, thread_id: &str, content: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Deserialize)]
struct MessageDto {
    channel_id: String,
}

pub struct WebhookChatClient {
    webhook_url: SecretString,
    client: reqwest::Client,
}

impl WebhookChatClient {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            webhook_url: config.webhook_url.clone(),
            client: reqwest::Client::new(),
        }
    }
}

fn thread_name(name: &str) -> String {
    name.chars().take(MAX_THREAD_NAME).collect()
}

#[async_trait]
impl ChatClient for WebhookChatClient {
    async fn start_thread(&self, name: &str, content: &str) -> Result<String, ClientError> {
        let resp = self
            .client
            .post(self.webhook_url.expose_secret())
            .query(&[("wait", "true")])
            .json(&json!({ "thread_name": thread_name(name), "content": content }))
            .send()
            .await
            .map_err(|e| request_failed(SERVICE, e))?;
        let message: MessageDto = read_json(SERVICE, resp).await?;
        tracing::debug!(thread_id = %message.channel_id, "Started chat thread");
        Ok(message.channel_id)
    }

    async fn post_in_thread(&self, thread_id: &str, content: &str) -> Result<(), ClientError> {
        let resp = self
            .client
            .post(self.webhook_url.expose_secret())
            .query(&[("wait", "true"), ("thread_id", thread_id)])
            .json(&json!({ "content": content }))
            .send()
            .await
            .map_err(|e| request_failed(SERVICE, e))?;
        let _: MessageDto = read_json(SERVICE, resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    use super::*;

    fn roles() -> RoleMentions {
        RoleMentions {
            dev: Some("111".into()),
            design: Some("222".into()),
        }
    }

    #[test]
    fn mentions_follow_scope() {
        assert_eq!(roles().render(MentionScope::Dev), "<@&111>");
        assert_eq!(roles().render(MentionScope::Design), "<@&222>");
        assert_eq!(roles().render(MentionScope::Both), "<@&111> <@&222>");
    }

    #[test]
    fn missing_roles_render_empty() {
        let roles = RoleMentions {
            dev: None,
            design: Some("222".into()),
        };
        assert_eq!(roles.render(MentionScope::Dev), "");
        assert_eq!(roles.render(MentionScope::Both), "<@&222>");
    }

    #[test]
    fn thread_name_is_capped() {
        let long = "x".repeat(150);
        assert_eq!(thread_name(&long).chars().count(), MAX_THREAD_NAME);
    }

    #[tokio::test]
    async fn start_thread_returns_channel_id() {
        let app = Router::new().route(
            "/hook",
            post(
                |Query(q): Query<HashMap<String, String>>, Json(body): Json<Value>| async move {
                    assert_eq!(q.get("wait").map(String::as_str), Some("true"));
                    let channel = match q.get("thread_id") {
                        Some(t) => t.clone(),
                        None => {
                            assert_eq!(body["thread_name"], "PR 42: Add login");
                            "thread-9".to_string()
                        }
                    };
                    Json(json!({ "id": "m1", "channel_id": channel }))
                },
            ),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let client = WebhookChatClient::new(&ChatConfig {
            webhook_url: SecretString::from(format!("http://127.0.0.1:{port}/hook")),
            dev_role_id: None,
            design_role_id: None,
        });
        let thread = client.start_thread("PR 42: Add login", "opened").await.unwrap();
        assert_eq!(thread, "thread-9");
        client.post_in_thread(&thread, "approved").await.unwrap();
    }
}
