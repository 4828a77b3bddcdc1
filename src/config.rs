//! Configuration types, built from environment variables.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default reconciliation poll interval: 5 minutes.
pub const DEFAULT_POLL_TIME_MS: u64 = 300_000;

/// Mailbox configuration for review notifications.
#[derive(Debug, Clone)]
pub struct MailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
    /// Only messages from this exact address are parsed.
    pub notification_sender: String,
    pub poll_interval_secs: u64,
    /// Reconnect after transport failures instead of stopping the listener.
    pub reconnect: bool,
}

impl MailConfig {
    /// Build config from environment variables.
    /// Returns `None` if `MAIL_IMAP_HOST` is not set (ingestion disabled).
    pub fn from_env() -> Option<Self> {
        let imap_host = std::env::var("MAIL_IMAP_HOST").ok()?;

        let imap_port: u16 = std::env::var("MAIL_IMAP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(993);

        let username = std::env::var("MAIL_USERNAME").unwrap_or_default();
        let password = SecretString::from(std::env::var("MAIL_PASSWORD").unwrap_or_default());
        let mailbox = std::env::var("MAIL_MAILBOX").unwrap_or_else(|_| "INBOX".to_string());

        let notification_sender = std::env::var("MAIL_NOTIFICATION_SENDER")
            .unwrap_or_else(|_| "azuredevops@microsoft.com".to_string());

        let poll_interval_secs: u64 = std::env::var("MAIL_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let reconnect = std::env::var("MAIL_RECONNECT")
            .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Some(Self {
            imap_host,
            imap_port,
            username,
            password,
            mailbox,
            notification_sender,
            poll_interval_secs,
            reconnect,
        })
    }
}

/// Canonical source system (review service REST API).
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// e.g. `https://dev.azure.com/acme/dashboard`
    pub base_url: String,
    pub repository: String,
    pub branch: String,
    pub token: SecretString,
    /// Page size cap for pull request queries.
    pub page_size: u32,
}

impl SourceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: required("SOURCE_BASE_URL")?,
            repository: required("SOURCE_REPOSITORY")?,
            branch: std::env::var("SOURCE_BRANCH").unwrap_or_else(|_| "main".to_string()),
            token: SecretString::from(required("SOURCE_TOKEN")?),
            page_size: parse_or("SOURCE_PAGE_SIZE", 100)?,
        })
    }
}

/// Workflow/collaboration store (the replica).
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub base_url: String,
    pub token: SecretString,
    pub pull_request_collection: String,
    pub commit_collection: String,
}

impl WorkflowConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: std::env::var("WORKFLOW_BASE_URL")
                .unwrap_or_else(|_| "https://api.notion.com".to_string()),
            token: SecretString::from(required("WORKFLOW_TOKEN")?),
            pull_request_collection: required("WORKFLOW_PULL_REQUEST_COLLECTION")?,
            commit_collection: required("WORKFLOW_COMMIT_COLLECTION")?,
        })
    }
}

/// Chat webhook used for threaded lifecycle notifications.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub webhook_url: SecretString,
    pub dev_role_id: Option<String>,
    pub design_role_id: Option<String>,
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            webhook_url: SecretString::from(required("CHAT_WEBHOOK_URL")?),
            dev_role_id: std::env::var("CHAT_DEV_ROLE_ID").ok(),
            design_role_id: std::env::var("CHAT_DESIGN_ROLE_ID").ok(),
        })
    }
}

/// Reconciliation engine tuning.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_time_ms: u64,
    /// UTC hours `[start, end)` during which the engines fetch. `None` = always.
    pub active_hours: Option<(u32, u32)>,
    /// Start both engines on boot.
    pub autostart: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_time_ms: DEFAULT_POLL_TIME_MS,
            active_hours: None,
            autostart: true,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let active_hours = match std::env::var("SYNC_ACTIVE_HOURS") {
            Ok(raw) => Some(parse_hour_range(&raw)?),
            Err(_) => None,
        };
        let autostart = std::env::var("SYNC_AUTOSTART")
            .map(|v| !matches!(v.as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        Ok(Self {
            poll_time_ms: parse_or("SYNC_POLL_TIME_MS", DEFAULT_POLL_TIME_MS)?,
            active_hours,
            autostart,
        })
    }
}

/// HTTP control surface and storage locations.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: String,
    pub log_dir: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            port: parse_or("REVIEW_SYNC_PORT", 8080)?,
            db_path: std::env::var("REVIEW_SYNC_DB_PATH")
                .unwrap_or_else(|_| "./data/review-sync.db".to_string()),
            log_dir: std::env::var("REVIEW_SYNC_LOG_DIR").ok(),
        })
    }
}

fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse `"8-20"` into `(8, 20)`.
fn parse_hour_range(raw: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: "SYNC_ACTIVE_HOURS".to_string(),
        message: message.to_string(),
    };
    let (start, end) = raw
        .split_once('-')
        .ok_or_else(|| invalid("expected START-END"))?;
    let start: u32 = start.trim().parse().map_err(|_| invalid("bad start hour"))?;
    let end: u32 = end.trim().parse().map_err(|_| invalid("bad end hour"))?;
    if start > 23 || end > 24 || start >= end {
        return Err(invalid("hours must satisfy 0 <= START < END <= 24"));
    }
    Ok((start, end))
}
