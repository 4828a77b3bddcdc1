//! Error types for review-sync.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Control error: {0}")]
    Control(#[from] ControlError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Mailbox transport errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mailbox connection failed: {0}")]
    Connect(String),

    #[error("Mailbox transport timed out: {0}")]
    Timeout(String),

    #[error("Mailbox authentication failed for {username}")]
    AuthFailed { username: String },

    #[error("Mailbox protocol error: {0}")]
    Protocol(String),

    #[error("Failed to mark message {uid} as seen: {reason}")]
    MarkSeen { uid: String, reason: String },
}

impl MailError {
    /// Whether the error came from the transport rather than the server's answer.
    ///
    /// Only these are eligible for automatic reconnection.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout(_))
    }
}

/// External API client errors (source system, workflow store, chat).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },
}

/// Reconciliation errors. Any of these escaping a tick halts the engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Fetching source snapshot failed: {0}")]
    FetchSource(#[source] ClientError),

    #[error("Fetching replica snapshot failed: {0}")]
    FetchReplica(#[source] ClientError),

    #[error("Upsert failed for all {attempted} attempted item(s); last error: {last}")]
    Insert { attempted: usize, last: String },
}

/// Control-surface request errors. Always client errors.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("Malformed request body: {0}")]
    MalformedBody(String),

    #[error("Invalid pollTime '{0}': expected a positive integer number of milliseconds")]
    InvalidPollTime(String),

    #[error("Invalid notification payload: {0}")]
    InvalidNotification(String),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
