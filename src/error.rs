//! Error types for the intake service.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
}

/// Record-store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Application not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Identity-provider errors.
///
/// Mirrors the provider error codes the submission flow maps to user-facing
/// messages (email-already-in-use, weak-password, ...).
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email address already in use")]
    EmailAlreadyInUse,

    #[error("Credential already linked to another account")]
    CredentialAlreadyInUse,

    #[error("Password is too weak")]
    WeakPassword,

    #[error("Email address format is invalid")]
    InvalidEmail,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No session for identity {0}")]
    NoSession(String),

    /// Catch-all for provider-side transport failures. The in-memory
    /// provider never produces this; hosted implementations do.
    #[error("Identity provider failure: {0}")]
    Provider(String),
}

/// Document-store errors.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload not authorized for {path}")]
    Unauthorized { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload failed for {path}: {reason}")]
    Failed { path: String, reason: String },
}

/// Notification-delivery errors (chat webhook, push gateway).
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook POST failed: {0}")]
    Http(String),

    #[error("Webhook rejected payload: status {0}")]
    Rejected(u16),

    /// Gateway-side delivery failure. The logging gateway never produces
    /// this; a real push sender does.
    #[error("Push dispatch failed: {0}")]
    Dispatch(String),
}
