//! Error type shared by all helpdesk crates.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HelpdeskError>;

#[derive(Debug, Error)]
pub enum HelpdeskError {
    #[error("Config error: {0}")]
    Config(String),

    /// Open/query failure against a tenant store or the platform registry.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Tenant error: {0}")]
    Tenant(String),

    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// The current-store accessor was called outside a resolved request scope.
    #[error("No tenant context is active for this task")]
    NoTenantContext,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl HelpdeskError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn tenant(msg: impl Into<String>) -> Self {
        Self::Tenant(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
