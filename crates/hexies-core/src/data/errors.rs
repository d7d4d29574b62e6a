//! Error types for the plugin core

use thiserror::Error;

use crate::data::identifiers::{ItemId, WidgetId};

/// Errors surfaced by the plugin services.
#[derive(Error, Debug)]
pub enum HexiesError {
    #[error("Access denied to item {item_id}: upgrade required")]
    AccessDenied { item_id: ItemId },

    #[error("Custom item limit reached ({limit} items); upgrade to create more")]
    QuotaExceeded { limit: i64 },

    #[error("Canvas operation '{operation}' failed: {reason}")]
    HostOperationFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("Session expired; re-authentication required")]
    AuthExpired,

    #[error("Operation already in progress for {target}")]
    OperationInProgress { target: String },

    #[error("Backend unreachable: {0}")]
    NetworkUnavailable(String),

    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Item {0} is not owned by the current user")]
    NotOwner(ItemId),

    #[error("Invalid draft: {0}")]
    InvalidDraft(String),

    #[error("Invalid catalog item: {0}")]
    InvalidItem(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization/Deserialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HexiesError {
    /// Errors the UI is expected to present to the user as-is.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            HexiesError::AccessDenied { .. }
                | HexiesError::QuotaExceeded { .. }
                | HexiesError::HostOperationFailed { .. }
                | HexiesError::InvalidDraft(_)
                | HexiesError::NotOwner(_)
        )
    }

    /// Errors for which retrying the same call later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HexiesError::AuthExpired
                | HexiesError::OperationInProgress { .. }
                | HexiesError::NetworkUnavailable(_)
                | HexiesError::HostOperationFailed { .. }
        )
    }

    pub fn host(operation: &'static str, error: HostError) -> Self {
        HexiesError::HostOperationFailed {
            operation,
            reason: error.to_string(),
        }
    }
}

impl From<BackendError> for HexiesError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::Unreachable(msg) => HexiesError::NetworkUnavailable(msg),
            BackendError::Unauthorized => HexiesError::AuthExpired,
            other => HexiesError::Backend(other.to_string()),
        }
    }
}

/// Errors reported by the backend collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Unreachable(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Backend returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Failures that should put the session into fallback mode.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Unreachable(_))
    }
}

/// Errors reported by the canvas host surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("Widget not found: {0}")]
    NotFound(WidgetId),
    #[error("Host rejected the request: {0}")]
    Rejected(String),
    #[error("Host unavailable: {0}")]
    Unavailable(String),
}

/// Errors from the local fallback cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache entry is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_message_carries_limit() {
        let error = HexiesError::QuotaExceeded { limit: 5 };
        assert_eq!(
            format!("{}", error),
            "Custom item limit reached (5 items); upgrade to create more"
        );
        assert!(error.is_user_visible());
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_backend_error_mapping() {
        assert!(matches!(
            HexiesError::from(BackendError::Unreachable("refused".into())),
            HexiesError::NetworkUnavailable(_)
        ));
        assert!(matches!(
            HexiesError::from(BackendError::Unauthorized),
            HexiesError::AuthExpired
        ));
        assert!(matches!(
            HexiesError::from(BackendError::Status { status: 500, message: "boom".into() }),
            HexiesError::Backend(_)
        ));
    }

    #[test]
    fn test_host_error_display() {
        let error = HexiesError::host("create_widget", HostError::Rejected("quota".into()));
        assert_eq!(
            format!("{}", error),
            "Canvas operation 'create_widget' failed: Host rejected the request: quota"
        );
    }
}
