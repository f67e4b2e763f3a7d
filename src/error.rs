//! Error taxonomy shared by every grid component.

use thiserror::Error;

/// Failures surfaced by the grid engine and its persistence collaborators.
///
/// `Validation` and `Terminal` errors are shown to the user immediately,
/// `Transient` errors are retried by the [`RetryExecutor`](crate::services::retry::RetryExecutor)
/// before they surface, and `Concurrency` is returned when a serialized
/// operation class is already busy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("temporary failure: {0}")]
    Transient(String),

    #[error("request rejected: {0}")]
    Terminal(String),

    #[error("operation in progress: {0}")]
    Concurrency(String),
}

pub type GridResult<T> = std::result::Result<T, GridError>;

impl GridError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::Terminal(msg.into())
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::Concurrency(msg.into())
    }

    /// Default retry classifier: only network/server failures are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Classify a response status from the remote store.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = if body.trim().is_empty() {
            format!("status {}", status)
        } else {
            format!("status {}: {}", status, body.trim())
        };

        match status {
            408 | 429 => Self::Transient(detail),
            401 | 403 => Self::Terminal(format!("not authorized ({})", detail)),
            400..=499 => Self::Terminal(detail),
            500..=599 => Self::Transient(detail),
            _ => Self::Terminal(format!("unexpected response ({})", detail)),
        }
    }

    /// Message suitable for a toast/notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::Concurrency(msg) => msg.clone(),
            Self::Transient(msg) => format!("Could not reach the server: {}", msg),
            Self::Terminal(msg) => format!("The server rejected the change: {}", msg),
        }
    }
}

impl From<reqwest::Error> for GridError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), &err.to_string()),
            None if err.is_decode() => Self::Terminal(format!("malformed response: {}", err)),
            None => Self::Transient(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(GridError::from_status(503, "").is_retryable());
        assert!(GridError::from_status(500, "boom").is_retryable());
        assert!(GridError::from_status(429, "slow down").is_retryable());
        assert!(GridError::from_status(408, "").is_retryable());

        assert!(matches!(
            GridError::from_status(401, ""),
            GridError::Terminal(_)
        ));
        assert!(matches!(
            GridError::from_status(403, "rls"),
            GridError::Terminal(_)
        ));
        assert!(matches!(
            GridError::from_status(422, "bad value"),
            GridError::Terminal(_)
        ));
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(!GridError::validation("x").is_retryable());
        assert!(!GridError::terminal("x").is_retryable());
        assert!(!GridError::concurrency("x").is_retryable());
        assert!(GridError::transient("x").is_retryable());
    }
}
