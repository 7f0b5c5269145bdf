//! Error taxonomy shared across the orchestration engine
//!
//! Variants correspond to the error kinds named by the core's external
//! contract: callers branch on kind, not on message text, to decide whether
//! to retry, surface a status code, or give up.

use thiserror::Error;

/// Result type alias used throughout the engine
pub type SwarmResult<T> = Result<T, SwarmError>;

#[derive(Debug, Error, Clone)]
pub enum SwarmError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("not active: {0}")]
    NotActive(String),

    #[error("overloaded: {0}")]
    Overloaded(String),

    #[error("no agents available: {0}")]
    NoAgents(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("retriable error: {0}")]
    Retriable(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SwarmError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn not_active(msg: impl Into<String>) -> Self {
        Self::NotActive(msg.into())
    }
    pub fn overloaded(msg: impl Into<String>) -> Self {
        Self::Overloaded(msg.into())
    }
    pub fn no_agents(msg: impl Into<String>) -> Self {
        Self::NoAgents(msg.into())
    }
    pub fn precondition_failed(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }
    pub fn timed_out(msg: impl Into<String>) -> Self {
        Self::TimedOut(msg.into())
    }
    pub fn retriable(msg: impl Into<String>) -> Self {
        Self::Retriable(msg.into())
    }
    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }
    pub fn external_service(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a task returning this error kind may be retried by the step
    /// executor's retry policy.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_) | Self::TimedOut(_))
    }

    /// Exit code used by the external control surface (CLI/RPC wrappers).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 1,
            Self::NotFound(_) | Self::NotActive(_) => 2,
            Self::Overloaded(_) => 3,
            Self::ExternalService(_) => 4,
            Self::NoAgents(_)
            | Self::PreconditionFailed(_)
            | Self::TimedOut(_)
            | Self::Retriable(_)
            | Self::Cancelled(_)
            | Self::Integrity(_)
            | Self::Internal(_) => 5,
        }
    }
}

impl From<std::io::Error> for SwarmError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for SwarmError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<serde_yaml::Error> for SwarmError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_kinds() {
        assert!(SwarmError::retriable("network blip").is_retriable());
        assert!(SwarmError::timed_out("deadline").is_retriable());
        assert!(!SwarmError::validation("bad input").is_retriable());
        assert!(!SwarmError::cancelled("user requested").is_retriable());
    }

    #[test]
    fn exit_codes_match_external_contract() {
        assert_eq!(SwarmError::validation("x").exit_code(), 1);
        assert_eq!(SwarmError::not_found("x").exit_code(), 2);
        assert_eq!(SwarmError::overloaded("x").exit_code(), 3);
        assert_eq!(SwarmError::external_service("x").exit_code(), 4);
        assert_eq!(SwarmError::internal("x").exit_code(), 5);
    }
}
