//! Unified session error model.
//! This module provides a common error enum used across the kernel's control
//! surface, the bootstrap resolver and the HTTP adapter, along with helper
//! mappers. Steady-state failures travel through the Snapshot and the event
//! channel; this type is the structured report for operations that genuinely
//! failed.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthError {
    Bootstrap { code: String, message: String },
    TokenRefresh { code: String, message: String },
    Unauthorized { code: String, message: String },
    Network { code: String, message: String },
    Timeout { code: String, message: String },
    Provider { code: String, message: String },
    Internal { code: String, message: String },
}

impl AuthError {
    pub fn code_str(&self) -> &str {
        match self {
            AuthError::Bootstrap { code, .. }
            | AuthError::TokenRefresh { code, .. }
            | AuthError::Unauthorized { code, .. }
            | AuthError::Network { code, .. }
            | AuthError::Timeout { code, .. }
            | AuthError::Provider { code, .. }
            | AuthError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AuthError::Bootstrap { message, .. }
            | AuthError::TokenRefresh { message, .. }
            | AuthError::Unauthorized { message, .. }
            | AuthError::Network { message, .. }
            | AuthError::Timeout { message, .. }
            | AuthError::Provider { message, .. }
            | AuthError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn bootstrap<S: Into<String>>(code: S, msg: S) -> Self { AuthError::Bootstrap { code: code.into(), message: msg.into() } }
    pub fn token_refresh<S: Into<String>>(code: S, msg: S) -> Self { AuthError::TokenRefresh { code: code.into(), message: msg.into() } }
    pub fn unauthorized<S: Into<String>>(code: S, msg: S) -> Self { AuthError::Unauthorized { code: code.into(), message: msg.into() } }
    pub fn network<S: Into<String>>(code: S, msg: S) -> Self { AuthError::Network { code: code.into(), message: msg.into() } }
    pub fn timeout<S: Into<String>>(code: S, msg: S) -> Self { AuthError::Timeout { code: code.into(), message: msg.into() } }
    pub fn provider<S: Into<String>>(code: S, msg: S) -> Self { AuthError::Provider { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AuthError::Internal { code: code.into(), message: msg.into() } }

    /// Status carried on the synthetic results the HTTP adapter hands back to
    /// callers instead of raising: 401 passthrough, 408 for a fired timeout,
    /// 0 for transport-level failures with no response at all.
    pub fn synthetic_status(&self) -> u16 {
        match self {
            AuthError::Unauthorized { .. } => 401,
            AuthError::Timeout { .. } => 408,
            AuthError::Network { .. } => 0,
            AuthError::Bootstrap { .. } | AuthError::TokenRefresh { .. } => 401,
            AuthError::Provider { .. } | AuthError::Internal { .. } => 0,
        }
    }
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AuthError {}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        // Default mapping: treat as Internal unless downcasted elsewhere
        AuthError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AuthError::Timeout { code: "request_timeout".into(), message: err.to_string() }
        } else {
            AuthError::Network { code: "network_error".into(), message: err.to_string() }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_status_mapping() {
        assert_eq!(AuthError::unauthorized("unauthorized", "no").synthetic_status(), 401);
        assert_eq!(AuthError::timeout("request_timeout", "slow").synthetic_status(), 408);
        assert_eq!(AuthError::network("network_error", "down").synthetic_status(), 0);
        assert_eq!(AuthError::internal("internal", "bug").synthetic_status(), 0);
    }

    #[test]
    fn display_is_code_then_message() {
        let e = AuthError::bootstrap("bootstrap_fail", "claims fetch failed");
        assert_eq!(e.to_string(), "bootstrap_fail: claims fetch failed");
        assert_eq!(e.code_str(), "bootstrap_fail");
        assert_eq!(e.message(), "claims fetch failed");
    }

    #[test]
    fn anyhow_fallback_maps_to_internal() {
        let e: AuthError = anyhow::anyhow!("boom").into();
        assert_eq!(e.code_str(), "internal_error");
        assert_eq!(e.message(), "boom");
    }
}
