//! Token renewal scheduling.
//! Reads the expiry field out of a JWT-shaped bearer token and computes when
//! the single pending renewal timer should wake. The decode is NOT a
//! security check: nothing here verifies a signature, the expiry is read
//! purely for scheduling convenience and must never gate authorization.

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum TokenDecodeError {
    #[error("token is not dot-separated with a payload section")]
    Shape,
    #[error("token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("token payload has no usable exp field")]
    MissingExp,
}

/// Extract the `exp` claim (epoch seconds) from an unverified JWT-shaped
/// token. Returns an error for anything that does not look like one; the
/// caller surfaces that as a warning event and simply arms no timer.
pub fn token_expiry(token: &str) -> Result<DateTime<Utc>, TokenDecodeError> {
    let mut parts = token.split('.');
    let payload_b64 = match (parts.next(), parts.next()) {
        (Some(_), Some(p)) if !p.is_empty() => p,
        _ => return Err(TokenDecodeError::Shape),
    };
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload_b64)?;
    let payload: serde_json::Value = serde_json::from_slice(&bytes)?;
    let exp = payload
        .get("exp")
        .and_then(|v| v.as_i64())
        .ok_or(TokenDecodeError::MissingExp)?;
    Utc.timestamp_opt(exp, 0).single().ok_or(TokenDecodeError::MissingExp)
}

/// `renew_at = max(now, expiry - lead)`, returned as the delay from `now`.
/// A token already inside its lead window renews immediately.
pub fn renewal_delay(expiry: DateTime<Utc>, now: DateTime<Utc>, lead: Duration) -> Duration {
    let lead = chrono::Duration::from_std(lead).unwrap_or_else(|_| chrono::Duration::seconds(60));
    let until_renew = expiry - lead - now;
    until_renew.to_std().unwrap_or(Duration::ZERO)
}

/// Holder for the single pending timer task (renewal or idle). Rearming
/// always cancels the previous task first, so at most one is pending.
#[derive(Debug, Default)]
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    pub fn new() -> Self {
        Self { task: None }
    }

    pub fn rearm(&mut self, task: JoinHandle<()>) {
        self.cancel();
        self.task = Some(task);
    }

    pub fn cancel(&mut self) {
        if let Some(t) = self.task.take() {
            t.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
