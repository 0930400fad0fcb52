//! Kernel configuration: hard defaults plus SESSIUM_* environment overrides.
//! Values parse leniently; anything absent or unparseable falls back to the
//! default so a bad environment never prevents startup.

use std::time::Duration;

/// Tunables for one kernel instance.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Backend endpoint exchanged a bearer token for tenant/role claims.
    pub bootstrap_url: String,
    /// Named token template requested from the identity provider, if any.
    pub token_profile: Option<String>,
    /// How far before token expiry the scheduled renewal wakes up.
    pub renew_lead: Duration,
    /// Inactivity span after which the session locks.
    pub idle_threshold: Duration,
    /// Default per-request timeout for the HTTP adapter.
    pub http_timeout: Duration,
    /// Event channel capacity; slow subscribers past this lag lose events.
    pub event_capacity: usize,
}

const DEFAULT_RENEW_LEAD_SECS: u64 = 60;
const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 20 * 60;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EVENT_CAPACITY: usize = 64;

impl KernelConfig {
    pub fn new(bootstrap_url: impl Into<String>) -> Self {
        Self {
            bootstrap_url: bootstrap_url.into(),
            token_profile: None,
            renew_lead: Duration::from_secs(DEFAULT_RENEW_LEAD_SECS),
            idle_threshold: Duration::from_secs(DEFAULT_IDLE_THRESHOLD_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Defaults with environment overrides applied. Seconds-valued knobs:
    /// SESSIUM_RENEW_LEAD_SECS, SESSIUM_IDLE_THRESHOLD_SECS,
    /// SESSIUM_HTTP_TIMEOUT_SECS; plus SESSIUM_TOKEN_PROFILE.
    pub fn from_env(bootstrap_url: impl Into<String>) -> Self {
        let mut cfg = Self::new(bootstrap_url);
        if let Some(secs) = env_u64("SESSIUM_RENEW_LEAD_SECS") {
            cfg.renew_lead = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("SESSIUM_IDLE_THRESHOLD_SECS") {
            cfg.idle_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("SESSIUM_HTTP_TIMEOUT_SECS") {
            cfg.http_timeout = Duration::from_secs(secs);
        }
        if let Ok(profile) = std::env::var("SESSIUM_TOKEN_PROFILE") {
            if !profile.is_empty() { cfg.token_profile = Some(profile); }
        }
        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_policy() {
        let cfg = KernelConfig::new("http://localhost:7878/bootstrap");
        assert_eq!(cfg.renew_lead, Duration::from_secs(60));
        assert_eq!(cfg.idle_threshold, Duration::from_secs(1200));
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        assert!(cfg.token_profile.is_none());
    }

    #[test]
    fn env_override_and_garbage_fallback() {
        std::env::set_var("SESSIUM_IDLE_THRESHOLD_SECS", "90");
        std::env::set_var("SESSIUM_HTTP_TIMEOUT_SECS", "not-a-number");
        let cfg = KernelConfig::from_env("http://localhost:7878/bootstrap");
        assert_eq!(cfg.idle_threshold, Duration::from_secs(90));
        assert_eq!(cfg.http_timeout, Duration::from_secs(30));
        std::env::remove_var("SESSIUM_IDLE_THRESHOLD_SECS");
        std::env::remove_var("SESSIUM_HTTP_TIMEOUT_SECS");
    }
}
