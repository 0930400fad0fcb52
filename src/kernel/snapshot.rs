//! Session snapshot: the single record of truth for session state.
//! Exclusively owned and mutated by the kernel's reducer; everything else
//! sees clones or watch copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Loading,
    Authenticated,
    SignedOut,
    Locked,
}

/// Tenant/role claims produced by one bootstrap call. Ephemeral: consumed to
/// populate the snapshot, then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub tenant_id: String,
    pub roles: Vec<String>,
    pub business_id: String,
    pub business_name: String,
}

/// Identity fields reported by the provider for the signed-in user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub phase: Phase,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub business_id: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
    /// Monotonic per kernel lifetime; +1 on every successful bootstrap or
    /// refresh that yields claims. Change detector for cache consumers.
    pub claims_version: u64,
    /// Opaque bearer string; present iff `phase == Authenticated`. Memory
    /// only, never the persisted copy.
    #[serde(skip)]
    pub token: Option<String>,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn initial() -> Self {
        Self {
            phase: Phase::Loading,
            user_id: None,
            email: None,
            tenant_id: None,
            roles: Vec::new(),
            business_id: None,
            business_name: None,
            claims_version: 0,
            token: None,
            last_activity_at: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == Phase::Authenticated
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Structural invariants that must hold after every reducer step.
    /// Returned as a list of violations so tests can print all of them.
    pub fn invariant_violations(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.token.is_some() != (self.phase == Phase::Authenticated) {
            out.push("token present iff authenticated");
        }
        if !self.roles.is_empty() != (self.phase == Phase::Authenticated) {
            out.push("roles non-empty iff authenticated");
        }
        if self.phase != Phase::Authenticated && (self.user_id.is_some() || self.email.is_some()) {
            out.push("identity fields only while authenticated");
        }
        out
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::initial()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_snapshot_holds_invariants() {
        let s = Snapshot::initial();
        assert_eq!(s.phase, Phase::Loading);
        assert_eq!(s.claims_version, 0);
        assert!(s.invariant_violations().is_empty());
    }

    #[test]
    fn token_never_serializes() {
        let mut s = Snapshot::initial();
        s.phase = Phase::Authenticated;
        s.token = Some("secret".into());
        s.roles = vec!["owner".into()];
        s.user_id = Some("u_1".into());
        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("token").is_none(), "token must not leave memory: {}", json);
    }
}
