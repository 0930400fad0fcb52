//! Pure session reducer.
//! `(Snapshot, SessionEvent) -> Snapshot`, total over every (phase, event)
//! pair. All phase logic lives here so it can be unit-tested without timers,
//! sockets or a provider; the kernel applies it inside a synchronous locked
//! section and performs side effects afterwards.

use chrono::{DateTime, Utc};

use super::snapshot::{Claims, Identity, Phase, Snapshot};

/// Internal reducer events. These are kernel-private inputs describing what
/// happened, not the externally observable `AuthEvent`s.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Provider reported "not loaded".
    ProviderLoading,
    /// Provider reported "loaded, signed out".
    ProviderSignedOut,
    /// A bootstrap call was admitted for a signed-in provider state.
    BootstrapStarted,
    /// Bootstrap (initial or refresh) completed with claims and a token.
    BootstrapSucceeded {
        identity: Identity,
        claims: Claims,
        token: String,
        at: DateTime<Utc>,
    },
    /// Bootstrap failed; the pending sign-in is retained for a retry path.
    BootstrapFailed,
    /// Scheduled renewal fetched a fresh token; claims untouched.
    TokenRenewed { token: String },
    /// An interaction signal arrived from the host.
    ActivityObserved { at: DateTime<Utc> },
    /// The inactivity timer elapsed with no intervening signal.
    IdleElapsed,
    /// Explicit lock request from the control surface.
    LockRequested,
    /// Sign-out finished (explicit call or forced by the HTTP adapter).
    SignOutCompleted,
}

/// Reset every per-session field while preserving the monotonic claims
/// version for the lifetime of this kernel instance.
fn cleared(snapshot: &Snapshot, phase: Phase) -> Snapshot {
    Snapshot {
        phase,
        claims_version: snapshot.claims_version,
        ..Snapshot::initial()
    }
}

pub fn reduce(snapshot: &Snapshot, event: &SessionEvent) -> Snapshot {
    let next = match event {
        SessionEvent::ProviderLoading => cleared(snapshot, Phase::Loading),
        SessionEvent::ProviderSignedOut | SessionEvent::SignOutCompleted => {
            cleared(snapshot, Phase::SignedOut)
        }
        SessionEvent::BootstrapStarted => match snapshot.phase {
            // A sign-in observed from signed_out re-enters loading while the
            // claims exchange is in flight.
            Phase::Loading | Phase::SignedOut => cleared(snapshot, Phase::Loading),
            Phase::Authenticated | Phase::Locked => snapshot.clone(),
        },
        SessionEvent::BootstrapSucceeded { identity, claims, token, at } => Snapshot {
            phase: Phase::Authenticated,
            user_id: identity.user_id.clone(),
            email: identity.email.clone(),
            tenant_id: Some(claims.tenant_id.clone()),
            roles: claims.roles.clone(),
            business_id: Some(claims.business_id.clone()),
            business_name: Some(claims.business_name.clone()),
            claims_version: snapshot.claims_version + 1,
            token: Some(token.clone()),
            last_activity_at: Some(*at),
        },
        // Failure keeps the pending sign-in visible: stay in loading so the
        // UI can offer retry without losing it.
        SessionEvent::BootstrapFailed => snapshot.clone(),
        SessionEvent::TokenRenewed { token } => match snapshot.phase {
            Phase::Authenticated => Snapshot { token: Some(token.clone()), ..snapshot.clone() },
            // Renewal raced a phase change; a token must not surface outside
            // the authenticated phase.
            _ => snapshot.clone(),
        },
        SessionEvent::ActivityObserved { at } => match snapshot.phase {
            Phase::Authenticated => Snapshot { last_activity_at: Some(*at), ..snapshot.clone() },
            _ => snapshot.clone(),
        },
        SessionEvent::IdleElapsed | SessionEvent::LockRequested => match snapshot.phase {
            Phase::Authenticated => Snapshot {
                last_activity_at: snapshot.last_activity_at,
                ..cleared(snapshot, Phase::Locked)
            },
            _ => snapshot.clone(),
        },
    };
    debug_assert!(
        next.invariant_violations().is_empty(),
        "reducer broke snapshot invariants: {:?} on {:?}",
        next.invariant_violations(),
        event
    );
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            tenant_id: "biz_1".into(),
            roles: vec!["owner".into()],
            business_id: "biz_1".into(),
            business_name: "Acme Plumbing".into(),
        }
    }

    fn identity() -> Identity {
        Identity { user_id: Some("user_1".into()), email: Some("owner@acme.test".into()) }
    }

    fn bootstrap_ok() -> SessionEvent {
        SessionEvent::BootstrapSucceeded {
            identity: identity(),
            claims: claims(),
            token: "tok.a.b".into(),
            at: Utc::now(),
        }
    }

    fn all_events() -> Vec<SessionEvent> {
        vec![
            SessionEvent::ProviderLoading,
            SessionEvent::ProviderSignedOut,
            SessionEvent::BootstrapStarted,
            bootstrap_ok(),
            SessionEvent::BootstrapFailed,
            SessionEvent::TokenRenewed { token: "tok.c.d".into() },
            SessionEvent::ActivityObserved { at: Utc::now() },
            SessionEvent::IdleElapsed,
            SessionEvent::LockRequested,
            SessionEvent::SignOutCompleted,
        ]
    }

    #[test]
    fn every_event_is_total_and_keeps_invariants() {
        // Walk every event from every reachable phase; the reducer must
        // produce a valid snapshot each time.
        let authed = reduce(&Snapshot::initial(), &bootstrap_ok());
        let locked = reduce(&authed, &SessionEvent::LockRequested);
        let signed_out = reduce(&authed, &SessionEvent::SignOutCompleted);
        let seeds = vec![Snapshot::initial(), authed, locked, signed_out];
        for seed in &seeds {
            for ev in all_events() {
                let next = reduce(seed, &ev);
                assert!(
                    next.invariant_violations().is_empty(),
                    "violations {:?} from phase {:?} on {:?}",
                    next.invariant_violations(),
                    seed.phase,
                    ev
                );
            }
        }
    }

    #[test]
    fn bootstrap_success_authenticates_and_bumps_version() {
        let s0 = Snapshot::initial();
        let s1 = reduce(&s0, &bootstrap_ok());
        assert_eq!(s1.phase, Phase::Authenticated);
        assert_eq!(s1.claims_version, 1);
        assert_eq!(s1.tenant_id.as_deref(), Some("biz_1"));
        assert_eq!(s1.roles, vec!["owner".to_string()]);
        assert!(s1.token.is_some());
    }

    #[test]
    fn bootstrap_failure_retains_loading() {
        let s0 = Snapshot::initial();
        let s1 = reduce(&s0, &SessionEvent::BootstrapFailed);
        assert_eq!(s1.phase, Phase::Loading);
        assert_eq!(s1.claims_version, 0);
    }

    #[test]
    fn renewal_swaps_token_only() {
        let s1 = reduce(&Snapshot::initial(), &bootstrap_ok());
        let s2 = reduce(&s1, &SessionEvent::TokenRenewed { token: "tok.new".into() });
        assert_eq!(s2.token.as_deref(), Some("tok.new"));
        assert_eq!(s2.claims_version, s1.claims_version);
        assert_eq!(s2.tenant_id, s1.tenant_id);
    }

    #[test]
    fn renewal_outside_authenticated_is_dropped() {
        let s = reduce(&Snapshot::initial(), &SessionEvent::TokenRenewed { token: "tok".into() });
        assert!(s.token.is_none());
        assert_eq!(s.phase, Phase::Loading);
    }

    #[test]
    fn lock_drops_token_and_claims_but_keeps_version() {
        let s1 = reduce(&Snapshot::initial(), &bootstrap_ok());
        let s2 = reduce(&s1, &SessionEvent::LockRequested);
        assert_eq!(s2.phase, Phase::Locked);
        assert!(s2.token.is_none());
        assert!(s2.roles.is_empty());
        assert_eq!(s2.claims_version, 1);
        // Re-auth from locked bumps the version again
        let s3 = reduce(&s2, &bootstrap_ok());
        assert_eq!(s3.phase, Phase::Authenticated);
        assert_eq!(s3.claims_version, 2);
    }

    #[test]
    fn claims_version_never_decreases() {
        let mut s = Snapshot::initial();
        let mut last = s.claims_version;
        let script = vec![
            bootstrap_ok(),
            SessionEvent::LockRequested,
            bootstrap_ok(),
            SessionEvent::SignOutCompleted,
            SessionEvent::BootstrapStarted,
            bootstrap_ok(),
            SessionEvent::ProviderLoading,
            SessionEvent::ProviderSignedOut,
        ];
        for ev in script {
            s = reduce(&s, &ev);
            assert!(s.claims_version >= last, "version went backwards on {:?}", ev);
            last = s.claims_version;
        }
        assert_eq!(s.claims_version, 3);
    }

    #[test]
    fn signout_resets_fields_but_not_version() {
        let s1 = reduce(&Snapshot::initial(), &bootstrap_ok());
        let s2 = reduce(&s1, &SessionEvent::SignOutCompleted);
        assert_eq!(s2.phase, Phase::SignedOut);
        assert!(s2.user_id.is_none() && s2.token.is_none() && s2.roles.is_empty());
        assert_eq!(s2.claims_version, 1);
    }

    #[test]
    fn activity_updates_timestamp_only_while_authenticated() {
        let at = Utc::now();
        let s0 = Snapshot::initial();
        let s1 = reduce(&s0, &SessionEvent::ActivityObserved { at });
        assert!(s1.last_activity_at.is_none());
        let s2 = reduce(&reduce(&s0, &bootstrap_ok()), &SessionEvent::ActivityObserved { at });
        assert_eq!(s2.last_activity_at, Some(at));
    }
}
