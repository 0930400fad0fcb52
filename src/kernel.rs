//!
//! sessium session kernel
//! ----------------------
//! The single authority over client session state. It reconciles pushed
//! identity-provider state with backend tenant claims, keeps the bearer
//! token renewed ahead of expiry, locks the session after inactivity and
//! fans transitions out to decoupled consumers.
//!
//! Responsibilities:
//! - Exclusive ownership of the Session Snapshot; all mutation goes through
//!   the pure reducer inside a synchronous locked section.
//! - One-shot claims bootstrap per sign-in cycle, guarded against
//!   concurrent provider notifications.
//! - Token renewal scheduling (cancel-before-rearm, at most one pending).
//! - Idle lock after the configured inactivity threshold.
//! - Event channel + watch-based snapshot observer for consumers.
//! - Session-evidence marker upkeep for route guards.
//!

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

pub mod bootstrap;
pub mod idle;
pub mod provider;
pub mod reducer;
pub mod scheduler;
pub mod snapshot;

use crate::config::KernelConfig;
use crate::error::{AuthError, AuthResult};
use crate::events::{codes, AuthEvent, EventChannel};
use crate::marker::{self, MarkerStore};
use bootstrap::BootstrapResolver;
use idle::{IdleMonitor, IdleSignal};
use provider::{IdentityProvider, ProviderState};
use reducer::{reduce, SessionEvent};
use scheduler::TimerHandle;
use snapshot::{Claims, Identity, Phase, Snapshot};

/// Mutable kernel state behind one lock. The lock is held only across
/// synchronous reducer sections, never across an await.
struct KernelState {
    snapshot: Snapshot,
    /// Last provider state pushed by the host; identity source for refresh.
    provider_state: ProviderState,
    /// One-shot bootstrap guard for the current sign-in cycle. Set inside
    /// the same locked section that admits the bootstrap, cleared on failure
    /// and on sign-out.
    bootstrap_ran: bool,
    renew_timer: TimerHandle,
    idle: IdleMonitor,
}

struct Inner {
    cfg: KernelConfig,
    provider: Arc<dyn IdentityProvider>,
    resolver: BootstrapResolver,
    markers: Arc<dyn MarkerStore>,
    events: EventChannel,
    state: Mutex<KernelState>,
    watch_tx: watch::Sender<Snapshot>,
}

/// Cheap handle to one kernel instance; clones share state.
#[derive(Clone)]
pub struct SessionKernel {
    inner: Arc<Inner>,
}

impl SessionKernel {
    pub fn new(
        cfg: KernelConfig,
        provider: Arc<dyn IdentityProvider>,
        markers: Arc<dyn MarkerStore>,
    ) -> AuthResult<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| AuthError::internal("http_client_init".to_string(), e.to_string()))?;
        Ok(Self::with_client(cfg, provider, markers, client))
    }

    /// Build with a caller-supplied reqwest client (shared pools, test
    /// configuration).
    pub fn with_client(
        cfg: KernelConfig,
        provider: Arc<dyn IdentityProvider>,
        markers: Arc<dyn MarkerStore>,
        client: reqwest::Client,
    ) -> Self {
        let resolver = BootstrapResolver::new(client, cfg.bootstrap_url.clone());
        let events = EventChannel::new(cfg.event_capacity);
        let snapshot = Snapshot::initial();
        let (watch_tx, _) = watch::channel(snapshot.clone());
        let state = KernelState {
            snapshot,
            provider_state: ProviderState::not_loaded(),
            bootstrap_ran: false,
            renew_timer: TimerHandle::new(),
            idle: IdleMonitor::new(cfg.idle_threshold),
        };
        Self {
            inner: Arc::new(Inner {
                cfg,
                provider,
                resolver,
                markers,
                events,
                state: Mutex::new(state),
                watch_tx,
            }),
        }
    }

    // ---- read surface -------------------------------------------------

    pub fn snapshot(&self) -> Snapshot {
        self.inner.state.lock().snapshot.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshot observer for reactors; the receiver always carries the
    /// latest value.
    pub fn watch_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.inner.watch_tx.subscribe()
    }

    pub fn events(&self) -> &EventChannel {
        &self.inner.events
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.cfg
    }

    /// Advisory sign-in evidence for route guards deciding between a
    /// loading indicator and an immediate redirect.
    pub fn has_session_evidence(&self) -> bool {
        marker::has_session_evidence(self.inner.markers.as_ref())
    }

    // ---- provider reconciliation --------------------------------------

    /// Feed an observed provider state change into the kernel. The host
    /// owns the subscription mechanics; this is the only entry point.
    pub async fn handle_provider_state(&self, state: ProviderState) {
        if !state.is_loaded {
            self.cancel_timers();
            {
                let mut st = self.inner.state.lock();
                st.provider_state = state;
                // A provider reload starts a new sign-in cycle; the next
                // signed-in report must be allowed to bootstrap again.
                st.bootstrap_ran = false;
            }
            self.apply(&SessionEvent::ProviderLoading);
            debug!(target: "sessium::kernel", "provider not loaded; back to loading");
            return;
        }
        if !state.is_signed_in {
            self.cancel_timers();
            {
                let mut st = self.inner.state.lock();
                st.provider_state = state;
                st.bootstrap_ran = false;
            }
            self.apply(&SessionEvent::ProviderSignedOut);
            if let Err(e) = marker::clear_marker(self.inner.markers.as_ref()) {
                warn!(target: "sessium::kernel", "failed to clear session marker: {}", e);
            }
            debug!(target: "sessium::kernel", "provider signed out");
            return;
        }

        // Signed in. Admit at most one bootstrap per sign-in cycle; the
        // check-and-set happens inside this single locked section so
        // concurrent notifications cannot double-fire.
        let admitted = {
            let mut st = self.inner.state.lock();
            st.provider_state = state.clone();
            let eligible = matches!(st.snapshot.phase, Phase::Loading | Phase::SignedOut);
            if eligible && !st.bootstrap_ran {
                st.bootstrap_ran = true;
                let next = reduce(&st.snapshot, &SessionEvent::BootstrapStarted);
                st.snapshot = next.clone();
                self.inner.watch_tx.send_replace(next);
                true
            } else {
                false
            }
        };
        if !admitted {
            debug!(target: "sessium::kernel", "sign-in notification ignored (bootstrap already ran or phase active)");
            return;
        }
        let identity = Identity { user_id: state.user_id, email: state.email };
        self.run_bootstrap(identity).await;
    }

    async fn run_bootstrap(&self, identity: Identity) {
        match self.fetch_claims().await {
            Ok((claims, token)) => {
                self.install_session(identity, claims, &token);
                let version = self.snapshot().claims_version;
                info!(target: "sessium::kernel", claims_version = version, "bootstrap ok");
                self.inner.events.publish(AuthEvent::BootstrapOk { claims_version: version });
            }
            Err(err) => {
                // Clear the guard so a retry (explicit or via a later
                // provider notification) can run bootstrap again.
                {
                    let mut st = self.inner.state.lock();
                    st.bootstrap_ran = false;
                }
                self.apply(&SessionEvent::BootstrapFailed);
                warn!(target: "sessium::kernel", "bootstrap failed: {}", err);
                self.inner.events.publish(AuthEvent::BootstrapFail { error: err.clone() });
                self.inner.events.publish(AuthEvent::Error {
                    code: codes::BOOTSTRAP_FAIL.into(),
                    error: err,
                });
            }
        }
    }

    /// Token from the provider, then claims from the backend.
    async fn fetch_claims(&self) -> AuthResult<(Claims, String)> {
        let profile = self.inner.cfg.token_profile.clone();
        let token = self
            .inner
            .provider
            .get_token(profile.as_deref())
            .await
            .map_err(|e| AuthError::provider("token_fetch_failed".to_string(), e.to_string()))?
            .ok_or_else(|| {
                AuthError::provider("token_missing".to_string(), "provider returned no token".to_string())
            })?;
        let claims = self.inner.resolver.fetch(&token).await?;
        Ok((claims, token))
    }

    /// Apply a successful claims exchange: snapshot, marker, both timers.
    fn install_session(&self, identity: Identity, claims: Claims, token: &str) {
        let (_prev, next) = self.apply(&SessionEvent::BootstrapSucceeded {
            identity,
            claims,
            token: token.to_string(),
            at: Utc::now(),
        });
        if let Err(e) = marker::write_marker(self.inner.markers.as_ref(), next.user_id.as_deref()) {
            warn!(target: "sessium::kernel", "failed to write session marker: {}", e);
        }
        self.arm_renewal(token);
        self.arm_idle();
    }

    // ---- control surface ----------------------------------------------

    /// Re-run the claims exchange and install a fresh token. Valid while
    /// authenticated or locked, and from loading as the bootstrap retry
    /// path when the provider is signed in. The `Result` is the structured
    /// success/failure report the HTTP adapter's retry protocol consumes.
    pub async fn refresh_auth(&self) -> AuthResult<()> {
        // Admission and the retry-path guard happen in one locked section so
        // a concurrent provider notification cannot start a second bootstrap.
        let mut retry_from_loading = false;
        let provider_state = {
            let mut st = self.inner.state.lock();
            match st.snapshot.phase {
                Phase::SignedOut => {
                    return Err(AuthError::unauthorized(
                        "signed_out".to_string(),
                        "cannot refresh a signed-out session".to_string(),
                    ))
                }
                Phase::Loading => {
                    if !st.provider_state.is_signed_in {
                        return Err(AuthError::unauthorized(
                            "not_signed_in".to_string(),
                            "provider reports no signed-in user".to_string(),
                        ));
                    }
                    if st.bootstrap_ran {
                        return Err(AuthError::internal(
                            "bootstrap_inflight".to_string(),
                            "a bootstrap attempt is already running".to_string(),
                        ));
                    }
                    st.bootstrap_ran = true;
                    retry_from_loading = true;
                }
                Phase::Authenticated | Phase::Locked => {}
            }
            st.provider_state.clone()
        };
        match self.fetch_claims().await {
            Ok((claims, token)) => {
                let identity = Identity {
                    user_id: provider_state.user_id,
                    email: provider_state.email,
                };
                self.install_session(identity, claims, &token);
                {
                    let mut st = self.inner.state.lock();
                    st.bootstrap_ran = true;
                }
                self.inner.events.publish(AuthEvent::TokenRefreshed);
                Ok(())
            }
            Err(err) => {
                if retry_from_loading {
                    let mut st = self.inner.state.lock();
                    st.bootstrap_ran = false;
                }
                warn!(target: "sessium::kernel", "refresh failed: {}", err);
                self.inner.events.publish(AuthEvent::Error {
                    code: codes::TOKEN_REFRESH_FAILED.into(),
                    error: err.clone(),
                });
                Err(err)
            }
        }
    }

    /// Lock the session immediately. No-op outside the authenticated phase.
    pub fn lock_auth(&self) {
        self.lock_with(SessionEvent::LockRequested);
    }

    fn lock_with(&self, ev: SessionEvent) {
        let (prev, next) = self.apply(&ev);
        if prev.phase == Phase::Authenticated && next.phase == Phase::Locked {
            self.cancel_timers();
            info!(target: "sessium::kernel", "session locked");
            self.inner.events.publish(AuthEvent::IdleLocked);
        }
    }

    /// Sign out everywhere: provider session, snapshot, marker, timers.
    /// Rejects only if the provider's own sign-out call fails; local state
    /// is reset regardless.
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.cancel_timers();
        {
            let mut st = self.inner.state.lock();
            st.bootstrap_ran = false;
        }
        let provider_result = self.inner.provider.sign_out().await;
        self.apply(&SessionEvent::SignOutCompleted);
        if let Err(e) = marker::clear_marker(self.inner.markers.as_ref()) {
            warn!(target: "sessium::kernel", "failed to clear session marker: {}", e);
        }
        info!(target: "sessium::kernel", "signed out");
        self.inner.events.publish(AuthEvent::SignedOut);
        provider_result
            .map_err(|e| AuthError::provider("provider_sign_out_failed".to_string(), e.to_string()))
    }

    /// Host-reported interaction signal. While authenticated this updates
    /// `last_activity_at` and re-arms the inactivity timer; otherwise the
    /// signal is ignored (the monitor is detached outside that phase).
    pub fn record_activity(&self, signal: IdleSignal) {
        let authenticated = self.inner.state.lock().snapshot.is_authenticated();
        if !authenticated {
            return;
        }
        self.apply(&SessionEvent::ActivityObserved { at: Utc::now() });
        self.arm_idle();
        debug!(target: "sessium::kernel", signal = signal.name(), "activity");
    }

    /// Cancel all pending timers; call on host teardown.
    pub fn shutdown(&self) {
        self.cancel_timers();
    }

    // ---- timers --------------------------------------------------------

    fn arm_renewal(&self, token: &str) {
        match scheduler::token_expiry(token) {
            Ok(expiry) => {
                let delay = scheduler::renewal_delay(expiry, Utc::now(), self.inner.cfg.renew_lead);
                debug!(target: "sessium::kernel", delay_secs = delay.as_secs(), "renewal armed");
                let weak = Arc::downgrade(&self.inner);
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(inner) = weak.upgrade() {
                        SessionKernel { inner }.on_renew_due().await;
                    }
                });
                self.inner.state.lock().renew_timer.rearm(task);
            }
            Err(e) => {
                // Renewal lapses; the HTTP adapter's 401 path is the
                // designated recovery. Surface a warning, never throw.
                warn!(target: "sessium::kernel", "token expiry undecodable, renewal not armed: {}", e);
                self.inner.events.publish(AuthEvent::Error {
                    code: codes::TOKEN_DECODE_FAILED.into(),
                    error: AuthError::token_refresh(codes::TOKEN_DECODE_FAILED.to_string(), e.to_string()),
                });
            }
        }
    }

    async fn on_renew_due(&self) {
        if !self.inner.state.lock().snapshot.is_authenticated() {
            return;
        }
        let profile = self.inner.cfg.token_profile.clone();
        match self.inner.provider.get_token(profile.as_deref()).await {
            Ok(Some(token)) => {
                let (_prev, next) = self.apply(&SessionEvent::TokenRenewed { token: token.clone() });
                if next.is_authenticated() {
                    debug!(target: "sessium::kernel", "token renewed on schedule");
                    self.inner.events.publish(AuthEvent::TokenRefreshed);
                    self.arm_renewal(&token);
                }
            }
            Ok(None) => self.publish_renewal_failure("provider returned no token"),
            Err(e) => self.publish_renewal_failure(&e.to_string()),
        }
    }

    /// Prior token stays in place: stale but valid until natural expiry.
    fn publish_renewal_failure(&self, message: &str) {
        warn!(target: "sessium::kernel", "scheduled renewal failed: {}", message);
        self.inner.events.publish(AuthEvent::Error {
            code: codes::TOKEN_REFRESH_FAILED.into(),
            error: AuthError::token_refresh(codes::TOKEN_REFRESH_FAILED.to_string(), message.to_string()),
        });
    }

    fn arm_idle(&self) {
        let threshold = self.inner.cfg.idle_threshold;
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(threshold).await;
            if let Some(inner) = weak.upgrade() {
                SessionKernel { inner }.lock_with(SessionEvent::IdleElapsed);
            }
        });
        self.inner.state.lock().idle.rearm(task);
    }

    fn cancel_timers(&self) {
        let mut st = self.inner.state.lock();
        st.renew_timer.cancel();
        st.idle.detach();
    }

    // ---- reducer plumbing ----------------------------------------------

    /// Run one reducer step under the state lock and publish the result to
    /// the snapshot watchers. The watch send happens inside the locked
    /// section so observers can never see updates out of order. Returns
    /// (previous, next).
    fn apply(&self, ev: &SessionEvent) -> (Snapshot, Snapshot) {
        let mut st = self.inner.state.lock();
        let prev = st.snapshot.clone();
        let next = reduce(&prev, ev);
        st.snapshot = next.clone();
        self.inner.watch_tx.send_replace(next.clone());
        drop(st);
        (prev, next)
    }
}
