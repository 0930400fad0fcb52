//!
//! Cache synchronizer
//! ------------------
//! Pure reactor between the session kernel and an external data-cache
//! layer. It watches snapshot changes and drives invalidation through a
//! small port trait; the decision rules are a pure function over
//! (previous, next) snapshots so they can be tested without any async
//! machinery.
//!

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::kernel::snapshot::{Phase, Snapshot};
use crate::kernel::SessionKernel;

/// Port to the external data-cache layer.
#[async_trait]
pub trait QueryCache: Send + Sync {
    /// Drop everything, including inactive entries.
    async fn clear_all(&self);
    /// Refetch queries with active observers; leave inactive entries alone.
    async fn refetch_active(&self);
    /// Mark the whole cache stale so every entry refetches on next use.
    async fn invalidate_all(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    ClearAll,
    RefetchActive,
    InvalidateAll,
}

/// Decision rules, evaluated on every snapshot change:
/// - entering `signed_out` clears the cache outright;
/// - entering `authenticated` refetches active queries (not a full clear,
///   which would storm the network for inactive views);
/// - `claims_version` advancing past its initial post-bootstrap value means
///   tenant/role claims changed, so row-level authorization may have
///   changed too: invalidate everything. Invalidation supersedes the
///   refetch rule when both fire on one transition.
pub fn plan(prev: &Snapshot, next: &Snapshot) -> Vec<CacheAction> {
    let mut actions = Vec::new();
    if next.phase == Phase::SignedOut && prev.phase != Phase::SignedOut {
        actions.push(CacheAction::ClearAll);
    }
    let claims_changed = next.claims_version > prev.claims_version && next.claims_version > 1;
    if claims_changed {
        actions.push(CacheAction::InvalidateAll);
    } else if next.phase == Phase::Authenticated && prev.phase != Phase::Authenticated {
        actions.push(CacheAction::RefetchActive);
    }
    actions
}

/// Watch-driven driver task. Holds only read views; communicates nothing
/// back to the kernel.
pub struct CacheSynchronizer;

impl CacheSynchronizer {
    pub fn attach(kernel: &SessionKernel, cache: Arc<dyn QueryCache>) -> JoinHandle<()> {
        let mut rx = kernel.watch_snapshot();
        tokio::spawn(async move {
            let mut prev = rx.borrow().clone();
            loop {
                if rx.changed().await.is_err() {
                    // Kernel dropped; nothing left to react to.
                    debug!(target: "sessium::cache", "kernel gone, synchronizer stopping");
                    break;
                }
                let next = rx.borrow_and_update().clone();
                for action in plan(&prev, &next) {
                    debug!(target: "sessium::cache", action = ?action, phase = ?next.phase, claims_version = next.claims_version, "cache action");
                    match action {
                        CacheAction::ClearAll => cache.clear_all().await,
                        CacheAction::RefetchActive => cache.refetch_active().await,
                        CacheAction::InvalidateAll => cache.invalidate_all().await,
                    }
                }
                prev = next;
            }
        })
    }
}
