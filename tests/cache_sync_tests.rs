//! Cache synchronizer end-to-end: a recording cache attached to a live
//! kernel, checking which invalidation actions each transition drives.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use serde_json::json;

use sessium::cache::{CacheSynchronizer, QueryCache};
use sessium::config::KernelConfig;
use sessium::kernel::provider::{IdentityProvider, ProviderState};
use sessium::kernel::snapshot::Phase;
use sessium::kernel::SessionKernel;
use sessium::marker::MemoryMarkerStore;

fn jwt(offset_secs: i64) -> String {
    let header = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(b"{\"alg\":\"none\"}");
    let exp = chrono::Utc::now().timestamp() + offset_secs;
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(json!({ "exp": exp, "sub": "user_1" }).to_string());
    format!("{}.{}.x", header, payload)
}

struct QueueProvider {
    tokens: parking_lot::Mutex<VecDeque<String>>,
}

#[async_trait]
impl IdentityProvider for QueueProvider {
    async fn get_token(&self, _profile: Option<&str>) -> Result<Option<String>> {
        let mut q = self.tokens.lock();
        if q.len() > 1 {
            Ok(q.pop_front())
        } else {
            Ok(q.front().cloned())
        }
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}

struct RecordingCache {
    actions: parking_lot::Mutex<Vec<&'static str>>,
}

#[async_trait]
impl QueryCache for RecordingCache {
    async fn clear_all(&self) {
        self.actions.lock().push("clear_all");
    }

    async fn refetch_active(&self) {
        self.actions.lock().push("refetch_active");
    }

    async fn invalidate_all(&self) {
        self.actions.lock().push("invalidate_all");
    }
}

async fn bootstrap_handler(State(calls): State<Arc<AtomicUsize>>) -> (StatusCode, Json<serde_json::Value>) {
    calls.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::OK,
        Json(json!({ "business": { "id": "biz_1", "role": "owner", "name": "Acme Plumbing" } })),
    )
}

async fn serve_bootstrap() -> String {
    let app = Router::new()
        .route("/bootstrap", post(bootstrap_handler))
        .with_state(Arc::new(AtomicUsize::new(0)));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/bootstrap", addr)
}

async fn settle() {
    // Let the synchronizer task drain its watch notifications
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn cache_actions_across_a_session_lifecycle() {
    let url = serve_bootstrap().await;
    let provider = Arc::new(QueueProvider { tokens: parking_lot::Mutex::new(vec![jwt(3600)].into()) });
    let kernel = SessionKernel::new(
        KernelConfig::new(url),
        provider,
        Arc::new(MemoryMarkerStore::new()),
    )
    .unwrap();
    let cache = Arc::new(RecordingCache { actions: parking_lot::Mutex::new(Vec::new()) });
    let reactor = CacheSynchronizer::attach(&kernel, cache.clone());

    // Initial bootstrap: refetch active queries, never a full invalidation
    kernel.handle_provider_state(ProviderState::signed_in("user_1")).await;
    assert_eq!(kernel.snapshot().phase, Phase::Authenticated);
    settle().await;
    assert_eq!(*cache.actions.lock(), vec!["refetch_active"]);

    // Locking alone does not disturb the cache
    kernel.lock_auth();
    settle().await;
    assert_eq!(*cache.actions.lock(), vec!["refetch_active"]);

    // Re-auth with a claims bump: invalidation supersedes the refetch rule
    kernel.refresh_auth().await.unwrap();
    assert_eq!(kernel.snapshot().claims_version, 2);
    settle().await;
    assert_eq!(*cache.actions.lock(), vec!["refetch_active", "invalidate_all"]);

    // Sign-out clears everything
    kernel.sign_out().await.unwrap();
    settle().await;
    assert_eq!(
        *cache.actions.lock(),
        vec!["refetch_active", "invalidate_all", "clear_all"]
    );

    reactor.abort();
    kernel.shutdown();
}

#[tokio::test]
async fn token_renewal_leaves_the_cache_alone() {
    let url = serve_bootstrap().await;
    let provider = Arc::new(QueueProvider {
        tokens: parking_lot::Mutex::new(vec![jwt(3600), jwt(7200)].into()),
    });
    let kernel = SessionKernel::new(
        KernelConfig::new(url),
        provider,
        Arc::new(MemoryMarkerStore::new()),
    )
    .unwrap();
    let cache = Arc::new(RecordingCache { actions: parking_lot::Mutex::new(Vec::new()) });
    let reactor = CacheSynchronizer::attach(&kernel, cache.clone());

    kernel.handle_provider_state(ProviderState::signed_in("user_1")).await;
    settle().await;
    assert_eq!(*cache.actions.lock(), vec!["refetch_active"]);

    // A token-only snapshot change is invisible to the cache layer
    kernel.record_activity(sessium::kernel::idle::IdleSignal::PointerDown);
    settle().await;
    assert_eq!(*cache.actions.lock(), vec!["refetch_active"]);

    reactor.abort();
    kernel.shutdown();
}
