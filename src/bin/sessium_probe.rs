//!
//! sessium_probe
//! -------------
//! A utility that drives one sign-in/bootstrap cycle of the session kernel
//! against a real bootstrap endpoint, using a statically supplied bearer
//! token in place of a live identity provider. Useful for smoke-testing a
//! deployed backend and for inspecting the resulting snapshot quickly.
//!
//! Example:
//!   cargo run --bin sessium_probe -- --bootstrap-url http://localhost:7878/api/bootstrap --token "$TOKEN" --sign-out
//!

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use sessium::config::KernelConfig;
use sessium::kernel::provider::{IdentityProvider, ProviderState};
use sessium::kernel::SessionKernel;
use sessium::marker::FileMarkerStore;

fn arg_val(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i + 1 < args.len() {
        if args[i] == flag { return Some(args[i + 1].clone()); }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn print_usage() {
    println!(
        "sessium_probe\n\nUSAGE:\n  sessium_probe [--bootstrap-url URL] [--token TOK] [--user-id ID] [--marker-dir PATH] [--sign-out]\n\nOPTIONS:\n  --bootstrap-url URL       Claims bootstrap endpoint (default: $SESSIUM_BOOTSTRAP_URL)\n  --token TOK               Bearer token to present (default: $SESSIUM_PROBE_TOKEN)\n  --user-id ID              User id to report as signed in (default: probe)\n  --marker-dir PATH         Directory for the session marker store (default: .sessium)\n  --sign-out                Sign out again after the bootstrap cycle\n"
    );
}

/// Provider stand-in that hands out one fixed token.
struct StaticTokenProvider {
    token: String,
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn get_token(&self, _profile: Option<&str>) -> Result<Option<String>> {
        Ok(Some(self.token.clone()))
    }

    async fn sign_out(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber (honor RUST_LOG if set)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        print_usage();
        return Ok(());
    }

    let bootstrap_url = arg_val(&args, "--bootstrap-url")
        .or_else(|| std::env::var("SESSIUM_BOOTSTRAP_URL").ok())
        .ok_or_else(|| anyhow!("no bootstrap url; pass --bootstrap-url or set SESSIUM_BOOTSTRAP_URL"))?;
    let token = arg_val(&args, "--token")
        .or_else(|| std::env::var("SESSIUM_PROBE_TOKEN").ok())
        .ok_or_else(|| anyhow!("no token; pass --token or set SESSIUM_PROBE_TOKEN"))?;
    let user_id = arg_val(&args, "--user-id").unwrap_or_else(|| "probe".to_string());
    let marker_dir = arg_val(&args, "--marker-dir").unwrap_or_else(|| ".sessium".to_string());
    let do_sign_out = has_flag(&args, "--sign-out");

    println!("Probing bootstrap endpoint {} as '{}'...", bootstrap_url, user_id);

    let cfg = KernelConfig::from_env(bootstrap_url);
    let provider = Arc::new(StaticTokenProvider { token });
    let markers = Arc::new(FileMarkerStore::new(&marker_dir)?);
    let kernel = SessionKernel::new(cfg, provider, markers)?;

    let mut events = kernel.subscribe();
    kernel.handle_provider_state(ProviderState::signed_in(user_id)).await;

    // Drain whatever the cycle produced before reporting
    while let Ok(ev) = events.try_recv() {
        println!("event: {}", ev.name());
    }

    let snap = kernel.snapshot();
    println!("phase: {:?}", snap.phase);
    println!("claims_version: {}", snap.claims_version);
    if let Some(tid) = &snap.tenant_id {
        println!("tenant: {} ({:?}) roles={:?}", tid, snap.business_name, snap.roles);
    }
    println!("session evidence: {}", kernel.has_session_evidence());

    if do_sign_out {
        kernel.sign_out().await?;
        println!("signed out; phase now {:?}", kernel.snapshot().phase);
    }
    kernel.shutdown();
    Ok(())
}
