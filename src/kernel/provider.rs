//! Identity provider port.
//! The provider's sign-in UI and its change-subscription mechanics live
//! outside this crate; the host observes the provider however it likes and
//! pushes `ProviderState` values into the kernel as they change. The kernel
//! only ever calls back for tokens and sign-out.

use anyhow::Result;
use async_trait::async_trait;

/// Point-in-time view of the provider, as pushed by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderState {
    pub is_loaded: bool,
    pub is_signed_in: bool,
    pub user_id: Option<String>,
    pub email: Option<String>,
}

impl ProviderState {
    pub fn not_loaded() -> Self {
        Self::default()
    }

    pub fn signed_out() -> Self {
        Self { is_loaded: true, ..Self::default() }
    }

    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            is_loaded: true,
            is_signed_in: true,
            user_id: Some(user_id.into()),
            email: None,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch a bearer token, optionally against a named token template.
    /// `Ok(None)` means the provider has no token to give (e.g. the session
    /// evaporated server-side); `Err` is a transport/provider fault.
    async fn get_token(&self, profile: Option<&str>) -> Result<Option<String>>;

    /// Terminate the provider-side session.
    async fn sign_out(&self) -> Result<()>;
}
