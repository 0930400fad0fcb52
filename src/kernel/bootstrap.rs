//! Bootstrap resolver: one bearer-auth POST that exchanges a valid access
//! token for tenant/role claims. Stateless; safe to call repeatedly, each
//! invocation is an independent exchange.

use serde::Deserialize;

use super::snapshot::Claims;
use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone, Deserialize)]
struct BootstrapResponse {
    business: BusinessDto,
}

#[derive(Debug, Clone, Deserialize)]
struct BusinessDto {
    id: String,
    role: String,
    name: String,
}

#[derive(Clone)]
pub struct BootstrapResolver {
    client: reqwest::Client,
    url: String,
}

impl BootstrapResolver {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into() }
    }

    /// Exchange `token` for claims. Any non-2xx status is a bootstrap
    /// failure; the body is ignored on failure beyond logging.
    pub async fn fetch(&self, token: &str) -> AuthResult<Claims> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AuthError::bootstrap("bootstrap_fail".into(), format!("bootstrap request failed: {}", e)))?;
        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(target: "sessium::bootstrap", status = status.as_u16(), "bootstrap rejected");
            return Err(AuthError::bootstrap(
                "bootstrap_fail".into(),
                format!("bootstrap returned HTTP {}", status.as_u16()),
            ));
        }
        let body: BootstrapResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::bootstrap("bootstrap_fail".into(), format!("bootstrap body decode failed: {}", e)))?;
        Ok(claims_from(body))
    }
}

/// The business is the tenancy scope for this backend, so its id doubles as
/// the tenant id. The role arrives as a single tag.
fn claims_from(body: BootstrapResponse) -> Claims {
    Claims {
        tenant_id: body.business.id.clone(),
        roles: vec![body.business.role],
        business_id: body.business.id,
        business_name: body.business.name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claims_mapping_from_wire_shape() {
        let body: BootstrapResponse = serde_json::from_value(serde_json::json!({
            "business": { "id": "biz_42", "role": "admin", "name": "Acme" }
        }))
        .unwrap();
        let c = claims_from(body);
        assert_eq!(c.tenant_id, "biz_42");
        assert_eq!(c.business_id, "biz_42");
        assert_eq!(c.roles, vec!["admin".to_string()]);
        assert_eq!(c.business_name, "Acme");
    }

    #[test]
    fn wire_shape_rejects_missing_business() {
        let r: Result<BootstrapResponse, _> = serde_json::from_value(serde_json::json!({ "ok": true }));
        assert!(r.is_err());
    }
}
