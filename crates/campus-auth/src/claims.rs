//! Token claim set issued by the identity provider.

use campus_core::{Identity, IdentityError, Role};
use serde::{Deserialize, Serialize};

/// Claims carried in a hub access token.
///
/// `role` stays a string here so an unknown role surfaces as an
/// [`IdentityError`] instead of a generic decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user) id.
    pub sub: String,
    /// Role name, e.g. `"teacher"`.
    pub role: String,
    /// Tenant (school) id; absent for cross-tenant roles.
    #[serde(default, alias = "tenantId", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Issued-at, seconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl Claims {
    /// Claims for `identity` valid for `ttl_secs` from now.
    pub fn for_identity(identity: &Identity, ttl_secs: i64, issuer: Option<String>) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: identity.subject_id().to_owned(),
            role: identity.role().as_str().to_owned(),
            tenant_id: identity.tenant_id().map(ToOwned::to_owned),
            exp: now + ttl_secs,
            iat: Some(now),
            iss: issuer,
        }
    }

    /// Convert into a validated [`Identity`].
    pub fn into_identity(self) -> Result<Identity, IdentityError> {
        let role: Role = self.role.parse()?;
        Identity::new(self.sub, role, self.tenant_id)
    }
}
