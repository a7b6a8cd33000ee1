//! HS256 JWT verification.

use async_trait::async_trait;
use campus_core::Identity;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::debug;

use crate::IdentityVerifier;
use crate::claims::Claims;
use crate::errors::{RejectReason, VerificationError};

/// Verifies tokens signed with a shared HMAC secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier.
    ///
    /// `issuer`, when set, must match the token's `iss`. `leeway_secs` is the
    /// clock skew tolerated on `exp`.
    pub fn new(secret: &[u8], issuer: Option<&str>, leeway_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway_secs;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(iss) = issuer {
            validation.set_issuer(&[iss]);
        }
        Self {
            key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Decode and validate `raw`, returning its claims.
    pub fn decode_claims(&self, raw: &str) -> Result<Claims, VerificationError> {
        decode::<Claims>(raw, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| VerificationError::invalid(classify(e.kind())))
    }
}

#[async_trait]
impl IdentityVerifier for JwtVerifier {
    async fn verify_token(&self, raw: &str) -> Result<Identity, VerificationError> {
        let claims = self.decode_claims(raw)?;
        debug!(sub = %claims.sub, role = %claims.role, "token verified");
        Ok(claims.into_identity()?)
    }
}

fn classify(kind: &ErrorKind) -> RejectReason {
    match kind {
        ErrorKind::ExpiredSignature => RejectReason::Expired,
        ErrorKind::InvalidSignature => RejectReason::BadSignature,
        other => RejectReason::Malformed(format!("{other:?}")),
    }
}

/// Sign `claims` with `secret` (HS256).
///
/// The hub never issues tokens in production; this backs the `mint-token`
/// dev command and the test suites.
pub fn issue_token(secret: &[u8], claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use campus_core::Role;

    const SECRET: &[u8] = b"test-secret-test-secret-test-sec";

    fn teacher() -> Identity {
        Identity::new("t-1", Role::Teacher, Some("school-42".into())).unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_identity() {
        let token = issue_token(SECRET, &Claims::for_identity(&teacher(), 300, None)).unwrap();
        let v = JwtVerifier::new(SECRET, None, 0);
        assert_eq!(v.verify_token(&token).await.unwrap(), teacher());
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let claims = Claims::for_identity(&teacher(), -3600, None);
        let token = issue_token(SECRET, &claims).unwrap();
        let v = JwtVerifier::new(SECRET, None, 60);
        assert_matches!(
            v.verify_token(&token).await,
            Err(VerificationError::InvalidCredential { reason: RejectReason::Expired })
        );
    }

    #[tokio::test]
    async fn wrong_secret_rejected() {
        let token = issue_token(b"other-secret", &Claims::for_identity(&teacher(), 300, None))
            .unwrap();
        let v = JwtVerifier::new(SECRET, None, 0);
        assert_matches!(
            v.verify_token(&token).await,
            Err(VerificationError::InvalidCredential { reason: RejectReason::BadSignature })
        );
    }

    #[tokio::test]
    async fn garbage_rejected_as_malformed() {
        let v = JwtVerifier::new(SECRET, None, 0);
        assert_matches!(
            v.verify_token("not.a.jwt").await,
            Err(VerificationError::InvalidCredential { reason: RejectReason::Malformed(_) })
        );
    }

    #[tokio::test]
    async fn issuer_enforced_when_configured() {
        let v = JwtVerifier::new(SECRET, Some("campus-idp"), 0);
        let good = issue_token(
            SECRET,
            &Claims::for_identity(&teacher(), 300, Some("campus-idp".into())),
        )
        .unwrap();
        assert!(v.verify_token(&good).await.is_ok());

        let bad = issue_token(
            SECRET,
            &Claims::for_identity(&teacher(), 300, Some("someone-else".into())),
        )
        .unwrap();
        assert_matches!(
            v.verify_token(&bad).await,
            Err(VerificationError::InvalidCredential { reason: RejectReason::Malformed(_) })
        );
    }

    #[tokio::test]
    async fn bad_claims_rejected() {
        let claims = Claims {
            sub: "p-1".into(),
            role: "parent".into(),
            tenant_id: None,
            exp: chrono::Utc::now().timestamp() + 300,
            iat: None,
            iss: None,
        };
        let token = issue_token(SECRET, &claims).unwrap();
        let v = JwtVerifier::new(SECRET, None, 0);
        assert_matches!(
            v.verify_token(&token).await,
            Err(VerificationError::InvalidCredential { reason: RejectReason::Claims(_) })
        );
    }
}
