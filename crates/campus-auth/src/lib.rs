//! # campus-auth
//!
//! Handshake credential verification.
//!
//! - [`credential`]: pull a bearer token out of the handshake (query field or
//!   `Authorization` header)
//! - [`IdentityVerifier`]: the seam to the external token issuer
//! - [`JwtVerifier`]: HS256 JWT implementation of that seam
//! - [`verify`]: missing-credential handling + verification in one call
//!
//! Verification is pure: it never touches connection state, so it runs with
//! no registry or room lock held.

#![deny(unsafe_code)]

pub mod claims;
pub mod credential;
pub mod errors;
pub mod jwt;

use async_trait::async_trait;
use campus_core::Identity;

pub use claims::Claims;
pub use errors::{RejectReason, VerificationError};
pub use jwt::{JwtVerifier, issue_token};

/// Verifies a raw bearer token against the issuer's key material.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Validate `raw` and decode its claim set.
    async fn verify_token(&self, raw: &str) -> Result<Identity, VerificationError>;
}

/// Verify an optional credential.
///
/// Absent or blank credentials fail with
/// [`VerificationError::MissingCredential`] without consulting the issuer.
pub async fn verify(
    verifier: &dyn IdentityVerifier,
    credential: Option<&str>,
) -> Result<Identity, VerificationError> {
    let raw = credential
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(VerificationError::MissingCredential)?;
    verifier.verify_token(raw).await
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
