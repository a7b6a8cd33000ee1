//! Verification error types.

use campus_core::IdentityError;

/// WebSocket close code for a handshake without a credential.
pub const CLOSE_MISSING_CREDENTIAL: u16 = 4000;
/// WebSocket close code for an expired token.
pub const CLOSE_TOKEN_EXPIRED: u16 = 4001;
/// WebSocket close code for any other invalid token.
pub const CLOSE_TOKEN_INVALID: u16 = 4002;

/// Handshake-time verification failures. Both variants are terminal for the
/// connection that produced them and never touch shared state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// No credential in the handshake field or `Authorization` header.
    #[error("no credential presented")]
    MissingCredential,

    /// Credential present but rejected.
    #[error("invalid credential: {reason}")]
    InvalidCredential {
        /// Why the credential was rejected.
        reason: RejectReason,
    },
}

/// Why a presented credential was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    /// `exp` is in the past.
    #[error("token expired")]
    Expired,
    /// Signature did not match the issuer key.
    #[error("bad signature")]
    BadSignature,
    /// Token could not be decoded or a required claim was missing.
    #[error("malformed token: {0}")]
    Malformed(String),
    /// Claims decoded but do not form a valid identity.
    #[error("invalid claims: {0}")]
    Claims(#[from] IdentityError),
    /// No credential arrived within the auth grace period.
    #[error("handshake timed out")]
    HandshakeTimeout,
}

impl VerificationError {
    /// Shorthand for an [`VerificationError::InvalidCredential`].
    pub fn invalid(reason: RejectReason) -> Self {
        Self::InvalidCredential { reason }
    }

    /// Close code sent to the client before the transport is dropped.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::MissingCredential => CLOSE_MISSING_CREDENTIAL,
            Self::InvalidCredential {
                reason: RejectReason::Expired,
            } => CLOSE_TOKEN_EXPIRED,
            Self::InvalidCredential { .. } => CLOSE_TOKEN_INVALID,
        }
    }

    /// Short, client-safe close reason.
    pub fn close_reason(&self) -> &'static str {
        match self {
            Self::MissingCredential => "Credential required",
            Self::InvalidCredential {
                reason: RejectReason::Expired,
            } => "Token expired",
            Self::InvalidCredential {
                reason: RejectReason::HandshakeTimeout,
            } => "Handshake timed out",
            Self::InvalidCredential { .. } => "Token invalid",
        }
    }
}

impl From<IdentityError> for VerificationError {
    fn from(err: IdentityError) -> Self {
        Self::invalid(RejectReason::Claims(err))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::Role;

    #[test]
    fn missing_display_and_code() {
        let err = VerificationError::MissingCredential;
        assert_eq!(err.to_string(), "no credential presented");
        assert_eq!(err.close_code(), 4000);
    }

    #[test]
    fn expired_maps_to_4001() {
        let err = VerificationError::invalid(RejectReason::Expired);
        assert_eq!(err.close_code(), CLOSE_TOKEN_EXPIRED);
        assert_eq!(err.close_reason(), "Token expired");
        assert_eq!(err.to_string(), "invalid credential: token expired");
    }

    #[test]
    fn other_rejections_map_to_4002() {
        for reason in [
            RejectReason::BadSignature,
            RejectReason::Malformed("bad base64".into()),
            RejectReason::HandshakeTimeout,
        ] {
            assert_eq!(VerificationError::invalid(reason).close_code(), 4002);
        }
    }

    #[test]
    fn identity_error_converts() {
        let err: VerificationError = IdentityError::MissingTenant(Role::Teacher).into();
        assert!(err.to_string().contains("requires a tenant"));
        assert_eq!(err.close_code(), CLOSE_TOKEN_INVALID);
    }
}
