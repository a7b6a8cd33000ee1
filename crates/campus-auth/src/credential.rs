//! Locating the bearer token in a handshake.

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The scheme is matched case-insensitively.
pub fn bearer_from_header(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Pick the handshake credential: the dedicated handshake field wins over
/// the `Authorization` header. Blank values count as absent.
pub fn select_credential(handshake_field: Option<&str>, authorization: Option<&str>) -> Option<String> {
    handshake_field
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| authorization.and_then(bearer_from_header))
        .map(ToOwned::to_owned)
}
