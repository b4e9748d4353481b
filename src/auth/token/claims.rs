//! Best-effort identity lookup inside JWT access tokens.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;

/// Prefix carried by canonical identity identifiers.
pub const IDENTITY_PREFIX: &str = "identity-";

const IDENTITY_CLAIMS: [&str; 4] = ["identity_canonical_id", "identity_id", "sub", "user_id"];

/// Extracts the canonical identity id from the unverified JWT payload of an access token.
///
/// The signature is not checked; the value is only used to address GraphQL queries, the
/// server remains the authority. Returns `None` for opaque tokens or when no claim carries an
/// `identity-` prefixed string.
pub fn identity_from_access_token(access_token: &str) -> Option<String> {
	let payload = access_token.split('.').nth(1)?;
	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
	let claims: Value = serde_json::from_slice(&bytes).ok()?;

	IDENTITY_CLAIMS.iter().find_map(|claim| {
		claims
			.get(claim)
			.and_then(Value::as_str)
			.filter(|value| value.starts_with(IDENTITY_PREFIX))
			.map(str::to_owned)
	})
}
