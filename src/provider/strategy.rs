//! Provider strategy hooks that customize token exchanges.
//!
//! Implementations decorate outgoing token request bodies and normalize error mapping
//! without tying the session to any particular HTTP client.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, provider::descriptor::GrantType};

/// Strategy hook that allows providers to decorate requests and classify errors.
///
/// Implementors must be `Send + Sync`, and the hooks use crate-owned data types so
/// downstream crates never depend on reqwest-specific structures. Override only what you
/// need; `augment_token_request` has a default no-op implementation.
pub trait ProviderStrategy: Send + Sync {
	/// Maps low-level HTTP/JSON errors into the session taxonomy for a token request.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;

	/// Gives providers a chance to add custom JSON fields before dispatching.
	fn augment_token_request(&self, _grant: GrantType, _body: &mut Map<String, Value>) {}
}

/// Canonical provider error categories used by strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Provider rejected the credentials or the refresh token.
	InvalidGrant,
	/// The password grant needs a (new) one-time passcode.
	OtpRequired,
	/// Failure is temporary and should be retried.
	Transient,
}

/// Context passed to provider strategies when classifying token errors.
///
/// Only primitive data (status codes, OAuth fields, body preview) is kept so strategies
/// stay decoupled from any HTTP client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant type associated with the failing request.
	pub grant_type: GrantType,
	/// HTTP status code returned by the provider, when available.
	pub http_status: Option<u16>,
	/// Provider-supplied OAuth `error` field.
	pub oauth_error: Option<String>,
	/// Provider-supplied OAuth `error_description` field.
	pub error_description: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
	/// Set when the response echoed the OTP header back as a challenge.
	pub otp_challenge: bool,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates a new context scoped to the provided grant type.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
			network_error: false,
			otp_challenge: false,
		}
	}

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure(grant_type: GrantType) -> Self {
		let mut ctx = Self::new(grant_type);

		ctx.network_error = true;

		ctx
	}

	/// Adds an HTTP status code (e.g., 400, 401, 500).
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the OAuth error code string returned by the provider.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Adds the OAuth `error_description` field.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Adds a body preview for providers that return non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}

	/// Marks the response as carrying an OTP challenge header.
	pub fn with_otp_challenge(mut self, challenged: bool) -> Self {
		self.otp_challenge = challenged;

		self
	}

	fn mentions_otp(&self) -> bool {
		[&self.oauth_error, &self.error_description, &self.body_preview]
			.into_iter()
			.flatten()
			.any(|text| {
				let lowered = text.to_ascii_lowercase();

				lowered.contains("otp") || lowered.contains("two-factor") || lowered.contains("2fa")
			})
	}
}

/// Default strategy for the brokerage token endpoint.
///
/// Network failures are always transient. OTP challenges are only recognized on the password
/// grant. Structured OAuth fields win over body hints, and the HTTP status decides the rest.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		if ctx.network_error {
			return ProviderErrorKind::Transient;
		}
		if ctx.grant_type == GrantType::Password
			&& matches!(ctx.http_status, Some(400..=499))
			&& (ctx.otp_challenge || ctx.mentions_otp())
		{
			return ProviderErrorKind::OtpRequired;
		}
		if let Some(kind) =
			classify_oauth_error(ctx.oauth_error.as_deref(), ctx.error_description.as_deref())
		{
			return kind;
		}
		if let Some(kind) = classify_body(ctx.body_preview.as_deref()) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProviderErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf = body.chars().take(ProviderErrorContext::BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

fn classify_oauth_error(
	oauth_error: Option<&str>,
	error_description: Option<&str>,
) -> Option<ProviderErrorKind> {
	oauth_error
		.and_then(match_exact_value)
		.or_else(|| error_description.and_then(match_exact_value))
		.or_else(|| classify_body(error_description))
}

fn match_exact_value(value: &str) -> Option<ProviderErrorKind> {
	const REJECTED: [&str; 4] =
		["invalid_grant", "invalid_client", "unauthorized_client", "access_denied"];
	const TRANSIENT: [&str; 2] = ["temporarily_unavailable", "server_error"];

	if REJECTED.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(ProviderErrorKind::InvalidGrant)
	} else if TRANSIENT.iter().any(|code| value.eq_ignore_ascii_case(code)) {
		Some(ProviderErrorKind::Transient)
	} else {
		None
	}
}

fn classify_body(body: Option<&str>) -> Option<ProviderErrorKind> {
	let lowered = body?.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant") || text.contains("invalid_client") =>
			Some(ProviderErrorKind::InvalidGrant),
		text if text.contains("temporarily_unavailable") => Some(ProviderErrorKind::Transient),
		_ => None,
	}
}

fn classify_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400 | 401 | 403) => ProviderErrorKind::InvalidGrant,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn otp_challenge_only_applies_to_password_grant() {
		let strategy = DefaultProviderStrategy;
		let password = ProviderErrorContext::new(GrantType::Password)
			.with_http_status(401)
			.with_otp_challenge(true);
		let refresh = ProviderErrorContext::new(GrantType::RefreshToken)
			.with_http_status(401)
			.with_otp_challenge(true);

		assert_eq!(strategy.classify_token_error(&password), ProviderErrorKind::OtpRequired);
		assert_eq!(strategy.classify_token_error(&refresh), ProviderErrorKind::InvalidGrant);
	}

	#[test]
	fn description_mentioning_otp_is_recognized() {
		let ctx = ProviderErrorContext::new(GrantType::Password)
			.with_http_status(401)
			.with_oauth_error("invalid_grant")
			.with_error_description("Invalid OTP provided");

		assert_eq!(
			DefaultProviderStrategy.classify_token_error(&ctx),
			ProviderErrorKind::OtpRequired
		);
	}

	#[test]
	fn oauth_fields_and_status_fall_back_in_order() {
		let strategy = DefaultProviderStrategy;
		let rejected =
			ProviderErrorContext::new(GrantType::RefreshToken).with_oauth_error("invalid_grant");
		let outage = ProviderErrorContext::new(GrantType::RefreshToken)
			.with_http_status(400)
			.with_oauth_error("temporarily_unavailable");
		let throttled = ProviderErrorContext::new(GrantType::Password).with_http_status(429);
		let offline = ProviderErrorContext::network_failure(GrantType::Password);

		assert_eq!(strategy.classify_token_error(&rejected), ProviderErrorKind::InvalidGrant);
		assert_eq!(strategy.classify_token_error(&outage), ProviderErrorKind::Transient);
		assert_eq!(strategy.classify_token_error(&throttled), ProviderErrorKind::Transient);
		assert_eq!(strategy.classify_token_error(&offline), ProviderErrorKind::Transient);
	}

	#[test]
	fn previews_are_truncated() {
		let ctx = ProviderErrorContext::new(GrantType::Password).with_body_preview("x".repeat(300));
		let preview = ctx.body_preview.expect("Preview should be recorded.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
