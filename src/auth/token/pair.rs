//! Immutable access/refresh token pairs, expiry helpers, and builders.

// self
use crate::{
	_prelude::*,
	auth::token::{claims, secret::TokenSecret},
};

/// Freshness of a token pair relative to an instant and a safety margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// More than the safety margin remains before expiry.
	Valid,
	/// Still valid, but inside the safety margin; callers should refresh first.
	ExpiringSoon,
	/// The expiry instant has passed.
	Expired,
}

/// Errors produced by [`TokenPairBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum TokenPairBuilderError {
	/// Issued when no (or a blank) access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no (or a blank) refresh token value was provided.
	#[error("Refresh token is required.")]
	MissingRefreshToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
}

/// Access token, refresh token, and the instant the access token stops being accepted.
///
/// Pairs are never mutated: a refresh builds a new pair and the old one is dropped.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenPair {
	access_token: TokenSecret,
	refresh_token: TokenSecret,
	#[serde(with = "time::serde::rfc3339")]
	issued_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	expires_at: OffsetDateTime,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	identity_id: Option<String>,
}
impl TokenPair {
	/// Returns a builder for constructing pairs.
	pub fn builder() -> TokenPairBuilder {
		TokenPairBuilder::default()
	}

	/// Bearer token presented on every API request.
	pub fn access_token(&self) -> &TokenSecret {
		&self.access_token
	}

	/// Refresh token exchanged for the next pair.
	pub fn refresh_token(&self) -> &TokenSecret {
		&self.refresh_token
	}

	/// Local instant at which the pair was received.
	pub fn issued_at(&self) -> OffsetDateTime {
		self.issued_at
	}

	/// Instant at which the access token expires.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.expires_at
	}

	/// Canonical identity id, if the response or the JWT carried one.
	pub fn identity_id(&self) -> Option<&str> {
		self.identity_id.as_deref()
	}

	/// Time left before expiry; negative once expired.
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}

	/// Computes the freshness at `instant` given a safety margin.
	pub fn status_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> TokenStatus {
		if instant >= self.expires_at {
			return TokenStatus::Expired;
		}
		if instant >= self.expires_at - safety_margin {
			return TokenStatus::ExpiringSoon;
		}

		TokenStatus::Valid
	}

	/// Returns `true` when the pair must be refreshed before its access token is handed out.
	pub fn needs_refresh_at(&self, instant: OffsetDateTime, safety_margin: Duration) -> bool {
		!matches!(self.status_at(instant, safety_margin), TokenStatus::Valid)
	}

	/// Returns `true` if the access token has expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant, Duration::ZERO), TokenStatus::Expired)
	}
}
impl Debug for TokenPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenPair")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("identity_id", &self.identity_id)
			.finish()
	}
}

/// Builder for [`TokenPair`].
#[derive(Clone, Debug, Default)]
pub struct TokenPairBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	identity_id: Option<String>,
}
impl TokenPairBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Sets the issued-at instant (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets the server-reported lifetime, counted from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Records the canonical identity id.
	pub fn identity_id(mut self, identity: impl Into<String>) -> Self {
		self.identity_id = Some(identity.into());

		self
	}

	/// Consumes the builder and produces a [`TokenPair`].
	///
	/// When no identity id was supplied, the JWT payload of the access token is consulted.
	pub fn build(self) -> Result<TokenPair, TokenPairBuilderError> {
		let access_token = self
			.access_token
			.filter(|token| !token.is_blank())
			.ok_or(TokenPairBuilderError::MissingAccessToken)?;
		let refresh_token = self
			.refresh_token
			.filter(|token| !token.is_blank())
			.ok_or(TokenPairBuilderError::MissingRefreshToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(TokenPairBuilderError::MissingExpiry),
		};
		let identity_id = self
			.identity_id
			.or_else(|| claims::identity_from_access_token(access_token.expose()));

		Ok(TokenPair { access_token, refresh_token, issued_at, expires_at, identity_id })
	}
}
