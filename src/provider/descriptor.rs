//! Token endpoint profile shared by the password and refresh grants.
//!
//! The module exposes validated metadata, the builder that enforces it, and the grant
//! identifiers written into request bodies.

/// Builder API for assembling provider descriptors.
pub mod builder;
/// Grant identifiers used on the wire.
pub mod grant;

pub use builder::*;
pub use grant::*;

// std
use std::env;
// self
use crate::_prelude::*;

/// Production OAuth token endpoint.
pub const DEFAULT_TOKEN_ENDPOINT: &str =
	"https://api.production.wealthsimple.com/v1/oauth/v2/token";
/// Public client id used by the web application.
pub const DEFAULT_CLIENT_ID: &str =
	"4da53ac2b03225bed1550eba8e4611e086c7b905a3855e6ed12ea08c246758fa";
/// Scopes requested by the password grant.
pub const DEFAULT_SCOPES: [&str; 6] =
	["invest.read", "invest.write", "trade.read", "trade.write", "tax.read", "tax.write"];
/// Header carrying the one-time passcode.
pub const DEFAULT_OTP_HEADER: &str = "x-wealthsimple-otp";
/// Browser user agent the endpoint expects.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
	AppleWebKit/605.1.15 (KHTML, like Gecko) Version/26.0 Safari/605.1.15";
/// Environment variable overriding the client id.
pub const CLIENT_ID_VAR: &str = "WS_CLIENT_ID";

/// Immutable token endpoint profile consumed by the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
	/// Token endpoint used for sign-in and refresh.
	pub token_endpoint: Url,
	/// OAuth client id sent in every body.
	pub client_id: String,
	/// Scopes requested by the password grant.
	pub scopes: Vec<String>,
	/// Header name carrying the one-time passcode.
	pub otp_header: String,
	/// `User-Agent` sent with token requests.
	pub user_agent: String,
	/// Value of `skip_provision` in password grant bodies.
	pub skip_provision: bool,
	/// Additional headers sent with every token request.
	pub extra_headers: BTreeMap<String, String>,
}
impl ProviderDescriptor {
	/// Creates a builder seeded with the production profile.
	pub fn builder() -> ProviderDescriptorBuilder {
		ProviderDescriptorBuilder::new()
	}

	/// Returns the production profile.
	pub fn wealthsimple() -> Result<Self, ProviderDescriptorError> {
		Self::builder().build()
	}

	/// Returns the production profile with `WS_CLIENT_ID` applied when set.
	pub fn from_env() -> Result<Self, ProviderDescriptorError> {
		let builder = Self::builder();
		let builder = match env::var(CLIENT_ID_VAR) {
			Ok(client_id) if !client_id.trim().is_empty() => builder.client_id(client_id.trim()),
			_ => builder,
		};

		builder.build()
	}

	/// Space-delimited scope string sent on the wire.
	pub fn scope_string(&self) -> String {
		self.scopes.join(" ")
	}
}
