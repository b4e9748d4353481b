// std
use std::iter::IntoIterator;
// self
use crate::{
	_prelude::*,
	provider::{
		DEFAULT_CLIENT_ID, DEFAULT_OTP_HEADER, DEFAULT_SCOPES, DEFAULT_TOKEN_ENDPOINT,
		DEFAULT_USER_AGENT, ProviderDescriptor,
	},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ProviderDescriptorError {
	/// The token endpoint string could not be parsed.
	#[error("Token endpoint is not a valid URL: {url}.")]
	InvalidEndpoint {
		/// Rejected input.
		url: String,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The token endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Client id is mandatory.
	#[error("Client id must not be empty.")]
	EmptyClientId,
	/// A configured header name is not a valid HTTP token.
	#[error("Header name `{name}` is not a valid HTTP header name.")]
	InvalidHeaderName {
		/// Offending header name.
		name: String,
	},
}

/// Builder for [`ProviderDescriptor`] values, seeded with the production profile.
#[derive(Debug)]
pub struct ProviderDescriptorBuilder {
	token_endpoint: Option<Url>,
	token_endpoint_raw: Option<String>,
	client_id: String,
	scopes: Vec<String>,
	otp_header: String,
	user_agent: String,
	skip_provision: bool,
	extra_headers: BTreeMap<String, String>,
}
impl ProviderDescriptorBuilder {
	/// Creates a builder carrying the production defaults.
	pub fn new() -> Self {
		Self {
			token_endpoint: None,
			token_endpoint_raw: None,
			client_id: DEFAULT_CLIENT_ID.into(),
			scopes: DEFAULT_SCOPES.iter().map(|scope| (*scope).to_owned()).collect(),
			otp_header: DEFAULT_OTP_HEADER.into(),
			user_agent: DEFAULT_USER_AGENT.into(),
			skip_provision: true,
			extra_headers: BTreeMap::new(),
		}
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);
		self.token_endpoint_raw = None;

		self
	}

	/// Sets the token endpoint from a string; parsing happens in [`Self::build`].
	pub fn token_endpoint_str(mut self, url: impl Into<String>) -> Self {
		self.token_endpoint = None;
		self.token_endpoint_raw = Some(url.into());

		self
	}

	/// Overrides the OAuth client id.
	pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
		self.client_id = client_id.into();

		self
	}

	/// Replaces the requested scopes.
	pub fn scopes<I, S>(mut self, scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.scopes = scopes.into_iter().map(Into::into).collect();

		self
	}

	/// Overrides the header carrying the one-time passcode.
	pub fn otp_header(mut self, name: impl Into<String>) -> Self {
		self.otp_header = name.into();

		self
	}

	/// Overrides the `User-Agent`.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Toggles `skip_provision` in password grant bodies.
	pub fn skip_provision(mut self, skip: bool) -> Self {
		self.skip_provision = skip;

		self
	}

	/// Adds a header sent with every token request.
	pub fn extra_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.extra_headers.insert(name.into(), value.into());

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ProviderDescriptor, ProviderDescriptorError> {
		let token_endpoint = match (self.token_endpoint, self.token_endpoint_raw) {
			(Some(url), _) => url,
			(None, Some(raw)) => Url::parse(&raw)
				.map_err(|_| ProviderDescriptorError::InvalidEndpoint { url: raw.clone() })?,
			(None, None) => Url::parse(DEFAULT_TOKEN_ENDPOINT).map_err(|_| {
				ProviderDescriptorError::InvalidEndpoint { url: DEFAULT_TOKEN_ENDPOINT.into() }
			})?,
		};
		let descriptor = ProviderDescriptor {
			token_endpoint,
			client_id: self.client_id.trim().to_owned(),
			scopes: self.scopes,
			otp_header: self.otp_header.to_ascii_lowercase(),
			user_agent: self.user_agent,
			skip_provision: self.skip_provision,
			extra_headers: self.extra_headers,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}
impl Default for ProviderDescriptorBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ProviderDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), ProviderDescriptorError> {
		validate_endpoint(&self.token_endpoint)?;

		if self.client_id.is_empty() {
			return Err(ProviderDescriptorError::EmptyClientId);
		}

		validate_header_name(&self.otp_header)?;

		for name in self.extra_headers.keys() {
			validate_header_name(name)?;
		}

		Ok(())
	}
}

fn validate_endpoint(url: &Url) -> Result<(), ProviderDescriptorError> {
	let loopback = matches!(url.host_str(), Some("127.0.0.1" | "localhost" | "[::1]"));

	match url.scheme() {
		"https" => Ok(()),
		"http" if loopback => Ok(()),
		_ => Err(ProviderDescriptorError::InsecureEndpoint { url: url.to_string() }),
	}
}

fn validate_header_name(name: &str) -> Result<(), ProviderDescriptorError> {
	let valid = !name.is_empty()
		&& name.bytes().all(|b| b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b));

	if valid {
		Ok(())
	} else {
		Err(ProviderDescriptorError::InvalidHeaderName { name: name.to_owned() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rejects_plain_http_outside_loopback() {
		let err = ProviderDescriptor::builder()
			.token_endpoint_str("http://api.example.com/token")
			.build()
			.expect_err("Plain HTTP to a remote host must be rejected.");

		assert!(matches!(err, ProviderDescriptorError::InsecureEndpoint { .. }));

		ProviderDescriptor::builder()
			.token_endpoint_str("http://127.0.0.1:8080/token")
			.build()
			.expect("Loopback endpoints may use plain HTTP.");
	}

	#[test]
	fn rejects_blank_client_id_and_bad_headers() {
		assert_eq!(
			ProviderDescriptor::builder().client_id("  ").build(),
			Err(ProviderDescriptorError::EmptyClientId)
		);
		assert_eq!(
			ProviderDescriptor::builder().otp_header("x otp").build(),
			Err(ProviderDescriptorError::InvalidHeaderName { name: "x otp".into() })
		);
	}

	#[test]
	fn unparsable_endpoint_is_reported() {
		let err = ProviderDescriptor::builder()
			.token_endpoint_str("not a url")
			.build()
			.expect_err("Garbage endpoints must be rejected.");

		assert_eq!(err, ProviderDescriptorError::InvalidEndpoint { url: "not a url".into() });
	}
}
