//! Token endpoint facade: JSON wire records for the password and refresh grants, response
//! parsing, and error mapping into the session taxonomy.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::{Credential, TokenPair, TokenSecret},
	error::{AuthFailureReason, ConfigError, TransientError, TransportError},
	http::{TokenHttpClient, TokenHttpRequest, TokenHttpResponse},
	provider::{
		GrantType, ProviderDescriptor, ProviderErrorContext, ProviderErrorKind, ProviderStrategy,
	},
};

/// Lifetime assumed when a token response omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::seconds(1800);

/// Successful token endpoint response.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Bearer token.
	pub access_token: String,
	/// Rotated refresh token; refresh responses may omit it.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Lifetime in seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
	/// Canonical identity of the signed-in user.
	#[serde(default)]
	pub identity_canonical_id: Option<String>,
	/// Every other field, kept opaque.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}
impl TokenResponse {
	/// Builds a [`TokenPair`] issued at `issued_at`.
	///
	/// `fallback_refresh` is used when the response does not rotate the refresh token.
	pub fn into_pair(
		self,
		issued_at: OffsetDateTime,
		fallback_refresh: Option<&TokenSecret>,
	) -> Result<TokenPair, ConfigError> {
		let lifetime = match self.expires_in {
			Some(seconds) if seconds <= 0 => return Err(ConfigError::NonPositiveExpiresIn),
			Some(seconds) => Duration::seconds(seconds),
			None => DEFAULT_TOKEN_LIFETIME,
		};
		let refresh = self
			.refresh_token
			.filter(|token| !token.trim().is_empty())
			.or_else(|| fallback_refresh.map(|token| token.expose().to_owned()))
			.unwrap_or_default();
		let mut builder = TokenPair::builder()
			.access_token(self.access_token)
			.refresh_token(refresh)
			.issued_at(issued_at)
			.expires_in(lifetime);

		if let Some(identity) = self.identity_canonical_id.filter(|id| !id.trim().is_empty()) {
			builder = builder.identity_id(identity);
		}

		Ok(builder.build()?)
	}
}
impl Debug for TokenResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenResponse")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.field("identity_canonical_id", &self.identity_canonical_id)
			.field("extra_fields", &self.extra.keys().collect::<Vec<_>>())
			.finish()
	}
}

/// OAuth-style error body.
#[derive(Clone, Debug, Default, Deserialize)]
struct OAuthErrorBody {
	#[serde(default)]
	error: Option<String>,
	#[serde(default, alias = "message")]
	error_description: Option<String>,
}

#[derive(Serialize)]
struct PasswordGrantBody<'a> {
	grant_type: &'static str,
	username: &'a str,
	password: &'a str,
	skip_provision: bool,
	scope: String,
	client_id: &'a str,
	#[serde(flatten)]
	extra: Map<String, Value>,
}

#[derive(Serialize)]
struct RefreshGrantBody<'a> {
	grant_type: &'static str,
	refresh_token: &'a str,
	client_id: &'a str,
	#[serde(flatten)]
	extra: Map<String, Value>,
}

enum EndpointFailure {
	Rejected { kind: ProviderErrorKind, message: String },
	Other(Error),
}
impl EndpointFailure {
	fn into_password_error(self) -> Error {
		match self {
			EndpointFailure::Rejected { kind: ProviderErrorKind::InvalidGrant, message } =>
				Error::authentication_failed(AuthFailureReason::InvalidCredentials, message),
			EndpointFailure::Rejected { kind: ProviderErrorKind::OtpRequired, message } =>
				Error::authentication_failed(AuthFailureReason::OtpRequired, message),
			EndpointFailure::Rejected { kind: ProviderErrorKind::Transient, message } =>
				Error::authentication_failed(AuthFailureReason::Transport, message),
			EndpointFailure::Other(source) => Error::AuthenticationFailed {
				reason: AuthFailureReason::Transport,
				message: source.to_string().trim_end_matches('.').to_owned(),
				source: Some(Box::new(source)),
			},
		}
	}

	fn into_refresh_error(self) -> Error {
		match self {
			EndpointFailure::Rejected { message, .. } =>
				Error::ReauthenticationRequired { reason: message },
			EndpointFailure::Other(source) => source,
		}
	}
}
impl From<Error> for EndpointFailure {
	fn from(e: Error) -> Self {
		Self::Other(e)
	}
}
impl From<ConfigError> for EndpointFailure {
	fn from(e: ConfigError) -> Self {
		Self::Other(e.into())
	}
}
impl From<TransientError> for EndpointFailure {
	fn from(e: TransientError) -> Self {
		Self::Other(e.into())
	}
}
impl From<TransportError> for EndpointFailure {
	fn from(e: TransportError) -> Self {
		Self::Other(e.into())
	}
}

/// Issues password and refresh grants against the configured token endpoint.
pub(crate) struct TokenEndpoint<C>
where
	C: ?Sized + TokenHttpClient,
{
	descriptor: ProviderDescriptor,
	strategy: Arc<dyn ProviderStrategy>,
	http_client: Arc<C>,
	request_timeout: Duration,
}
impl<C> TokenEndpoint<C>
where
	C: ?Sized + TokenHttpClient,
{
	pub(crate) fn new(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: Arc<C>,
		request_timeout: Duration,
	) -> Self {
		Self { descriptor, strategy, http_client, request_timeout }
	}

	pub(crate) fn descriptor(&self) -> &ProviderDescriptor {
		&self.descriptor
	}

	/// Runs the password grant, sending the OTP (if any) in the configured header.
	pub(crate) async fn exchange_password(&self, credential: &Credential) -> Result<TokenPair> {
		let mut extra = Map::new();

		self.strategy.augment_token_request(GrantType::Password, &mut extra);

		let body = PasswordGrantBody {
			grant_type: GrantType::Password.as_str(),
			username: credential.username(),
			password: credential.expose_password(),
			skip_provision: self.descriptor.skip_provision,
			scope: self.descriptor.scope_string(),
			client_id: &self.descriptor.client_id,
			extra,
		};

		self.exchange(GrantType::Password, &body, credential.expose_otp(), None)
			.await
			.map_err(EndpointFailure::into_password_error)
	}

	/// Runs the refresh grant; the old refresh token is kept when the response omits one.
	pub(crate) async fn exchange_refresh(&self, refresh_token: &TokenSecret) -> Result<TokenPair> {
		let mut extra = Map::new();

		self.strategy.augment_token_request(GrantType::RefreshToken, &mut extra);

		let body = RefreshGrantBody {
			grant_type: GrantType::RefreshToken.as_str(),
			refresh_token: refresh_token.expose(),
			client_id: &self.descriptor.client_id,
			extra,
		};

		self.exchange(GrantType::RefreshToken, &body, None, Some(refresh_token))
			.await
			.map_err(EndpointFailure::into_refresh_error)
	}

	async fn exchange<B>(
		&self,
		grant: GrantType,
		body: &B,
		otp: Option<&str>,
		fallback_refresh: Option<&TokenSecret>,
	) -> Result<TokenPair, EndpointFailure>
	where
		B: Serialize,
	{
		let request = self.build_request(body, otp)?;
		let response = match self.http_client.execute(request).await {
			Ok(response) => response,
			Err(e) => return Err(self.map_transport_error(grant, e)),
		};
		let issued_at = OffsetDateTime::now_utc();

		if !response.is_success() {
			return Err(self.map_error_response(grant, &response));
		}

		let parsed = parse_token_response(&response)?;

		Ok(parsed.into_pair(issued_at, fallback_refresh)?)
	}

	fn build_request<B>(&self, body: &B, otp: Option<&str>) -> Result<TokenHttpRequest, Error>
	where
		B: Serialize,
	{
		let body = serde_json::to_vec(body).map_err(ConfigError::RequestEncode)?;
		let mut headers = vec![
			("content-type".to_owned(), "application/json".to_owned()),
			("accept".to_owned(), "application/json".to_owned()),
			("user-agent".to_owned(), self.descriptor.user_agent.clone()),
		];

		headers.extend(
			self.descriptor.extra_headers.iter().map(|(name, value)| (name.clone(), value.clone())),
		);

		if let Some(otp) = otp.map(str::trim).filter(|otp| !otp.is_empty()) {
			headers.push((self.descriptor.otp_header.clone(), otp.to_owned()));
		}

		Ok(TokenHttpRequest {
			url: self.descriptor.token_endpoint.clone(),
			headers,
			body,
			timeout: Some(self.request_timeout.unsigned_abs()),
		})
	}

	fn map_transport_error(&self, grant: GrantType, e: C::TransportError) -> EndpointFailure {
		if self.http_client.is_timeout(&e) {
			return TransientError::TokenEndpoint {
				message: "Request timed out while calling the token endpoint".into(),
				status: None,
				retry_after: None,
			}
			.into();
		}

		match self.strategy.classify_token_error(&ProviderErrorContext::network_failure(grant)) {
			ProviderErrorKind::Transient => TransportError::network(e).into(),
			kind => EndpointFailure::Rejected {
				kind,
				message: format!("Token endpoint could not be reached: {e}"),
			},
		}
	}

	fn map_error_response(&self, grant: GrantType, response: &TokenHttpResponse) -> EndpointFailure {
		let meta = response.metadata();
		let parsed = serde_json::from_slice::<OAuthErrorBody>(&response.body).ok();
		let mut ctx = ProviderErrorContext::new(grant)
			.with_http_status(response.status)
			.with_otp_challenge(response.header(&self.descriptor.otp_header).is_some());

		match parsed {
			Some(body) => {
				if let Some(error) = body.error {
					ctx = ctx.with_oauth_error(error);
				}
				if let Some(description) = body.error_description {
					ctx = ctx.with_error_description(description);
				}
			},
			None if !response.body.is_empty() =>
				ctx = ctx.with_body_preview(String::from_utf8_lossy(&response.body)),
			None => {},
		}

		let kind = self.strategy.classify_token_error(&ctx);
		let message = match (&ctx.error_description, &ctx.oauth_error) {
			(Some(description), _) => format!("Token endpoint returned an OAuth error: {description}"),
			(None, Some(error)) => format!("Token endpoint returned an OAuth error: {error}"),
			(None, None) => format!("Token endpoint returned HTTP {}", response.status),
		};

		match kind {
			ProviderErrorKind::Transient => TransientError::TokenEndpoint {
				message,
				status: meta.status,
				retry_after: meta.retry_after,
			}
			.into(),
			kind => EndpointFailure::Rejected { kind, message },
		}
	}
}

fn parse_token_response(response: &TokenHttpResponse) -> Result<TokenResponse, TransientError> {
	let mut deserializer = serde_json::Deserializer::from_slice(&response.body);

	serde_path_to_error::deserialize(&mut deserializer)
		.map_err(|source| TransientError::TokenResponseParse { source, status: Some(response.status) })
}
