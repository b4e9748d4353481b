//! Session-level error types shared across the token endpoint, stores, and the session manager.

// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, TokenPairBuilderError},
	provider::ProviderDescriptorError,
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// No explicit tokens, persisted tokens, or username/password were available at construction.
	#[error("No access token, persisted session, or username/password was supplied.")]
	CredentialsMissing,
	/// The password grant failed.
	#[error("Authentication failed ({reason}): {message}.")]
	AuthenticationFailed {
		/// Machine-readable failure class.
		reason: AuthFailureReason,
		/// Provider- or session-supplied detail.
		message: String,
		/// Underlying transport or parsing failure, when one exists.
		#[source]
		source: Option<BoxError>,
	},
	/// The refresh token was rejected; a fresh `authenticate` call is required.
	#[error("Session must be re-authenticated: {reason}.")]
	ReauthenticationRequired {
		/// Provider- or session-supplied reason string.
		reason: String,
	},
	/// A token was requested before any successful authentication (or after logout).
	#[error("Session is not authenticated.")]
	NotAuthenticated,

	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// A business endpoint answered with a non-success HTTP status.
	#[error("API request failed with HTTP {status}: {message}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Body preview or status reason.
		message: String,
	},
	/// A GraphQL response carried a non-empty `errors` array.
	#[error("GraphQL operation `{operation}` returned errors: {errors}.")]
	Graphql {
		/// Operation name sent with the request.
		operation: String,
		/// Serialized `errors` array.
		errors: String,
	},
}
impl Error {
	/// Builds an [`Error::AuthenticationFailed`] without an underlying source.
	pub fn authentication_failed(reason: AuthFailureReason, message: impl Into<String>) -> Self {
		Self::AuthenticationFailed { reason, message: message.into(), source: None }
	}

	/// Returns `true` when retrying the same operation may succeed without new input.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transient(_) | Self::Transport(_) => true,
			Self::AuthenticationFailed { reason, .. } => reason.is_retryable(),
			Self::Api { status, .. } => *status == 429 || *status >= 500,
			_ => false,
		}
	}
}

/// Distinguishes why a password grant failed so callers can re-prompt selectively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureReason {
	/// Username or password was rejected (or empty).
	InvalidCredentials,
	/// The account requires a one-time passcode, or the supplied one was rejected.
	OtpRequired,
	/// Network failure, timeout, upstream outage, or an unreadable response.
	Transport,
}
impl AuthFailureReason {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthFailureReason::InvalidCredentials => "invalid_credentials",
			AuthFailureReason::OtpRequired => "otp_required",
			AuthFailureReason::Transport => "transport",
		}
	}

	/// Only transport failures are worth retrying with the same credential.
	pub const fn is_retryable(self) -> bool {
		matches!(self, AuthFailureReason::Transport)
	}
}
impl Display for AuthFailureReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A configured URL could not be parsed.
	#[error("Endpoint URL is invalid.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Provider descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] ProviderDescriptorError),
	/// Profile key failed validation.
	#[error("Profile key is invalid.")]
	InvalidProfile(#[from] IdentifierError),
	/// Token pair builder validation failed.
	#[error("Unable to build token pair.")]
	TokenBuild(#[from] TokenPairBuilderError),
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Request body could not be encoded.
	#[error("Token request body could not be encoded.")]
	RequestEncode(#[source] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Provider returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or session-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {target}.")]
	Network {
		/// Human-readable label of the remote endpoint.
		target: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error raised against the token endpoint.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { target: "the token endpoint", source: Box::new(src) }
	}

	/// Wraps a transport-specific network error raised against a business endpoint.
	pub fn api(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { target: "the API endpoint", source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
