//! Transport primitives for token endpoint exchanges.
//!
//! The module exposes [`TokenHttpClient`] so downstream crates can plug in a custom HTTP stack.
//! Requests and responses are plain crate-owned records; implementations only move bytes and
//! report status, headers, and timeouts.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
use std::time::Duration as StdDuration;
// crates.io
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;

/// Boxed future returned by [`TokenHttpClient::execute`].
pub type HttpFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + 'a + Send>>;

/// JSON `POST` aimed at the token endpoint.
#[derive(Clone)]
pub struct TokenHttpRequest {
	/// Target URL.
	pub url: Url,
	/// Request headers, in insertion order.
	pub headers: Vec<(String, String)>,
	/// Encoded JSON body.
	pub body: Vec<u8>,
	/// Whole-request deadline.
	pub timeout: Option<StdDuration>,
}
impl Debug for TokenHttpRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let header_names = self.headers.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();

		f.debug_struct("TokenHttpRequest")
			.field("url", &self.url.as_str())
			.field("headers", &header_names)
			.field("body_len", &self.body.len())
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Raw token endpoint response.
#[derive(Clone, Debug, Default)]
pub struct TokenHttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers keyed by lowercase name.
	pub headers: BTreeMap<String, String>,
	/// Response body bytes.
	pub body: Vec<u8>,
}
impl TokenHttpResponse {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Looks up a header case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Extracts status and retry hints for error mapping.
	pub fn metadata(&self) -> ResponseMetadata {
		ResponseMetadata {
			status: Some(self.status),
			retry_after: self.header("retry-after").and_then(parse_retry_after),
		}
	}
}

/// Metadata captured from a token endpoint response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the token endpoint, if available.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Abstraction over HTTP transports capable of executing token exchanges.
///
/// The trait is the session's only dependency on an HTTP stack. Implementations must be
/// `Send + Sync + 'static` so they can be shared across sessions, and the futures they return
/// must be `Send`.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// Sends the request and returns the full response, whatever its status.
	fn execute(
		&self,
		request: TokenHttpRequest,
	) -> HttpFuture<'_, TokenHttpResponse, Self::TransportError>;

	/// Returns `true` when `error` represents an elapsed deadline.
	fn is_timeout(&self, _error: &Self::TransportError) -> bool {
		false
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Token requests should not follow redirects; configure any custom [`ReqwestClient`]
/// accordingly before wrapping it.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type TransportError = ReqwestError;

	fn execute(
		&self,
		request: TokenHttpRequest,
	) -> HttpFuture<'_, TokenHttpResponse, Self::TransportError> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = client.post(request.url).body(request.body);

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(timeout) = request.timeout {
				builder = builder.timeout(timeout);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(TokenHttpResponse { status, headers, body })
		})
	}

	fn is_timeout(&self, error: &Self::TransportError) -> bool {
		error.is_timeout()
	}
}

fn parse_retry_after(raw: &str) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return i64::try_from(secs).ok().map(Duration::seconds);
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn metadata_reads_retry_after_seconds() {
		let response = TokenHttpResponse {
			status: 429,
			headers: BTreeMap::from([("retry-after".into(), "17".into())]),
			body: Vec::new(),
		};
		let meta = response.metadata();

		assert_eq!(meta.status, Some(429));
		assert_eq!(meta.retry_after, Some(Duration::seconds(17)));
		assert_eq!(response.header("Retry-After"), Some("17"));
		assert!(!response.is_success());
	}

	#[test]
	fn past_http_dates_are_ignored() {
		assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
		assert_eq!(parse_retry_after("soon"), None);
	}

	#[test]
	fn out_of_range_delay_seconds_are_ignored() {
		assert_eq!(parse_retry_after("18446744073709551615"), None);
		assert_eq!(parse_retry_after("9223372036854775808"), None);
		assert_eq!(parse_retry_after(" 120 "), Some(Duration::seconds(120)));
	}

	#[test]
	fn request_debug_hides_header_values_and_body() {
		let request = TokenHttpRequest {
			url: Url::parse("https://example.com/token").expect("Fixture URL should parse."),
			headers: vec![("x-wealthsimple-otp".into(), "123456".into())],
			body: b"{\"password\":\"hunter2\"}".to_vec(),
			timeout: None,
		};
		let rendered = format!("{request:?}");

		assert!(rendered.contains("x-wealthsimple-otp"));
		assert!(!rendered.contains("123456"));
		assert!(!rendered.contains("hunter2"));
	}
}
