//! Minimal GraphQL caller that leans on [`Session::valid_token`](crate::session::Session::valid_token).
//!
//! Query text is always supplied by the caller. The client only attaches the bearer token and
//! the fixed web-client headers, unwraps `data`, and turns a top-level `errors` array into
//! [`Error::Graphql`].

// crates.io
use reqwest::{Response, StatusCode};
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{ConfigError, TransportError},
	obs,
	session::ReqwestSession,
};

/// Production GraphQL endpoint.
pub const DEFAULT_GRAPHQL_ENDPOINT: &str = "https://my.wealthsimple.com/graphql";
/// Value of the `x-ws-api-version` header.
pub const API_VERSION: &str = "12";

const FIXED_HEADERS: [(&str, &str); 4] = [
	("x-ws-api-version", API_VERSION),
	("x-platform-os", "web"),
	("x-ws-locale", "en-CA"),
	("x-ws-profile", "trade"),
];
const MESSAGE_PREVIEW_LIMIT: usize = 256;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlRequest<'a> {
	operation_name: &'a str,
	query: &'a str,
	variables: Value,
}

#[derive(Deserialize)]
struct GraphqlEnvelope {
	#[serde(default)]
	data: Option<Value>,
	#[serde(default)]
	errors: Option<Vec<Value>>,
}

/// GraphQL client bound to one [`ReqwestSession`].
#[derive(Clone, Debug)]
pub struct GraphqlClient {
	session: Arc<ReqwestSession>,
	http: ReqwestClient,
	endpoint: Url,
}
impl GraphqlClient {
	/// Creates a client for the production endpoint that sends requests through `http`.
	pub fn new(session: Arc<ReqwestSession>, http: ReqwestClient) -> Result<Self> {
		let endpoint = Url::parse(DEFAULT_GRAPHQL_ENDPOINT)
			.map_err(|source| ConfigError::InvalidEndpoint { source })?;

		Ok(Self { session, http, endpoint })
	}

	/// Points the client at another endpoint.
	pub fn with_endpoint(mut self, endpoint: Url) -> Self {
		self.endpoint = endpoint;

		self
	}

	/// Endpoint in use.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Session backing this client.
	pub fn session(&self) -> &Arc<ReqwestSession> {
		&self.session
	}

	/// Runs one operation and returns its `data` member.
	///
	/// An HTTP 401 forces exactly one refresh (shared with any concurrent caller) followed by
	/// a single retry. Missing `variables` are sent as an empty object.
	pub async fn execute(
		&self,
		operation_name: &str,
		query: &str,
		variables: Option<Value>,
	) -> Result<Value> {
		let body = GraphqlRequest {
			operation_name,
			query,
			variables: variables.unwrap_or_else(|| Value::Object(Map::new())),
		};
		let body = serde_json::to_vec(&body).map_err(ConfigError::RequestEncode)?;
		let token = self.session.valid_token().await?;
		let mut response = self.send(&token, &body).await?;

		if response.status() == StatusCode::UNAUTHORIZED {
			obs::debug_unauthorized_retry(operation_name);

			let token = self.session.refresh_after_rejection(&token).await?;

			response = self.send(&token, &body).await?;
		}

		let status = response.status();
		let text = response.text().await.map_err(TransportError::api)?;

		if !status.is_success() {
			return Err(Error::Api { status: status.as_u16(), message: preview(&text) });
		}

		let envelope = serde_json::from_str::<GraphqlEnvelope>(&text).map_err(|e| Error::Api {
			status: status.as_u16(),
			message: format!("Response body is not a GraphQL envelope: {e}"),
		})?;

		match envelope.errors {
			Some(errors) if !errors.is_empty() => Err(Error::Graphql {
				operation: operation_name.to_owned(),
				errors: Value::Array(errors).to_string(),
			}),
			_ => Ok(envelope.data.unwrap_or(Value::Null)),
		}
	}

	async fn send(&self, token: &TokenSecret, body: &[u8]) -> Result<Response> {
		let mut request = self
			.http
			.post(self.endpoint.clone())
			.header("authorization", token.bearer_header())
			.header("content-type", "application/json")
			.header("user-agent", self.session.descriptor().user_agent.as_str())
			.timeout(self.session.options().request_timeout.unsigned_abs())
			.body(body.to_vec());

		for (name, value) in FIXED_HEADERS {
			request = request.header(name, value);
		}

		request.send().await.map_err(|e| TransportError::api(e).into())
	}
}

fn preview(text: &str) -> String {
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return "empty response body".into();
	}

	trimmed.chars().take(MESSAGE_PREVIEW_LIMIT).collect()
}
