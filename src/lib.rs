//! Unofficial Wealthsimple session manager: password + OTP sign-in, single-flight token refresh,
//! and keychain/environment persistence behind a single `valid_token()` call.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[cfg(feature = "reqwest")] pub mod api;
pub mod auth;
pub mod error;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod session;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::ProfileId,
		http::ReqwestHttpClient,
		provider::ProviderDescriptor,
		session::{Session, SessionBuilder},
		store::{MemoryStore, SecretStore},
	};

	/// Session type alias used by reqwest-backed integration tests.
	pub type ReqwestTestSession = Session<ReqwestHttpClient>;

	/// Client identifier sent by test descriptors.
	pub const TEST_CLIENT_ID: &str = "test-client";

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a descriptor pointing at a mock token endpoint.
	pub fn test_descriptor(token_url: &str) -> ProviderDescriptor {
		ProviderDescriptor::builder()
			.token_endpoint(Url::parse(token_url).expect("Mock token endpoint should parse."))
			.client_id(TEST_CLIENT_ID)
			.build()
			.expect("Mock provider descriptor should build successfully.")
	}

	/// Returns the profile key shared by test sessions.
	pub fn test_profile() -> ProfileId {
		ProfileId::new("tester").expect("Test profile identifier should be valid.")
	}

	/// Constructs a [`SessionBuilder`] backed by an in-memory store and the reqwest transport
	/// used across integration tests.
	pub fn reqwest_test_session_builder(
		token_url: &str,
	) -> (SessionBuilder<ReqwestHttpClient>, Arc<MemoryStore>) {
		let store_backend = Arc::new(MemoryStore::default());
		let store: Arc<dyn SecretStore> = store_backend.clone();
		let builder = SessionBuilder::<ReqwestHttpClient>::with_http_client(
			test_descriptor(token_url),
			test_reqwest_http_client(),
		)
		.profile(test_profile())
		.store(store);

		(builder, store_backend)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use httpmock as _;
