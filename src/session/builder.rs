//! Construction of [`Session`] values from explicit tokens, persisted pairs, or credentials.

// self
use crate::{
	_prelude::*,
	auth::{Credential, ProfileId, TokenPair, TokenSecret},
	error::ConfigError,
	http::TokenHttpClient,
	oauth::TokenEndpoint,
	provider::{DefaultProviderStrategy, ProviderDescriptor, ProviderStrategy},
	session::{Session, SessionOptions},
	store::{EnvStore, SecretStore},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;
#[cfg(feature = "keyring")] use crate::store::KeyringStore;

struct ExplicitTokens {
	access: TokenSecret,
	refresh: TokenSecret,
	expires_at: Option<OffsetDateTime>,
}

/// Builder for [`Session`].
///
/// [`SessionBuilder::build`] picks the first available source:
/// 1. tokens passed to [`SessionBuilder::tokens`] or [`SessionBuilder::tokens_expiring_at`];
/// 2. the pair persisted in the highest-priority store that has one;
/// 3. a credential, which triggers [`Session::authenticate`].
///
/// Without any of them it fails with [`Error::CredentialsMissing`].
pub struct SessionBuilder<C>
where
	C: ?Sized + TokenHttpClient,
{
	descriptor: ProviderDescriptor,
	strategy: Arc<dyn ProviderStrategy>,
	http_client: Arc<C>,
	stores: Vec<Arc<dyn SecretStore>>,
	profile: Option<ProfileId>,
	options: SessionOptions,
	tokens: Option<ExplicitTokens>,
	credential: Option<Credential>,
}
#[cfg(feature = "reqwest")]
impl SessionBuilder<ReqwestHttpClient> {
	/// Creates a builder that provisions its own reqwest transport.
	pub fn new(descriptor: ProviderDescriptor) -> Self {
		Self::with_http_client(descriptor, ReqwestHttpClient::default())
	}
}
impl<C> SessionBuilder<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates a builder that reuses the caller-provided transport.
	pub fn with_http_client(descriptor: ProviderDescriptor, http_client: impl Into<Arc<C>>) -> Self {
		Self {
			descriptor,
			strategy: Arc::new(DefaultProviderStrategy),
			http_client: http_client.into(),
			stores: Vec::new(),
			profile: None,
			options: SessionOptions::default(),
			tokens: None,
			credential: None,
		}
	}

	/// Replaces the provider strategy.
	pub fn strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Appends a store; earlier stores take priority on reads.
	pub fn store(mut self, store: Arc<dyn SecretStore>) -> Self {
		self.stores.push(store);

		self
	}

	/// Appends several stores in priority order.
	pub fn stores<I>(mut self, stores: I) -> Self
	where
		I: IntoIterator<Item = Arc<dyn SecretStore>>,
	{
		self.stores.extend(stores);

		self
	}

	/// Appends the default chain: OS keychain (when the `keyring` feature is on), then the
	/// process environment.
	pub fn with_default_stores(self) -> Self {
		#[cfg(feature = "keyring")]
		let this = self.store(Arc::new(KeyringStore::new()));
		#[cfg(not(feature = "keyring"))]
		let this = self;

		this.store(Arc::new(EnvStore::new()))
	}

	/// Sets the profile key explicitly.
	pub fn profile(mut self, profile: ProfileId) -> Self {
		self.profile = Some(profile);

		self
	}

	/// Replaces all timing options.
	pub fn options(mut self, options: SessionOptions) -> Self {
		self.options = options;

		self
	}

	/// Overrides the refresh safety margin.
	pub fn safety_margin(mut self, margin: Duration) -> Self {
		self.options = self.options.with_safety_margin(margin);

		self
	}

	/// Overrides the token endpoint request timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.options = self.options.with_request_timeout(timeout);

		self
	}

	/// Overrides the per-backend timeout.
	pub fn persist_timeout(mut self, timeout: Duration) -> Self {
		self.options = self.options.with_persist_timeout(timeout);

		self
	}

	/// Starts from known tokens whose expiry is unknown.
	///
	/// The pair is treated as already due, so the first [`Session::valid_token`] refreshes it.
	pub fn tokens(mut self, access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
		self.tokens = Some(ExplicitTokens {
			access: TokenSecret::new(access_token),
			refresh: TokenSecret::new(refresh_token),
			expires_at: None,
		});

		self
	}

	/// Starts from known tokens with a known expiry.
	pub fn tokens_expiring_at(
		mut self,
		access_token: impl Into<String>,
		refresh_token: impl Into<String>,
		expires_at: OffsetDateTime,
	) -> Self {
		self.tokens = Some(ExplicitTokens {
			access: TokenSecret::new(access_token),
			refresh: TokenSecret::new(refresh_token),
			expires_at: Some(expires_at),
		});

		self
	}

	/// Supplies a credential used when no tokens are available.
	pub fn credential(mut self, credential: Credential) -> Self {
		self.credential = Some(credential);

		self
	}

	/// Supplies `WS_USERNAME`/`WS_PASSWORD`/`WS_OTP` as the credential when they are set.
	pub fn credential_from_env(mut self) -> Self {
		if let Some(credential) = Credential::from_env() {
			self.credential = Some(credential);
		}

		self
	}

	/// Builds the session and brings it to an authenticated state.
	pub async fn build(self) -> Result<Session<C>> {
		let (session, tokens, credential) = self.assemble();

		if let Some(tokens) = tokens {
			session.install(explicit_pair(tokens)?);

			return Ok(session);
		}
		if session.restore().await {
			return Ok(session);
		}

		match credential {
			Some(credential) => {
				session.authenticate(credential).await?;

				Ok(session)
			},
			None => Err(Error::CredentialsMissing),
		}
	}

	/// Builds a session without touching the network or the stores.
	///
	/// Explicit tokens are still installed; everything else waits for
	/// [`Session::authenticate`].
	pub fn build_unauthenticated(self) -> Session<C> {
		let (session, tokens, _) = self.assemble();

		if let Some(pair) = tokens.and_then(|tokens| explicit_pair(tokens).ok()) {
			session.install(pair);
		}

		session
	}

	fn assemble(self) -> (Session<C>, Option<ExplicitTokens>, Option<Credential>) {
		let profile = self
			.profile
			.or_else(|| {
				self.credential.as_ref().map(|credential| ProfileId::for_username(credential.username()))
			})
			.unwrap_or_else(ProfileId::from_env);
		let endpoint = TokenEndpoint::new(
			self.descriptor,
			self.strategy,
			self.http_client,
			self.options.request_timeout,
		);
		let session = Session::new(endpoint, self.stores, profile, self.options);

		(session, self.tokens, self.credential)
	}
}
impl<C> Debug for SessionBuilder<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBuilder")
			.field("descriptor", &self.descriptor)
			.field("stores", &self.stores.iter().map(|store| store.name()).collect::<Vec<_>>())
			.field("profile", &self.profile)
			.field("options", &self.options)
			.field("tokens_set", &self.tokens.is_some())
			.field("credential", &self.credential)
			.finish()
	}
}

fn explicit_pair(tokens: ExplicitTokens) -> Result<TokenPair> {
	let now = OffsetDateTime::now_utc();
	let expires_at = tokens.expires_at.unwrap_or(now);

	TokenPair::builder()
		.access_token(tokens.access.expose())
		.refresh_token(tokens.refresh.expose())
		.issued_at(now.min(expires_at))
		.expires_at(expires_at)
		.build()
		.map_err(|e| ConfigError::from(e).into())
}
