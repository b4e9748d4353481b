//! Session manager: one authenticated lifecycle per client instance.
//!
//! A [`Session`] owns the current [`TokenPair`], hands out bearer tokens through
//! [`Session::valid_token`], and refreshes them behind a single-flight gate so concurrent
//! callers share one token endpoint request. Every new pair is written to the configured
//! secret stores on a best-effort basis; store failures are logged and counted, never raised.

pub mod builder;
pub mod metrics;
pub mod options;

pub use builder::*;
pub use metrics::SessionMetrics;
pub use options::SessionOptions;

// crates.io
use futures::future::{self, BoxFuture};
// self
use crate::{
	_prelude::*,
	auth::{Credential, ProfileId, TokenPair, TokenSecret, TokenStatus},
	error::{AuthFailureReason, TransientError},
	http::TokenHttpClient,
	oauth::TokenEndpoint,
	obs::{self, FlowKind, FlowOutcome, FlowSpan, StoreOp},
	provider::ProviderDescriptor,
	store::{SecretStore, StoreError},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

#[cfg(feature = "reqwest")]
/// Session specialized for the crate's default reqwest transport.
pub type ReqwestSession = Session<ReqwestHttpClient>;

/// Why a session stopped handing out tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationCause {
	/// [`Session::logout`] was called.
	LoggedOut,
	/// The token endpoint rejected the refresh token.
	RefreshRejected,
}

/// Externally visible lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionStatus {
	/// No pair has been obtained yet.
	Unauthenticated,
	/// The current access token is outside the safety margin.
	Valid,
	/// The current access token is inside the safety margin or already expired; the next
	/// [`Session::valid_token`] call refreshes it.
	ExpiringSoon,
	/// The lifecycle ended; only [`Session::authenticate`] starts a new one.
	Invalidated(InvalidationCause),
}

#[derive(Clone, Debug)]
enum SessionState {
	Unauthenticated,
	Active(Arc<TokenPair>),
	Invalidated(InvalidationCause),
}
impl SessionState {
	fn label(&self) -> &'static str {
		match self {
			SessionState::Unauthenticated => "unauthenticated",
			SessionState::Active(_) => "active",
			SessionState::Invalidated(InvalidationCause::LoggedOut) => "logged_out",
			SessionState::Invalidated(InvalidationCause::RefreshRejected) => "refresh_rejected",
		}
	}
}

/// Authenticated session bound to one profile and one token endpoint.
///
/// `Session` is `Send + Sync`; share it behind an [`Arc`]. All async methods need a Tokio
/// runtime with the time driver enabled, since store calls are bounded by
/// [`SessionOptions::persist_timeout`] and refreshes run on a spawned task.
pub struct Session<C>
where
	C: ?Sized + TokenHttpClient,
{
	core: Arc<SessionCore<C>>,
}
#[cfg(feature = "reqwest")]
impl Session<ReqwestHttpClient> {
	/// Starts a builder backed by a default reqwest client.
	pub fn builder(descriptor: ProviderDescriptor) -> SessionBuilder<ReqwestHttpClient> {
		SessionBuilder::new(descriptor)
	}
}
impl<C> Session<C>
where
	C: ?Sized + TokenHttpClient,
{
	pub(crate) fn new(
		endpoint: TokenEndpoint<C>,
		stores: Vec<Arc<dyn SecretStore>>,
		profile: ProfileId,
		options: SessionOptions,
	) -> Self {
		let core = SessionCore {
			endpoint,
			stores,
			profile,
			options,
			state: RwLock::new(SessionState::Unauthenticated),
			refresh_gate: AsyncMutex::new(()),
			metrics: Default::default(),
		};

		Self { core: Arc::new(core) }
	}

	/// Profile key used for every store operation.
	pub fn profile(&self) -> &ProfileId {
		&self.core.profile
	}

	/// Timing options in effect.
	pub fn options(&self) -> &SessionOptions {
		&self.core.options
	}

	/// Token endpoint profile in effect.
	pub fn descriptor(&self) -> &ProviderDescriptor {
		self.core.endpoint.descriptor()
	}

	/// Shared activity counters.
	pub fn metrics(&self) -> Arc<SessionMetrics> {
		self.core.metrics.clone()
	}

	/// Names of the configured backends, in priority order.
	pub fn store_names(&self) -> Vec<&'static str> {
		self.core.stores.iter().map(|store| store.name()).collect()
	}

	/// Lifecycle state right now.
	pub fn status(&self) -> SessionStatus {
		self.status_at(OffsetDateTime::now_utc())
	}

	/// Lifecycle state at `instant`.
	pub fn status_at(&self, instant: OffsetDateTime) -> SessionStatus {
		match &*self.core.state.read() {
			SessionState::Unauthenticated => SessionStatus::Unauthenticated,
			SessionState::Invalidated(cause) => SessionStatus::Invalidated(*cause),
			SessionState::Active(pair) =>
				match pair.status_at(instant, self.core.options.safety_margin) {
					TokenStatus::Valid => SessionStatus::Valid,
					TokenStatus::ExpiringSoon | TokenStatus::Expired => SessionStatus::ExpiringSoon,
				},
		}
	}

	/// Canonical identity id of the signed-in user, when known.
	pub fn identity_id(&self) -> Option<String> {
		match &*self.core.state.read() {
			SessionState::Active(pair) => pair.identity_id().map(str::to_owned),
			_ => None,
		}
	}

	/// Expiry instant of the current access token.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		match &*self.core.state.read() {
			SessionState::Active(pair) => Some(pair.expires_at()),
			_ => None,
		}
	}

	/// Returns an access token that stays valid for at least the safety margin, refreshing
	/// first when needed.
	///
	/// Concurrent callers that all observe an expiring pair trigger exactly one refresh
	/// request; the others wait and reuse its result as long as it has not expired, even
	/// when the endpoint issued a lifetime shorter than the margin.
	pub async fn valid_token(&self) -> Result<TokenSecret> {
		let current = self.core.current_pair()?;

		if !current.needs_refresh_at(OffsetDateTime::now_utc(), self.core.options.safety_margin) {
			return Ok(current.access_token().clone());
		}

		let pair = self.refresh_from(current, false).await?;

		Ok(pair.access_token().clone())
	}

	/// Forces a refresh even if the current token is still valid.
	///
	/// A caller that waited on an in-flight refresh reuses its pair instead of sending
	/// a second request.
	pub async fn refresh(&self) -> Result<TokenSecret> {
		let current = self.core.current_pair()?;
		let pair = self.refresh_from(current, true).await?;

		Ok(pair.access_token().clone())
	}

	/// Refreshes only if the token handed out earlier is still the current one.
	///
	/// Used by callers that saw the API reject `rejected`; if another task has already
	/// replaced it, the replacement is returned without a request.
	pub async fn refresh_after_rejection(&self, rejected: &TokenSecret) -> Result<TokenSecret> {
		let current = self.core.current_pair()?;

		if current.access_token() != rejected
			&& !current.is_expired_at(OffsetDateTime::now_utc())
		{
			return Ok(current.access_token().clone());
		}

		let pair = self.refresh_from(current, true).await?;

		Ok(pair.access_token().clone())
	}

	/// Signs in with a password (and optional OTP), starting a fresh lifecycle.
	///
	/// The credential is consumed and dropped (scrubbing its secrets) before this returns,
	/// whatever the outcome. On success the new pair is persisted to every backend.
	pub async fn authenticate(&self, credential: Credential) -> Result<()> {
		const KIND: FlowKind = FlowKind::Password;

		let span = FlowSpan::new(KIND, "authenticate");
		let core = &self.core;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				if !credential.is_complete() {
					return Err(Error::authentication_failed(
						AuthFailureReason::InvalidCredentials,
						"Username and password must not be empty",
					));
				}

				let exchanged = core.endpoint.exchange_password(&credential).await;

				drop(credential);

				let pair = Arc::new(exchanged?);

				core.metrics.record_authentication();

				// Installs and writes after any in-flight refresh has finished persisting.
				let _gate = core.refresh_gate.lock().await;

				core.replace_state(SessionState::Active(pair.clone()));
				core.persist(&pair).await;

				Ok(())
			})
			.await;

		record_result(KIND, &result);

		result
	}

	/// Ends the lifecycle and deletes the profile's pair from every backend.
	///
	/// Idempotent. Tokens are refused as soon as this is called; the deletes run once any
	/// in-flight refresh has settled, so a rotated pair never outlives the logout in a
	/// backend. Backend failures are logged and counted, never raised.
	pub async fn logout(&self) {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");
		let core = &self.core;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		span.instrument(async move {
			core.replace_state(SessionState::Invalidated(InvalidationCause::LoggedOut));

			let _gate = core.refresh_gate.lock().await;

			core.clear_stores().await;
		})
		.await;
		obs::record_flow_outcome(KIND, FlowOutcome::Success);
	}

	/// Installs a caller-supplied pair without persisting it.
	pub(crate) fn install(&self, pair: TokenPair) {
		self.core.replace_state(SessionState::Active(Arc::new(pair)));
	}

	/// Loads the first persisted pair in backend priority order.
	pub(crate) async fn restore(&self) -> bool {
		const KIND: FlowKind = FlowKind::Restore;

		let span = FlowSpan::new(KIND, "restore");
		let core = &self.core;

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let restored = span
			.instrument(async move {
				for store in &core.stores {
					match core.bounded(store.as_ref(), store.read(&core.profile)).await {
						Ok(Some(pair)) => {
							self.install(pair);

							return true;
						},
						Ok(None) => {},
						Err(e) => obs::warn_store_failure(
							store.name(),
							StoreOp::Read,
							&core.profile,
							&e,
						),
					}
				}

				false
			})
			.await;

		obs::record_flow_outcome(
			KIND,
			if restored { FlowOutcome::Success } else { FlowOutcome::Failure },
		);

		restored
	}

	/// Runs the refresh on a detached task so a rotated pair is installed and persisted even
	/// if this caller is cancelled after the request went out.
	async fn refresh_from(&self, observed: Arc<TokenPair>, force: bool) -> Result<Arc<TokenPair>> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh");
		let core = self.core.clone();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let task =
			tokio::spawn(span.instrument(async move { core.refresh_from(observed, force).await }));
		let result = match task.await {
			Ok(result) => result,
			Err(e) => Err(TransientError::TokenEndpoint {
				message: format!("Refresh task ended before completing: {e}"),
				status: None,
				retry_after: None,
			}
			.into()),
		};

		record_result(KIND, &result);

		result
	}
}
impl<C> Debug for Session<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Session")
			.field("profile", &self.core.profile)
			.field("status", &self.status())
			.field("stores", &self.store_names())
			.field("options", &self.core.options)
			.finish()
	}
}

struct SessionCore<C>
where
	C: ?Sized + TokenHttpClient,
{
	endpoint: TokenEndpoint<C>,
	stores: Vec<Arc<dyn SecretStore>>,
	profile: ProfileId,
	options: SessionOptions,
	state: RwLock<SessionState>,
	// Held for the whole refresh, including persistence, and before installing or clearing.
	refresh_gate: AsyncMutex<()>,
	metrics: Arc<SessionMetrics>,
}
impl<C> SessionCore<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn current_pair(&self) -> Result<Arc<TokenPair>> {
		match &*self.state.read() {
			SessionState::Active(pair) => Ok(pair.clone()),
			SessionState::Unauthenticated
			| SessionState::Invalidated(InvalidationCause::LoggedOut) => Err(Error::NotAuthenticated),
			SessionState::Invalidated(InvalidationCause::RefreshRejected) =>
				Err(Error::ReauthenticationRequired {
					reason: "The refresh token was rejected; sign in again".into(),
				}),
		}
	}

	async fn refresh_from(&self, observed: Arc<TokenPair>, force: bool) -> Result<Arc<TokenPair>> {
		let _singleflight = self.refresh_gate.lock().await;
		let current = self.current_pair()?;
		let now = OffsetDateTime::now_utc();

		if !Arc::ptr_eq(&current, &observed) {
			// Replaced while this caller waited on the gate.
			if !current.is_expired_at(now) {
				return Ok(current);
			}
		} else if !force && !current.needs_refresh_at(now, self.options.safety_margin) {
			return Ok(current);
		}

		self.metrics.record_refresh_attempt();

		match self.endpoint.exchange_refresh(current.refresh_token()).await {
			Ok(pair) => {
				let pair = Arc::new(pair);

				self.metrics.record_refresh_success();

				if !self.swap_if_current(&current, SessionState::Active(pair.clone())) {
					return self.current_pair();
				}

				self.persist(&pair).await;

				Ok(pair)
			},
			Err(e @ Error::ReauthenticationRequired { .. }) => {
				self.metrics.record_refresh_failure();

				let invalidated = SessionState::Invalidated(InvalidationCause::RefreshRejected);

				if self.swap_if_current(&current, invalidated) {
					self.clear_stores().await;
				}

				Err(e)
			},
			Err(e) => {
				self.metrics.record_refresh_failure();

				Err(e)
			},
		}
	}

	fn replace_state(&self, next: SessionState) {
		let to = next.label();
		let previous = std::mem::replace(&mut *self.state.write(), next);

		obs::debug_transition(&self.profile, previous.label(), to);
	}

	/// Replaces the state only if it still holds `expected`; a concurrent logout or
	/// authenticate wins over an in-flight refresh.
	fn swap_if_current(&self, expected: &Arc<TokenPair>, next: SessionState) -> bool {
		let to = next.label();
		let mut state = self.state.write();
		let matches =
			matches!(&*state, SessionState::Active(pair) if Arc::ptr_eq(pair, expected));

		if matches {
			*state = next;

			drop(state);
			obs::debug_transition(&self.profile, "active", to);
		}

		matches
	}

	async fn persist(&self, pair: &TokenPair) {
		// Boxed so the refresh task stays `Send` across the join.
		let writes = self.stores.iter().map(|store| {
			let op: BoxFuture<'_, ()> = Box::pin(async move {
				if let Err(e) = self.bounded(store.as_ref(), store.write(&self.profile, pair)).await
				{
					self.metrics.record_persist_failure();
					obs::warn_store_failure(store.name(), StoreOp::Write, &self.profile, &e);
				}
			});

			op
		});

		future::join_all(writes).await;
	}

	async fn clear_stores(&self) {
		let deletes = self.stores.iter().map(|store| {
			let op: BoxFuture<'_, ()> = Box::pin(async move {
				if let Err(e) = self.bounded(store.as_ref(), store.delete(&self.profile)).await {
					self.metrics.record_persist_failure();
					obs::warn_store_failure(store.name(), StoreOp::Delete, &self.profile, &e);
				}
			});

			op
		});

		future::join_all(deletes).await;
	}

	async fn bounded<T, F>(&self, store: &dyn SecretStore, op: F) -> Result<T, StoreError>
	where
		F: Future<Output = Result<T, StoreError>>,
	{
		let budget = self.options.persist_timeout;

		match tokio::time::timeout(budget.unsigned_abs(), op).await {
			Ok(result) => result,
			Err(_) => Err(StoreError::TimedOut {
				backend: store.name().to_owned(),
				millis: u64::try_from(budget.whole_milliseconds()).unwrap_or(u64::MAX),
			}),
		}
	}
}

fn record_result<T>(kind: FlowKind, result: &Result<T>) {
	match result {
		Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => obs::record_flow_outcome(kind, FlowOutcome::Failure),
	}
}
