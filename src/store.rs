//! Persistence contracts and built-in secret store backends for token pairs.
//!
//! A session holds its backends in a fixed priority order: reads walk the list and stop at
//! the first backend holding a pair, writes and deletes fan out to every backend.

pub mod env;
pub mod file;
#[cfg(feature = "keyring")] pub mod keychain;
pub mod memory;

pub use env::EnvStore;
pub use file::FileStore;
#[cfg(feature = "keyring")] pub use keychain::KeyringStore;
pub use memory::MemoryStore;

// self
use crate::{
	_prelude::*,
	auth::{ProfileId, TokenPair},
};

/// Boxed future returned by [`SecretStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract implemented by token stores.
///
/// Backends are shared, independently-lived stores; the session reads from and writes to them
/// but never assumes it is their only user.
pub trait SecretStore
where
	Self: Send + Sync,
{
	/// Short label used in logs (`keyring`, `env`, `file`, ...).
	fn name(&self) -> &'static str;

	/// Fetches the pair persisted for `profile`, if any.
	fn read<'a>(&'a self, profile: &'a ProfileId) -> StoreFuture<'a, Option<TokenPair>>;

	/// Persists or replaces the pair for `profile`.
	fn write<'a>(&'a self, profile: &'a ProfileId, pair: &'a TokenPair) -> StoreFuture<'a, ()>;

	/// Removes whatever is persisted for `profile`; deleting a missing entry succeeds.
	fn delete<'a>(&'a self, profile: &'a ProfileId) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`SecretStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// The backend did not answer within the session's persistence budget.
	#[error("Backend `{backend}` timed out after {millis} ms.")]
	TimedOut {
		/// Backend label.
		backend: String,
		/// Budget that elapsed.
		millis: u64,
	},
}

/// Splits a pair into the `(access, refresh, expiry)` strings used by flat key/value backends.
///
/// The expiry is encoded as unix seconds.
pub(crate) fn pair_to_parts(pair: &TokenPair) -> (String, String, String) {
	(
		pair.access_token().expose().to_owned(),
		pair.refresh_token().expose().to_owned(),
		pair.expires_at().unix_timestamp().to_string(),
	)
}

/// Rebuilds a pair from flat key/value parts.
///
/// Returns `Ok(None)` unless both tokens are present and non-blank. The expiry accepts integer
/// or fractional unix seconds; a missing or unreadable expiry yields a pair that expires now,
/// so the session refreshes it before first use.
pub(crate) fn pair_from_parts(
	access: Option<String>,
	refresh: Option<String>,
	expiry: Option<&str>,
) -> Result<Option<TokenPair>, StoreError> {
	let (Some(access), Some(refresh)) = (
		access.filter(|value| !value.trim().is_empty()),
		refresh.filter(|value| !value.trim().is_empty()),
	) else {
		return Ok(None);
	};
	let now = OffsetDateTime::now_utc();
	let expires_at = expiry.and_then(parse_unix_seconds).unwrap_or(now);
	let pair = TokenPair::builder()
		.access_token(access)
		.refresh_token(refresh)
		.issued_at(now.min(expires_at))
		.expires_at(expires_at)
		.build()
		.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

	Ok(Some(pair))
}

fn parse_unix_seconds(raw: &str) -> Option<OffsetDateTime> {
	let seconds = raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())?;

	OffsetDateTime::from_unix_timestamp_nanos((seconds * 1_000_000_000.0) as i128).ok()
}
