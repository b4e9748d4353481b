//! Process-environment [`SecretStore`] reading `WS_ACCESS_TOKEN` and friends.
//!
//! Mutating the real process environment is not thread-safe, so writes and deletes land in an
//! in-process overlay that shadows the inherited variables for the life of the store.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	auth::{ProfileId, TokenPair},
	store::{self, SecretStore, StoreFuture},
};

/// Default variable prefix.
pub const DEFAULT_PREFIX: &str = "WS";

/// Environment-backed store; the profile key is ignored since the environment holds one pair.
#[derive(Clone, Debug)]
pub struct EnvStore {
	prefix: String,
	inherit: bool,
	// `None` marks a variable deleted through this store.
	overlay: Arc<RwLock<HashMap<String, Option<String>>>>,
}
impl EnvStore {
	/// Reads `WS_ACCESS_TOKEN`, `WS_REFRESH_TOKEN`, and `WS_TOKEN_EXPIRY`.
	pub fn new() -> Self {
		Self::with_prefix(DEFAULT_PREFIX)
	}

	/// Reads `{prefix}_ACCESS_TOKEN`, `{prefix}_REFRESH_TOKEN`, and `{prefix}_TOKEN_EXPIRY`.
	pub fn with_prefix(prefix: impl Into<String>) -> Self {
		Self { prefix: prefix.into(), inherit: true, overlay: Default::default() }
	}

	/// Builds a store that ignores the inherited process environment entirely.
	pub fn isolated() -> Self {
		Self { inherit: false, ..Self::new() }
	}

	/// Sets a variable in the overlay, as if it had been exported.
	pub fn set_var(&self, suffix: &str, value: impl Into<String>) {
		self.overlay.write().insert(self.var_name(suffix), Some(value.into()));
	}

	/// Returns the effective value of `{prefix}_{suffix}`.
	pub fn var(&self, suffix: &str) -> Option<String> {
		let name = self.var_name(suffix);

		if let Some(value) = self.overlay.read().get(&name) {
			return value.clone();
		}
		if self.inherit { env::var(&name).ok() } else { None }
	}

	fn var_name(&self, suffix: &str) -> String {
		format!("{}_{suffix}", self.prefix)
	}
}
impl Default for EnvStore {
	fn default() -> Self {
		Self::new()
	}
}
impl SecretStore for EnvStore {
	fn name(&self) -> &'static str {
		"env"
	}

	fn read<'a>(&'a self, _: &'a ProfileId) -> StoreFuture<'a, Option<TokenPair>> {
		Box::pin(async move {
			let expiry = self.var("TOKEN_EXPIRY");

			store::pair_from_parts(
				self.var("ACCESS_TOKEN"),
				self.var("REFRESH_TOKEN"),
				expiry.as_deref(),
			)
		})
	}

	fn write<'a>(&'a self, _: &'a ProfileId, pair: &'a TokenPair) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let (access, refresh, expiry) = store::pair_to_parts(pair);

			self.set_var("ACCESS_TOKEN", access);
			self.set_var("REFRESH_TOKEN", refresh);
			self.set_var("TOKEN_EXPIRY", expiry);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, _: &'a ProfileId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			let mut overlay = self.overlay.write();

			for suffix in ["ACCESS_TOKEN", "REFRESH_TOKEN", "TOKEN_EXPIRY"] {
				overlay.insert(self.var_name(suffix), None);
			}

			Ok(())
		})
	}
}
