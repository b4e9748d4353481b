//! OS keychain [`SecretStore`] built on the `keyring` crate.
//!
//! Each profile owns three entries under the service name: `{profile}_access_token`,
//! `{profile}_refresh_token`, and `{profile}_token_expiry` (unix seconds).

// crates.io
use keyring::{Entry, Error as KeyringError};
// self
use crate::{
	_prelude::*,
	auth::{ProfileId, TokenPair},
	store::{self, SecretStore, StoreError, StoreFuture},
};

/// Default keychain service name.
pub const DEFAULT_SERVICE: &str = "wealthsimple-rust";

const ACCESS_SUFFIX: &str = "access_token";
const REFRESH_SUFFIX: &str = "refresh_token";
const EXPIRY_SUFFIX: &str = "token_expiry";

/// Keychain-backed store. Every call runs on the blocking thread pool.
#[derive(Clone, Debug)]
pub struct KeyringStore {
	service: Arc<str>,
}
impl KeyringStore {
	/// Uses the [`DEFAULT_SERVICE`] name.
	pub fn new() -> Self {
		Self::with_service(DEFAULT_SERVICE)
	}

	/// Uses a custom service name.
	pub fn with_service(service: impl Into<String>) -> Self {
		Self { service: Arc::from(service.into()) }
	}

	/// Service name entries are filed under.
	pub fn service(&self) -> &str {
		&self.service
	}

	async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
	where
		T: 'static + Send,
		F: 'static + Send + FnOnce(&str) -> Result<T, StoreError>,
	{
		let service = self.service.clone();

		tokio::task::spawn_blocking(move || op(&service)).await.map_err(|e| {
			StoreError::Backend { message: format!("Keychain task did not complete: {e}") }
		})?
	}
}
impl Default for KeyringStore {
	fn default() -> Self {
		Self::new()
	}
}
impl SecretStore for KeyringStore {
	fn name(&self) -> &'static str {
		"keyring"
	}

	fn read<'a>(&'a self, profile: &'a ProfileId) -> StoreFuture<'a, Option<TokenPair>> {
		let profile = profile.clone();

		Box::pin(async move {
			let (access, refresh, expiry) = self
				.blocking(move |service| {
					Ok((
						get(service, &profile, ACCESS_SUFFIX)?,
						get(service, &profile, REFRESH_SUFFIX)?,
						get(service, &profile, EXPIRY_SUFFIX)?,
					))
				})
				.await?;

			store::pair_from_parts(access, refresh, expiry.as_deref())
		})
	}

	fn write<'a>(&'a self, profile: &'a ProfileId, pair: &'a TokenPair) -> StoreFuture<'a, ()> {
		let profile = profile.clone();
		let (access, refresh, expiry) = store::pair_to_parts(pair);

		Box::pin(async move {
			self.blocking(move |service| {
				set(service, &profile, ACCESS_SUFFIX, &access)?;
				set(service, &profile, REFRESH_SUFFIX, &refresh)?;
				set(service, &profile, EXPIRY_SUFFIX, &expiry)
			})
			.await
		})
	}

	fn delete<'a>(&'a self, profile: &'a ProfileId) -> StoreFuture<'a, ()> {
		let profile = profile.clone();

		Box::pin(async move {
			self.blocking(move |service| {
				// Attempt every entry even if one fails, then report the first failure.
				[ACCESS_SUFFIX, REFRESH_SUFFIX, EXPIRY_SUFFIX]
					.into_iter()
					.map(|suffix| remove(service, &profile, suffix))
					.fold(Ok(()), Result::and)
			})
			.await
		})
	}
}

fn entry(service: &str, profile: &ProfileId, suffix: &str) -> Result<Entry, StoreError> {
	Entry::new(service, &format!("{profile}_{suffix}")).map_err(backend_error)
}

fn get(service: &str, profile: &ProfileId, suffix: &str) -> Result<Option<String>, StoreError> {
	match entry(service, profile, suffix)?.get_password() {
		Ok(value) => Ok(Some(value)),
		Err(KeyringError::NoEntry) => Ok(None),
		Err(e) => Err(backend_error(e)),
	}
}

fn set(service: &str, profile: &ProfileId, suffix: &str, value: &str) -> Result<(), StoreError> {
	entry(service, profile, suffix)?.set_password(value).map_err(backend_error)
}

fn remove(service: &str, profile: &ProfileId, suffix: &str) -> Result<(), StoreError> {
	match entry(service, profile, suffix)?.delete_credential() {
		Ok(()) | Err(KeyringError::NoEntry) => Ok(()),
		Err(e) => Err(backend_error(e)),
	}
}

fn backend_error(e: KeyringError) -> StoreError {
	StoreError::Backend { message: format!("Keychain error: {e}") }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn service_defaults_to_crate_name() {
		let store = KeyringStore::default();

		assert_eq!(store.service(), DEFAULT_SERVICE);
		assert_eq!(store.name(), "keyring");
		assert_eq!(KeyringStore::with_service("custom").service(), "custom");
	}
}
