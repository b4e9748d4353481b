//! Thread-safe in-memory [`SecretStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::{ProfileId, TokenPair},
	store::{SecretStore, StoreFuture},
};

type StoreMap = Arc<RwLock<HashMap<ProfileId, TokenPair>>>;

/// Storage backend that keeps pairs in-process; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Returns the pair stored for `profile` without going through the async contract.
	pub fn get(&self, profile: &ProfileId) -> Option<TokenPair> {
		self.0.read().get(profile).cloned()
	}

	/// Inserts a pair directly, bypassing the async contract.
	pub fn insert(&self, profile: ProfileId, pair: TokenPair) {
		self.0.write().insert(profile, pair);
	}

	/// Number of stored profiles.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl SecretStore for MemoryStore {
	fn name(&self) -> &'static str {
		"memory"
	}

	fn read<'a>(&'a self, profile: &'a ProfileId) -> StoreFuture<'a, Option<TokenPair>> {
		Box::pin(async move { Ok(self.get(profile)) })
	}

	fn write<'a>(&'a self, profile: &'a ProfileId, pair: &'a TokenPair) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.insert(profile.clone(), pair.clone());

			Ok(())
		})
	}

	fn delete<'a>(&'a self, profile: &'a ProfileId) -> StoreFuture<'a, ()> {
		Box::pin(async move {
			self.0.write().remove(profile);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn pair(access: &str) -> TokenPair {
		TokenPair::builder()
			.access_token(access)
			.refresh_token("refresh")
			.expires_in(Duration::minutes(30))
			.build()
			.expect("Memory store fixture should build.")
	}

	#[tokio::test]
	async fn write_read_delete_round_trip() {
		let store = MemoryStore::default();
		let alice = ProfileId::new("alice").expect("Profile fixture should be valid.");
		let bob = ProfileId::new("bob").expect("Profile fixture should be valid.");

		store.write(&alice, &pair("alice-access")).await.expect("Write should succeed.");
		store.write(&bob, &pair("bob-access")).await.expect("Write should succeed.");

		let fetched = store
			.read(&alice)
			.await
			.expect("Read should succeed.")
			.expect("Alice's pair should be present.");

		assert_eq!(fetched.access_token().expose(), "alice-access");
		assert_eq!(store.len(), 2);

		store.delete(&alice).await.expect("Delete should succeed.");
		store.delete(&alice).await.expect("Deleting twice should still succeed.");

		assert!(store.read(&alice).await.expect("Read should succeed.").is_none());
		assert!(store.get(&bob).is_some());
	}
}
