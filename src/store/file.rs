//! JSON file backed [`SecretStore`] for headless hosts without a usable keychain.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::{ProfileId, TokenPair},
	store::{SecretStore, StoreError, StoreFuture},
};

/// Persists every profile's pair to one JSON file, rewritten atomically after each mutation.
///
/// On unix the file is created with mode `0600`.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<ProfileId, TokenPair>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<ProfileId, TokenPair>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Ok(HashMap::new());
		}

		let entries: Vec<(ProfileId, TokenPair)> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(entries.into_iter().collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn create_private(path: &Path) -> std::io::Result<File> {
		let mut options = OpenOptions::new();

		options.write(true).create(true).truncate(true);

		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;

			options.mode(0o600);
		}

		options.open(path)
	}

	/// Runs filesystem work off the async worker; the write lock is only taken in there.
	async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
	where
		T: 'static + Send,
		F: 'static + Send + FnOnce(&Self) -> Result<T, StoreError>,
	{
		let store = self.clone();

		tokio::task::spawn_blocking(move || op(&store)).await.map_err(|e| StoreError::Backend {
			message: format!("File store task did not complete: {e}"),
		})?
	}

	fn persist_locked(&self, contents: &HashMap<ProfileId, TokenPair>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let snapshot: Vec<_> = contents.iter().collect();
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = Self::create_private(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl SecretStore for FileStore {
	fn name(&self) -> &'static str {
		"file"
	}

	fn read<'a>(&'a self, profile: &'a ProfileId) -> StoreFuture<'a, Option<TokenPair>> {
		Box::pin(async move { Ok(self.inner.read().get(profile).cloned()) })
	}

	fn write<'a>(&'a self, profile: &'a ProfileId, pair: &'a TokenPair) -> StoreFuture<'a, ()> {
		let (profile, pair) = (profile.clone(), pair.clone());

		Box::pin(self.blocking(move |store| {
			let mut guard = store.inner.write();

			guard.insert(profile, pair);
			store.persist_locked(&guard)
		}))
	}

	fn delete<'a>(&'a self, profile: &'a ProfileId) -> StoreFuture<'a, ()> {
		let profile = profile.clone();

		Box::pin(self.blocking(move |store| {
			let mut guard = store.inner.write();

			if guard.remove(&profile).is_some() {
				store.persist_locked(&guard)?;
			}

			Ok(())
		}))
	}
}
